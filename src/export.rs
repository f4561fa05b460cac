use crate::{
    app_state::AppState,
    municipalities::Municipalities,
    trail::{Trail, format_length},
};
use anyhow::Result;
use log::{error, info};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CSV_HEADER: [&str; 10] = [
    "id",
    "url",
    "name_sv",
    "name_sv + length",
    "municipality",
    "length",
    "length_url",
    "sections",
    "sections_url",
    "popularity",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct TrailCsvExporter<'a> {
    municipalities: &'a Municipalities,
    trail_base_url: String,
    length_unit: String,
}

impl<'a> TrailCsvExporter<'a> {
    pub fn new(app: &AppState, municipalities: &'a Municipalities) -> Self {
        Self {
            municipalities,
            trail_base_url: app.trail_base_url.to_owned(),
            length_unit: app.length_unit.to_owned(),
        }
    }

    /// One CSV row; fails if the municipality can not be resolved
    pub fn row(&self, trail: &Trail) -> Result<Vec<String>> {
        Ok(vec![
            trail.id.to_owned(),
            trail.url(&self.trail_base_url),
            trail.name_sv.to_owned(),
            trail.label(&self.length_unit),
            trail.municipality_name_sv(self.municipalities)?,
            format_length(trail.length),
            trail.length_source_url.to_owned(),
            trail
                .number_of_sections
                .map(|n| n.to_string())
                .unwrap_or_default(),
            trail.section_source_url.to_owned(),
            trail.popularity.to_string(),
        ])
    }

    /// Writes header and rows. Rows that fail are logged and skipped.
    pub fn export_to_writer<W: Write>(&self, trails: &[Trail], out: W) -> Result<ExportSummary> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(CSV_HEADER)?;
        let mut summary = ExportSummary::default();
        for trail in trails {
            match self.row(trail) {
                Ok(row) => {
                    writer.write_record(&row)?;
                    summary.written += 1;
                }
                Err(e) => {
                    error!("Failed to export trail {}: {e}", trail.id);
                    summary.skipped += 1;
                }
            }
        }
        writer.flush()?;
        Ok(summary)
    }

    pub fn export_to_csv(&self, trails: &[Trail], filename: &Path) -> Result<ExportSummary> {
        let file = File::create(filename)?;
        let summary = self.export_to_writer(trails, file)?;
        info!(
            "Exported {} trails to {}, skipped {}",
            summary.written,
            filename.display(),
            summary.skipped
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::get_test_app;
    use crate::municipality::Municipality;
    use crate::trail::testing::trail;
    use serde_json::json;

    fn directory() -> Municipalities {
        Municipalities::from_municipalities(vec![
            Municipality::from_json(&json!({
                "id": 1981,
                "attributes": {"lat": 0.0, "lon": 0.0, "name": {"sv": "Sala"}}
            }))
            .unwrap(),
        ])
    }

    #[test]
    fn test_export_rows() {
        let app = get_test_app();
        let m = directory();
        let mut with_sections = trail("1", "Salaleden", 12.5, 1981);
        with_sections.number_of_sections = Some(4);
        with_sections.section_source_url = "https://example.org/s".to_string();
        let trails = vec![
            with_sections,
            trail("2", "Okänd", 20.0, 9999),
            trail("3", "Silvervägen, \"norra\"", 7.0, 1981),
        ];

        let mut out = vec![];
        let summary = TrailCsvExporter::new(&app, &m)
            .export_to_writer(&trails, &mut out)
            .unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                written: 2,
                skipped: 1
            }
        );
        assert_eq!(summary.written, trails.len() - summary.skipped);

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].iter().collect::<Vec<_>>(),
            vec![
                "1",
                "https://api.naturkartan.se/1",
                "Salaleden",
                "Salaleden 12.5 km",
                "Sala kommun",
                "12.5",
                "",
                "4",
                "https://example.org/s",
                "3"
            ]
        );
        assert_eq!(&rows[1][2], "Silvervägen, \"norra\"");
        assert_eq!(&rows[1][3], "Silvervägen, \"norra\" 7.0 km");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let filename = dir.path().join("trails.csv");
        let app = get_test_app();
        let m = directory();
        let summary = TrailCsvExporter::new(&app, &m)
            .export_to_csv(&[trail("1", "A", 10.0, 1981)], &filename)
            .unwrap();
        assert_eq!(summary.written, 1);
        let text = std::fs::read_to_string(&filename).unwrap();
        assert!(text.starts_with("id,url,name_sv,name_sv + length,municipality,"));
        assert_eq!(text.lines().count(), 2);
    }
}
