use crate::{
    app_state::AppState,
    error::NaturkartanError,
    export::{ExportSummary, TrailCsvExporter},
    knowledge_base::KnowledgeBase,
    municipalities::Municipalities,
    prompt::Prompter,
    trail::{Trail, TrailFilter},
};
use anyhow::Result;
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const QUERY_BY: &str = "name_sv,name_en,tags,_keywords_en";
const SORT_BY: &str = "importance:asc";
const INCLUDE_FIELDS: &str =
    "id,type,name_sv,name_en,path,published,importance,length,popularity,difficulty,time,municipality_id";

lazy_static! {
    static ref RE_PAGE_FILE: Regex = Regex::new(r"^page_(\d+)\.json$").expect("Regexp construction");
}

/// Downloads trails from the Naturkartan search index, cleans them up,
/// enriches the interesting ones and writes the CSV report.
#[derive(Debug, Clone)]
pub struct NaturkartanScraper {
    pub municipalities: Municipalities,
    pub trails: Vec<Trail>,
    pub hits: Vec<Value>,
    filter: TrailFilter,
    app: AppState,
    client: reqwest::Client,
}

impl NaturkartanScraper {
    pub fn new(app: &AppState, municipalities: Municipalities) -> Result<Self> {
        Ok(Self {
            municipalities,
            trails: vec![],
            hits: vec![],
            filter: TrailFilter::from_app(app),
            app: app.clone(),
            client: app.http_client()?,
        })
    }

    async fn fetch_search_page(&self, page: usize) -> Result<Value> {
        let params = [
            ("limit", self.app.hits_per_page.to_string()),
            ("page", page.to_string()),
            ("q", String::new()),
            ("query_by", QUERY_BY.to_string()),
            ("filter_by", self.app.search_filter.to_owned()),
            ("sort_by", SORT_BY.to_string()),
            ("include_fields", INCLUDE_FIELDS.to_string()),
            ("x-typesense-api-key", self.app.search_api_key.to_owned()),
        ];
        let response = self
            .client
            .get(&self.app.search_url)
            .header("Accept", "application/json, text/plain, */*")
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(NaturkartanError::BadStatus {
                url: format!("{} (page {page})", self.app.search_url),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response.json().await?)
    }

    /// Pages through the search index until a page comes back empty.
    /// Every raw page is kept in the debug folder for later replay.
    pub async fn download_all_pages(&mut self) -> Result<()> {
        let mut page = 1;
        loop {
            let data = self.fetch_search_page(page).await?;
            Self::save_raw_page_json(&data, page, &self.app.debug_folder)?;
            let found = data["found"].as_u64().unwrap_or_default();
            info!(
                "Downloading a total of {found} hits at {} per page",
                self.app.hits_per_page
            );
            let hits = data["hits"].as_array().cloned().unwrap_or_default();
            if hits.is_empty() {
                break;
            }
            self.hits.extend(hits.iter().cloned());
            info!(
                "Page {page}: {} hits, total so far: {}",
                hits.len(),
                self.hits.len()
            );
            page += 1;
        }
        info!("Total downloaded hits: {}", self.hits.len());
        Ok(())
    }

    pub fn save_raw_page_json(data: &Value, page: usize, folder: &Path) -> Result<PathBuf> {
        fs::create_dir_all(folder)?;
        let filename = folder.join(format!("page_{page}.json"));
        let file = File::create(&filename)?;
        serde_json::to_writer_pretty(file, data)?;
        info!("Saved raw page JSON to {}", filename.display());
        Ok(filename)
    }

    /// "page_12.json" => 12
    fn page_number(path: &Path) -> Option<u64> {
        let filename = path.file_name()?.to_str()?;
        RE_PAGE_FILE.captures(filename)?.get(1)?.as_str().parse().ok()
    }

    /// Replays hits from pages saved by an earlier download
    pub fn load_hits_from_debug_pages(&mut self, folder: &Path) -> Result<()> {
        if !folder.exists() {
            warn!("Debug folder {} does not exist.", folder.display());
            return Ok(());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort_by_key(|path| (Self::page_number(path).unwrap_or(u64::MAX), path.clone()));

        for path in files {
            let data: Value = match File::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|file| Ok(serde_json::from_reader::<_, Value>(file)?))
            {
                Ok(data) => data,
                Err(e) => {
                    error!("Failed to read {}: {e}", path.display());
                    continue;
                }
            };
            let hits = data["hits"].as_array().cloned().unwrap_or_default();
            info!("Loaded {} hits from {}", hits.len(), path.display());
            self.hits.extend(hits);
        }
        info!("Total hits loaded from debug pages: {}", self.hits.len());
        Ok(())
    }

    /// Hits that can not be normalized or decoded are logged and dropped
    pub fn parse_hits_into_trails(&mut self) {
        for hit in &self.hits {
            match Trail::from_hit(hit) {
                Ok(trail) => self.trails.push(trail),
                Err(e) => error!("Skipping hit: {e}"),
            }
        }
        info!("Processed {} trails", self.trails.len());
    }

    pub fn hiking_trails(&self) -> Vec<Trail> {
        self.filter.filter(&self.trails)
    }

    fn hiking_trails_mut(&mut self) -> Vec<&mut Trail> {
        let filter = self.filter;
        self.trails
            .iter_mut()
            .filter(|trail| filter.matches(trail))
            .collect()
    }

    pub fn ask_user_for_information<P: Prompter + ?Sized>(&mut self, prompter: &mut P) -> Result<()> {
        let filter = self.filter;
        let mut trails: Vec<&mut Trail> = self
            .trails
            .iter_mut()
            .filter(|trail| filter.matches(trail))
            .collect();
        let total = trails.len();
        for (num, trail) in trails.iter_mut().enumerate() {
            prompter.show(&format!("Working on {}/{total}", num + 1));
            trail.get_information(prompter, &self.municipalities, &self.app, num + 1, total)?;
        }
        Ok(())
    }

    /// Returns the number of trails a publisher was found for
    pub async fn fetch_publishers(&mut self) -> Result<usize> {
        let client = self.client.clone();
        let base_url = self.app.trail_base_url.to_owned();
        let mut trails = self.hiking_trails_mut();
        let total = trails.len();
        let mut found = 0;
        for (num, trail) in trails.iter_mut().enumerate() {
            info!("fetching publisher {}/{total}", num + 1);
            match trail.fetch_publisher(&client, &base_url).await {
                Ok(()) => found += 1,
                Err(e) => error!("Could not get publisher for trail {}: {e}", trail.id),
            }
        }
        Ok(found)
    }

    /// Marks the trails that already have an item. Returns how many do.
    pub async fn lookup_trails_in_wikidata<K: KnowledgeBase + ?Sized + Sync>(
        &mut self,
        kb: &K,
    ) -> Result<usize> {
        let mut found = 0;
        for trail in self.hiking_trails_mut() {
            match trail.wikidata_qid(kb).await {
                Ok(Some(qid)) => {
                    info!("trail {} is {qid}", trail.id);
                    trail.qid = Some(qid);
                    trail.already_present = true;
                    found += 1;
                }
                Ok(None) => {}
                Err(e) => error!("Wikidata lookup failed for trail {}: {e}", trail.id),
            }
        }
        Ok(found)
    }

    pub fn export_trails_to_csv(&self, filename: &Path) -> Result<ExportSummary> {
        let trails = self.hiking_trails();
        let summary =
            TrailCsvExporter::new(&self.app, &self.municipalities).export_to_csv(&trails, filename)?;
        info!(
            "Exported {} hiking trails to csv that are longer than {} {}",
            summary.written,
            self.filter.min_length,
            self.app.length_unit
        );
        Ok(summary)
    }
}
