use crate::{
    app_state::AppState,
    error::NaturkartanError,
    knowledge_base::{KnowledgeBase, escape_sparql},
    municipalities::Municipalities,
    municipality::Municipality,
    normalizer::Normalizer,
    prompt::Prompter,
    qid_cache::QidCache,
    wikidata_commands::PROP_NATURKARTAN_ID,
};
use anyhow::{Result, anyhow};
use log::info;
use scraper::{Html, Selector};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const TRAIL_TYPE: &str = "Trail";
pub const BICYCLE_ROUTE_MARKER: &str = "cykel";

/// Timestamps come as strings or epoch numbers
fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// `null` becomes the type's default
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trail {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name_sv: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name_en: String,
    pub id: String,
    #[serde(rename = "type")]
    pub trail_type: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub importance: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub popularity: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub guide_ids: Vec<i64>,
    #[serde(default)]
    pub difficulty: Option<String>,
    /// in minutes
    #[serde(default)]
    pub time: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub trip_ids: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub category_ids: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub organization_id: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub wheelchair_tested: bool,
    #[serde(default)]
    pub municipality_id: i64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub path: String,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub trail_status_reported_at: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub published: bool,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub imgix_url: String,
    /// Unit is not documented upstream
    #[serde(default)]
    pub length: f64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub lat: f64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub lng: f64,

    // Filled in later, by scraping or by asking the operator
    #[serde(skip)]
    pub publisher: String,
    #[serde(skip)]
    pub county: String,
    #[serde(skip)]
    pub number_of_sections: Option<u32>,
    #[serde(skip)]
    pub length_source_url: String,
    #[serde(skip)]
    pub section_source_url: String,
    #[serde(skip)]
    pub qid: Option<String>,
    #[serde(skip)]
    pub already_present: bool,
}

impl Trail {
    /// Normalizes a search hit and decodes it
    pub fn from_hit(hit: &Value) -> Result<Self> {
        let cleaned = Normalizer::preprocess_data(hit)?;
        let id = cleaned
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string();
        serde_json::from_value(Value::Object(cleaned))
            .map_err(|e| anyhow!("could not decode trail {id}: {e}"))
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}{}", self.id)
    }

    /// "Tyrestaleden 12.5 km"
    pub fn label(&self, unit: &str) -> String {
        format!("{} {} {unit}", self.name_sv, format_length(self.length))
    }

    pub fn municipality<'a>(&self, municipalities: &'a Municipalities) -> Result<&'a Municipality> {
        municipalities
            .lookup(self.municipality_id)
            .ok_or_else(|| NaturkartanError::MunicipalityNotFound(self.municipality_id).into())
    }

    pub fn municipality_name_sv(&self, municipalities: &Municipalities) -> Result<String> {
        self.municipality(municipalities)?
            .name_sv()
            .ok_or_else(|| anyhow!("municipality {} has no Swedish name", self.municipality_id))
    }

    pub async fn municipality_qid<K: KnowledgeBase + ?Sized + Sync>(
        &self,
        municipalities: &Municipalities,
        kb: &K,
        cache: &mut QidCache,
    ) -> Result<String> {
        self.municipality(municipalities)?.qid(kb, cache).await
    }

    /// Finds the item carrying this trail's Naturkartan ID.
    /// `None` if the trail is not in Wikidata yet.
    pub async fn wikidata_qid<K: KnowledgeBase + ?Sized + Sync>(
        &self,
        kb: &K,
    ) -> Result<Option<String>> {
        let sparql = format!(
            r#"SELECT ?item WHERE {{ ?item wdt:{PROP_NATURKARTAN_ID} "{}" . }}"#,
            escape_sparql(&self.id)
        );
        let qids = kb.find_items(&sparql).await?;
        match qids.len() {
            0 => {
                info!("trail {} not found in WD", self.id);
                Ok(None)
            }
            1 => Ok(qids.into_iter().next()),
            found => Err(NaturkartanError::AmbiguousQid {
                query: self.id.to_owned(),
                found,
            }
            .into()),
        }
    }

    /// Reads publisher and county from the trail page
    pub fn parse_publisher(html: &str) -> Result<(String, String)> {
        let selector = Selector::parse("script[event-organization]")
            .map_err(|e| anyhow!("bad selector: {e:?}"))?;
        let doc = Html::parse_document(html);
        let script = doc
            .select(&selector)
            .next()
            .ok_or_else(|| anyhow!("Script tag with 'event-organization' not found."))?;
        let organization = script.value().attr("event-organization").unwrap_or_default();
        let county = script.value().attr("event-county").unwrap_or_default();
        Ok((organization.to_string(), county.to_string()))
    }

    pub async fn fetch_publisher(&mut self, client: &reqwest::Client, base_url: &str) -> Result<()> {
        let url = self.url(base_url);
        let response = client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(NaturkartanError::BadStatus {
                url,
                status: status.as_u16(),
            }
            .into());
        }
        let html = response.text().await?;
        let (publisher, county) = Self::parse_publisher(&html)?;
        info!("trail {}: publisher '{publisher}', county '{county}'", self.id);
        self.publisher = publisher;
        self.county = county;
        Ok(())
    }

    /// Asks the operator for what the API does not know
    pub fn get_information<P: Prompter + ?Sized>(
        &mut self,
        prompter: &mut P,
        municipalities: &Municipalities,
        app: &AppState,
        count: usize,
        total: usize,
    ) -> Result<()> {
        let municipality = self
            .municipality_name_sv(municipalities)
            .unwrap_or_else(|_| "unknown municipality".to_string());
        prompter.show(&format!(
            "{count}/{total}: {} ({municipality})\n{}",
            self.label(&app.length_unit),
            self.url(&app.trail_base_url)
        ));
        if let Some(qid) = &self.qid {
            prompter.show(&format!("already in Wikidata as {qid}"));
            self.already_present = true;
            return Ok(());
        }
        self.already_present = prompter.confirm("Is this trail already in Wikidata?")?;
        if self.already_present {
            return Ok(());
        }
        self.length_source_url = prompter.ask("URL confirming the length (empty to skip):")?;
        self.number_of_sections = loop {
            let answer = prompter.ask("Number of sections (empty to skip):")?;
            let answer = answer.trim();
            if answer.is_empty() {
                break None;
            }
            match answer.parse::<u32>() {
                Ok(n) => break Some(n),
                Err(_) => prompter.show(&format!("'{answer}' is not a number")),
            }
        };
        if self.number_of_sections.is_some() {
            self.section_source_url = prompter.ask("URL confirming the sections:")?;
        }
        Ok(())
    }
}

/// Which trails are worth reporting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailFilter {
    pub min_length: f64,
    pub max_length: f64,
}

impl TrailFilter {
    pub const fn new(min_length: f64, max_length: f64) -> Self {
        Self {
            min_length,
            max_length,
        }
    }

    pub const fn from_app(app: &AppState) -> Self {
        Self::new(app.minimum_trail_length, app.maximum_trail_length)
    }

    pub fn matches(&self, trail: &Trail) -> bool {
        trail.trail_type == TRAIL_TYPE
            // no bike routes
            && !trail.name_sv.to_lowercase().contains(BICYCLE_ROUTE_MARKER)
            // short paths are not notable
            && self.min_length <= trail.length
            && trail.length < self.max_length
    }

    pub fn filter(&self, trails: &[Trail]) -> Vec<Trail> {
        trails.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

/// Keeps a decimal point, "10.0" rather than "10"
pub fn format_length(length: f64) -> String {
    format!("{length:?}")
}
