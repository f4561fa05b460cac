use crate::{app_state::AppState, error::NaturkartanError, municipality::Municipality};
use anyhow::Result;
use log::{error, info};
use serde_json::Value;
use std::collections::HashSet;

const MUNICIPALITIES_PATH: &str = "/v3/municipalities";
const JSON_API_MIME: &str = "application/vnd.api+json";

/// All Swedish municipalities known to Naturkartan, downloaded once per run.
#[derive(Debug, Clone, Default)]
pub struct Municipalities {
    municipalities: HashSet<Municipality>,
    data: Vec<Value>,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl Municipalities {
    pub fn new(app: &AppState) -> Result<Self> {
        Ok(Self {
            base_url: app.api_base_url.trim_end_matches('/').to_string(),
            api_key: app.api_key.to_owned(),
            client: app.http_client()?,
            ..Default::default()
        })
    }

    /// Builds a directory from already parsed records
    pub fn from_municipalities(municipalities: impl IntoIterator<Item = Municipality>) -> Self {
        Self {
            municipalities: municipalities.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Fetches one page. An empty cursor means the first page.
    /// Returns the page records and the relative link to the next page, if any.
    pub async fn fetch_page(&self, cursor: &str) -> Result<(Vec<Value>, Option<String>)> {
        let url = if cursor.is_empty() {
            format!("{}{MUNICIPALITIES_PATH}", self.base_url)
        } else {
            format!("{}{cursor}", self.base_url)
        };
        info!("downloading url: {url}");
        let response = self
            .client
            .get(&url)
            .header("Accept", JSON_API_MIME)
            .header("Content-Type", JSON_API_MIME)
            .header("X-Naturkartan-API-Key", self.api_key.as_str())
            .send()
            .await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(NaturkartanError::BadStatus {
                url,
                status: status.as_u16(),
            }
            .into());
        }
        let json: Value = response.json().await?;
        let records = json["data"].as_array().cloned().unwrap_or_default();
        let next = json["links"]["next"]
            .as_str()
            .filter(|next| !next.is_empty())
            .map(|next| next.to_string());
        if let Some(next) = &next {
            info!("found next: {next}");
        }
        Ok((records, next))
    }

    /// Follows the `next` links until the last page. Any failed page aborts.
    pub async fn download_all(&mut self) -> Result<()> {
        let mut cursor = String::new();
        let mut count = 1;
        loop {
            info!("request = {count}, len(data) = {}", self.data.len());
            let (records, next) = self.fetch_page(&cursor).await?;
            self.data.extend(records);
            count += 1;
            match next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(())
    }

    /// Parses the downloaded records into the set, deduplicating by id
    pub fn build_index(&mut self) -> Result<&HashSet<Municipality>> {
        for item in &self.data {
            let municipality = Municipality::from_json(item)?;
            self.municipalities.insert(municipality);
        }
        info!("Found {} unique municipalities", self.municipalities.len());
        Ok(&self.municipalities)
    }

    pub async fn download_and_parse(&mut self) -> Result<()> {
        self.download_all().await?;
        self.build_index()?;
        Ok(())
    }

    /// Returns `None` (and logs) if no municipality has this id
    pub fn lookup(&self, id: i64) -> Option<&Municipality> {
        let ret = self.municipalities.iter().find(|m| m.id == id);
        if ret.is_none() {
            error!("municipality with id {id} not found");
        }
        ret
    }

    pub fn len(&self) -> usize {
        self.municipalities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.municipalities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Municipality> {
        self.municipalities.iter()
    }
}
