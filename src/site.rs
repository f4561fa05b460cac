use crate::error::NaturkartanError;
use anyhow::{Result, anyhow};
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use scraper::{Html, Selector};
use std::borrow::Cow;

pub const WIKIDATA_ENTITY_PAGE: &str = "https://www.wikidata.org/wiki/";
const PLACEHOLDER_MARKER: &str = "well-known";
const SITE_ID_ATTRIBUTE: &str = "data-naturkartan-preselected-site-id";

lazy_static! {
    static ref RE_NUMERIC_ID: Regex = Regex::new(r"^\d+$").expect("Regexp construction");
    static ref RE_PERCENT_ENCODED: Regex =
        Regex::new(r"%[0-9A-Fa-f]{2}").expect("Regexp construction");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    /// Path is already the numeric id
    AlreadyMigrated,
    /// SPARQL renders "some value" statements as a `.well-known` IRI
    HasPlaceholderValue,
    NeedsMigration,
}

/// An item carrying a Naturkartan ID, as found by SPARQL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Site {
    pub qid: String,
    pub path: String,
    pub base_url: String,
    /// Numeric id, 0 until found on the legacy page
    pub id: u64,
    pub html: String,
    pub download_success: bool,
}

impl Site {
    pub fn new(qid: &str, path: &str, base_url: &str) -> Self {
        Self {
            qid: qid.to_string(),
            path: path.to_string(),
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    pub fn classify(&self) -> SiteState {
        if self.path.contains(PLACEHOLDER_MARKER) {
            SiteState::HasPlaceholderValue
        } else if RE_NUMERIC_ID.is_match(&self.path) {
            SiteState::AlreadyMigrated
        } else {
            SiteState::NeedsMigration
        }
    }

    /// Legacy page; each path segment is percent-encoded unless it already is
    pub fn url(&self) -> String {
        let path = self
            .path
            .split('/')
            .map(|segment| {
                if RE_PERCENT_ENCODED.is_match(segment) {
                    Cow::Borrowed(segment)
                } else {
                    urlencoding::encode(segment)
                }
            })
            .join("/");
        format!("{}{path}", self.base_url)
    }

    pub fn wikidata_url(&self) -> String {
        format!("{WIKIDATA_ENTITY_PAGE}{}", self.qid)
    }

    /// Downloads the legacy page. A non-200 answer is not an error,
    /// it leaves `download_success` false.
    pub async fn check_html(&mut self, client: &reqwest::Client) -> Result<()> {
        let url = self.url();
        let response = client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::OK {
            self.html = response.text().await?;
            self.download_success = true;
        } else {
            warn!("Failed to fetch {url}: status code {status}");
            self.html.clear();
            self.download_success = false;
        }
        Ok(())
    }

    /// Reads the numeric id from the map element of the legacy page
    pub fn find_new_id(&mut self) -> Result<u64> {
        let selector =
            Selector::parse("div.map-new").map_err(|e| anyhow!("bad selector: {e:?}"))?;
        let doc = Html::parse_document(&self.html);
        let id = doc
            .select(&selector)
            .next()
            .and_then(|div| div.value().attr(SITE_ID_ATTRIBUTE))
            .and_then(|id| id.trim().parse::<u64>().ok())
            .ok_or_else(|| NaturkartanError::MissingSiteId(self.url()))?;
        info!("Preselected site ID for {}: {id}", self.qid);
        self.id = id;
        Ok(id)
    }
}
