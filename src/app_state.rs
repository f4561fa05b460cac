use anyhow::Result;
use serde_json::Value;
use std::env;
use std::fs::File;
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str =
    "NaturkartanScraper/0.1 (https://www.wikidata.org/wiki/Wikidata:Tools/NaturkartanScraper)";
pub const DEFAULT_API_BASE_URL: &str = "https://api.naturkartan.se";
pub const DEFAULT_SEARCH_URL: &str =
    "https://ts.naturkartan.se/collections/site:production/documents/search";
pub const DEFAULT_SEARCH_FILTER: &str = "(published:=true) && (category_ids:=33)";
pub const DEFAULT_TRAIL_BASE_URL: &str = "https://api.naturkartan.se/";
pub const DEFAULT_SITE_BASE_URL: &str = "https://www.naturkartan.se/sv/";
pub const DEFAULT_WIKIDATA_API: &str = "https://www.wikidata.org/w/api.php";

#[derive(Debug, Clone)]
pub struct AppState {
    pub user_agent: String,
    pub loglevel: String,
    pub api_base_url: String,
    pub api_key: String,
    pub search_url: String,
    pub search_api_key: String,
    pub search_filter: String,
    pub hits_per_page: usize,
    pub trail_base_url: String,
    pub site_base_url: String,
    pub minimum_trail_length: f64,
    pub maximum_trail_length: f64,
    pub length_unit: String,
    pub debug_folder: PathBuf,
    pub csv_file: PathBuf,
    pub wikidata_api: String,
    pub bot_name: String,
    pub bot_password: String,
    pub edit_delay_sec: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::from_config(&Value::Null)
    }
}

impl AppState {
    /// Create an AppState object from a config JSON file
    pub fn from_config_file(filename: &str) -> Result<Self> {
        let mut path = env::current_dir()?;
        path.push(filename);
        let file = File::open(&path)?;
        let config: Value = serde_json::from_reader(file)?;
        Ok(Self::from_config(&config))
    }

    /// Create an AppState object from a config JSON object.
    /// Missing keys fall back to the public Naturkartan endpoints.
    pub fn from_config(config: &Value) -> Self {
        let s = |key: &str, default: &str| -> String {
            config[key].as_str().unwrap_or(default).to_string()
        };
        Self {
            user_agent: s("user_agent", DEFAULT_USER_AGENT),
            loglevel: s("loglevel", "info"),
            api_base_url: s("api_base_url", DEFAULT_API_BASE_URL),
            api_key: s("api_key", ""),
            search_url: s("search_url", DEFAULT_SEARCH_URL),
            search_api_key: s("search_api_key", ""),
            search_filter: s("search_filter", DEFAULT_SEARCH_FILTER),
            hits_per_page: config["hits_per_page"].as_u64().unwrap_or(250) as usize,
            trail_base_url: s("trail_base_url", DEFAULT_TRAIL_BASE_URL),
            site_base_url: s("site_base_url", DEFAULT_SITE_BASE_URL),
            minimum_trail_length: config["minimum_trail_length"].as_f64().unwrap_or(5.0),
            maximum_trail_length: config["maximum_trail_length"].as_f64().unwrap_or(1000.0),
            length_unit: s("length_unit", "km"),
            debug_folder: PathBuf::from(s("debug_folder", "debug_pages")),
            csv_file: PathBuf::from(s("csv_file", "trails.csv")),
            wikidata_api: s("wikidata_api", DEFAULT_WIKIDATA_API),
            bot_name: s("bot_name", ""),
            bot_password: s("bot_password", ""),
            edit_delay_sec: config["edit_delay_sec"].as_u64().unwrap_or(3),
        }
    }

    /// Sets up `env_logger` with the configured level; `RUST_LOG` wins if set.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.loglevel.as_str());
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    /// Returns a HTTP client sending the configured user agent
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()?;
        Ok(client)
    }
}

#[cfg(test)]
pub fn get_test_app() -> AppState {
    AppState {
        edit_delay_sec: 0,
        ..Default::default()
    }
}
