use crate::{
    app_state::AppState,
    error::NaturkartanError,
    knowledge_base::KnowledgeBase,
    wikidata_commands::{ClaimCommand, ExistingClaim, edit_entity_data},
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Wikidata {
    api_url: String,
    user_agent: String,
    mw_api: Option<mediawiki::api::Api>,
    bot_name: String,
    bot_password: String,
}

impl Wikidata {
    pub fn new(app: &AppState) -> Self {
        Self {
            api_url: app.wikidata_api.to_owned(),
            user_agent: app.user_agent.to_owned(),
            mw_api: None,
            bot_name: app.bot_name.to_owned(),
            bot_password: app.bot_password.to_owned(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    async fn get_mw_api(&self) -> Result<mediawiki::api::Api> {
        let mut api = mediawiki::api::Api::new(&self.api_url).await?;
        api.set_user_agent(self.user_agent.as_str());
        Ok(api)
    }

    /// Read-only access does not need a login
    async fn read_api(&self) -> Result<mediawiki::api::Api> {
        match &self.mw_api {
            Some(api) => Ok(api.clone()),
            None => self.get_mw_api().await,
        }
    }

    async fn api_log_in(&mut self) -> Result<()> {
        if self.mw_api.is_none() {
            self.mw_api = Some(self.get_mw_api().await?);
        }
        let mw_api = match self.mw_api.as_mut() {
            Some(api) => api,
            None => return Err(NaturkartanError::ApiUnreachable.into()),
        };
        if mw_api.user().logged_in() {
            // Already logged in
            return Ok(());
        }
        mw_api
            .login(self.bot_name.to_owned(), self.bot_password.to_owned())
            .await?;
        info!("logged in as {}", self.bot_name);
        Ok(())
    }

    /// Flattens SPARQL JSON results into `variable -> value` rows
    pub fn sparql_bindings(result: &Value) -> Vec<Vec<(String, String)>> {
        result["results"]["bindings"]
            .as_array()
            .map(|bindings| {
                bindings
                    .iter()
                    .filter_map(|b| b.as_object())
                    .map(|b| {
                        b.iter()
                            .filter_map(|(k, v)| Some((k.to_owned(), v["value"].as_str()?.to_string())))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parses a `wbgetclaims` response for one property
    pub fn claims_from_json(result: &Value, property: &str) -> Vec<ExistingClaim> {
        result["claims"][property]
            .as_array()
            .map(|claims| claims.iter().filter_map(ExistingClaim::from_json).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeBase for Wikidata {
    async fn sparql_rows(&self, sparql: &str) -> Result<Vec<Vec<(String, String)>>> {
        let api = self.read_api().await?;
        let result = api.sparql_query(sparql).await?;
        Ok(Self::sparql_bindings(&result))
    }

    async fn get_claims(&self, qid: &str, property: &str) -> Result<Vec<ExistingClaim>> {
        let api = self.read_api().await?;
        let params = api.params_into(&[
            ("action", "wbgetclaims"),
            ("entity", qid),
            ("property", property),
        ]);
        let result = api.get_query_api_json(&params).await?;
        if let Some(error) = result.get("error") {
            return Err(anyhow!("wbgetclaims failed for {qid}: {error}"));
        }
        Ok(Self::claims_from_json(&result, property))
    }

    async fn edit_claims(
        &mut self,
        qid: &str,
        commands: &[ClaimCommand],
        summary: &str,
    ) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        self.api_log_in().await?;
        let mw_api = self.mw_api.as_mut().ok_or(NaturkartanError::ApiUnreachable)?;
        let data = edit_entity_data(commands).to_string();
        let token = mw_api.get_edit_token().await?;
        let params = mw_api.params_into(&[
            ("action", "wbeditentity"),
            ("id", qid),
            ("data", data.as_str()),
            ("summary", summary),
            ("bot", "1"),
            ("token", token.as_str()),
        ]);
        let result = mw_api.post_query_api_json_mut(&params).await?;
        if let Some(error) = result.get("error") {
            warn!("wbeditentity failed for {qid}: {error}");
            return Err(anyhow!("wbeditentity failed for {qid}: {error}"));
        }
        Ok(())
    }
}
