use crate::wikidata_commands::{ClaimCommand, ExistingClaim};
use anyhow::Result;
use async_trait::async_trait;

/// Read and write access to the knowledge base the migrator publishes to.
#[async_trait]
pub trait KnowledgeBase {
    /// Runs a SPARQL query and returns its result bindings as
    /// `variable -> value` rows.
    async fn sparql_rows(&self, sparql: &str) -> Result<Vec<Vec<(String, String)>>>;

    async fn get_claims(&self, qid: &str, property: &str) -> Result<Vec<ExistingClaim>>;

    /// Applies all commands to the item in a single edit
    async fn edit_claims(
        &mut self,
        qid: &str,
        commands: &[ClaimCommand],
        summary: &str,
    ) -> Result<()>;

    /// Item IDs ("Q123") bound to `?item` by a SPARQL query
    async fn find_items(&self, sparql: &str) -> Result<Vec<String>> {
        let ret = self
            .sparql_rows(sparql)
            .await?
            .iter()
            .filter_map(|row| row.iter().find(|(k, _)| k == "item"))
            .map(|(_, v)| entity_from_uri(v))
            .collect();
        Ok(ret)
    }

    /// `(qid, value)` for every item having `property`
    async fn items_with_property(&self, property: &str) -> Result<Vec<(String, String)>> {
        let sparql = format!("SELECT ?item ?path WHERE {{ ?item wdt:{property} ?path . }}");
        let ret = self
            .sparql_rows(&sparql)
            .await?
            .iter()
            .filter_map(|row| {
                let item = row.iter().find(|(k, _)| k == "item")?;
                let path = row.iter().find(|(k, _)| k == "path")?;
                Some((entity_from_uri(&item.1), path.1.to_owned()))
            })
            .collect();
        Ok(ret)
    }
}

/// "http://www.wikidata.org/entity/Q42" => "Q42"
pub fn entity_from_uri(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}

/// Escapes a value for use inside a double-quoted SPARQL literal
pub fn escape_sparql(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
