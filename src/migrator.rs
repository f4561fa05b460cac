use crate::{
    app_state::AppState,
    error::NaturkartanError,
    knowledge_base::KnowledgeBase,
    prompt::Prompter,
    site::{Site, SiteState},
    wikidata_commands::{
        ClaimCommand, PROP_NATURKARTAN_ID, link_rot_command, replace_identifier_commands,
    },
};
use anyhow::Result;
use log::{error, info, warn};
use std::time::Duration;

const TOOL_LINK: &str = "[[Wikidata:Tools/NaturkartanScraper|NaturkartanScraper]]";

/// What happened to the sites of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub already_migrated: usize,
    pub placeholders_removed: usize,
    pub migrated: usize,
    pub link_rot_recorded: usize,
    pub declined: usize,
    pub skipped: usize,
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} already migrated, {} placeholders removed, {} migrated, {} link rot recorded, {} declined, {} skipped",
            self.already_migrated,
            self.placeholders_removed,
            self.migrated,
            self.link_rot_recorded,
            self.declined,
            self.skipped
        )
    }
}

/// Migrates old path based Naturkartan IDs to the new numeric ones
#[derive(Debug)]
pub struct NaturkartanMigrator<K: KnowledgeBase + Sync, P: Prompter> {
    kb: K,
    prompter: P,
    client: reqwest::Client,
    site_base_url: String,
    edit_delay: Duration,
    dry_run: bool,
    pub sites: Vec<Site>,
}

impl<K: KnowledgeBase + Sync, P: Prompter> NaturkartanMigrator<K, P> {
    pub fn new(app: &AppState, kb: K, prompter: P) -> Result<Self> {
        Ok(Self {
            kb,
            prompter,
            client: app.http_client()?,
            site_base_url: app.site_base_url.to_owned(),
            edit_delay: Duration::from_secs(app.edit_delay_sec),
            dry_run: false,
            sites: vec![],
        })
    }

    /// Log edits instead of making them
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn kb(&self) -> &K {
        &self.kb
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub async fn get_data(&mut self) -> Result<()> {
        self.sites = self
            .kb
            .items_with_property(PROP_NATURKARTAN_ID)
            .await?
            .into_iter()
            .map(|(qid, path)| Site::new(&qid, &path, &self.site_base_url))
            .collect();
        info!("found {} sites with a Naturkartan ID", self.sites.len());
        Ok(())
    }

    pub async fn start(&mut self) -> Result<MigrationReport> {
        self.get_data().await?;
        self.iterate_sites().await
    }

    /// Runs every site through the migration. Missing ids on downloaded
    /// pages and unexpected claim counts stop the whole run.
    pub async fn iterate_sites(&mut self) -> Result<MigrationReport> {
        let mut sites = std::mem::take(&mut self.sites);
        let result = self.process_sites(&mut sites).await;
        self.sites = sites;
        let report = result?;
        info!("Migration done: {report}");
        Ok(report)
    }

    async fn process_sites(&mut self, sites: &mut [Site]) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let total = sites.len();
        info!("iterating {total} sites");
        for (num, site) in sites.iter_mut().enumerate() {
            info!("working on {}/{total}: {}", num + 1, site.wikidata_url());
            match site.classify() {
                SiteState::AlreadyMigrated => {
                    info!("{} already migrated", site.qid);
                    report.already_migrated += 1;
                }
                SiteState::HasPlaceholderValue => {
                    if self.remove_some_value(site).await? {
                        report.placeholders_removed += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                SiteState::NeedsMigration => {
                    info!("{} has legacy path {}", site.qid, site.url());
                    if let Err(e) = site.check_html(&self.client).await {
                        error!("Could not download {} for {}: {e}", site.url(), site.qid);
                        report.skipped += 1;
                        continue;
                    }
                    if site.download_success {
                        site.find_new_id()?;
                        self.migrate_to_new_id(site).await?;
                        report.migrated += 1;
                    } else if self.upload_link_rot_information(site).await? {
                        report.link_rot_recorded += 1;
                    } else {
                        report.declined += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Removes the "some value"/"no value" statements, leaving the rest.
    /// Returns false if there was nothing to remove
    pub async fn remove_some_value(&mut self, site: &Site) -> Result<bool> {
        let claims = self.kb.get_claims(&site.qid, PROP_NATURKARTAN_ID).await?;
        let commands: Vec<ClaimCommand> = claims
            .iter()
            .filter(|claim| claim.is_placeholder())
            .map(|claim| ClaimCommand::Remove {
                claim_id: claim.id.to_owned(),
            })
            .collect();
        if commands.is_empty() {
            warn!("{}: no placeholder statement found", site.qid);
            return Ok(false);
        }
        let summary = format!("Removed placeholder value using {TOOL_LINK}");
        self.write(&site.qid, &commands, &summary).await?;
        Ok(true)
    }

    /// Replaces all existing statements with the numeric id, in one edit
    pub async fn migrate_to_new_id(&mut self, site: &Site) -> Result<()> {
        let claims = self.kb.get_claims(&site.qid, PROP_NATURKARTAN_ID).await?;
        let commands = replace_identifier_commands(&claims, &site.id.to_string());
        let summary = format!("Migrated to new ID using {TOOL_LINK}");
        self.write(&site.qid, &commands, &summary).await
    }

    /// Deprecates the statement as link rot once the operator agrees.
    /// Returns false if they did not.
    pub async fn upload_link_rot_information(&mut self, site: &Site) -> Result<bool> {
        let question = format!(
            "{} could not be downloaded. Mark the Naturkartan ID of {} as link rot?",
            site.url(),
            site.wikidata_url()
        );
        if !self.prompter.confirm(&question)? {
            info!("{}: link rot not recorded", site.qid);
            return Ok(false);
        }
        let claims = self.kb.get_claims(&site.qid, PROP_NATURKARTAN_ID).await?;
        if claims.len() != 1 {
            return Err(NaturkartanError::UnexpectedClaimCount {
                qid: site.qid.to_owned(),
                property: PROP_NATURKARTAN_ID.to_string(),
                found: claims.len(),
            }
            .into());
        }
        let commands = [link_rot_command(&claims[0])];
        let summary = format!("Marked Naturkartan ID as link rot using {TOOL_LINK}");
        self.write(&site.qid, &commands, &summary).await?;
        Ok(true)
    }

    async fn write(&mut self, qid: &str, commands: &[ClaimCommand], summary: &str) -> Result<()> {
        if self.dry_run {
            info!("DRY RUN {qid}: {summary} ({} changes)", commands.len());
            return Ok(());
        }
        self.kb.edit_claims(qid, commands, summary).await?;
        info!("Upload complete for {qid}");
        tokio::time::sleep(self.edit_delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::get_test_app;
    use crate::knowledge_base::testing::MockKnowledgeBase;
    use crate::prompt::AutoConfirm;
    use crate::prompt::testing::ScriptedPrompter;
    use crate::wikidata_commands::ExistingClaim;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MAP_DIV: &str = r#"<html><body><div class="site-page-media__map"><div class="map-new" data-naturkartan-preselected-site-id="13979"></div></div></body></html>"#;

    fn claim(id: &str, value: Option<&str>) -> ExistingClaim {
        let mainsnak = match value {
            Some(v) => json!({"snaktype": "value", "property": "P10467", "datavalue": {"value": v, "type": "string"}}),
            None => json!({"snaktype": "somevalue", "property": "P10467"}),
        };
        ExistingClaim::from_json(&json!({"id": id, "rank": "normal", "mainsnak": mainsnak})).unwrap()
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sv/stockholm/tyresta"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MAP_DIV))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sv/uppsala/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sv/uppsala/redesigned"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><div class=\"map\"></div></html>"))
            .mount(&server)
            .await;
        server
    }

    fn migrator<P: Prompter>(
        server: &MockServer,
        kb: MockKnowledgeBase,
        prompter: P,
    ) -> NaturkartanMigrator<MockKnowledgeBase, P> {
        let mut app = get_test_app();
        app.site_base_url = format!("{}/sv/", server.uri());
        NaturkartanMigrator::new(&app, kb, prompter).unwrap()
    }

    #[tokio::test]
    async fn test_get_data() {
        let server = server().await;
        let kb = MockKnowledgeBase::with_items(&[("Q1", "12345"), ("Q2", "stockholm/tyresta")]);
        let mut m = migrator(&server, kb, AutoConfirm);
        m.get_data().await.unwrap();
        assert_eq!(m.sites.len(), 2);
        assert_eq!(m.sites[1].qid, "Q2");
        assert_eq!(m.sites[1].url(), format!("{}/sv/stockholm/tyresta", server.uri()));
    }

    #[tokio::test]
    async fn test_already_migrated() {
        let server = server().await;
        let kb = MockKnowledgeBase::with_items(&[("Q1", "12345")]);
        let mut m = migrator(&server, kb, ScriptedPrompter::new(&[]));
        let report = m.start().await.unwrap();
        assert_eq!(report.already_migrated, 1);
        assert!(m.kb().edits.is_empty());
        assert!(m.prompter().questions.is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_removed() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q2", "http://www.wikidata.org/.well-known/genid/x")]);
        kb.claims.insert(
            "Q2".to_string(),
            vec![claim("Q2$some", None), claim("Q2$real", Some("13979"))],
        );
        let mut m = migrator(&server, kb, AutoConfirm);
        let report = m.start().await.unwrap();
        assert_eq!(report.placeholders_removed, 1);
        let edits = &m.kb().edits;
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, "Q2");
        assert_eq!(
            edits[0].1,
            json!({"claims": [{"id": "Q2$some", "remove": ""}]})
        );
    }

    #[tokio::test]
    async fn test_placeholder_already_gone() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q2", "http://www.wikidata.org/.well-known/genid/x")]);
        kb.claims
            .insert("Q2".to_string(), vec![claim("Q2$real", Some("13979"))]);
        let mut m = migrator(&server, kb, AutoConfirm);
        let report = m.start().await.unwrap();
        assert_eq!(report.placeholders_removed, 0);
        assert_eq!(report.skipped, 1);
        assert!(m.kb().edits.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_to_new_id() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q3", "stockholm/tyresta")]);
        kb.claims.insert(
            "Q3".to_string(),
            vec![claim("Q3$a", Some("stockholm/tyresta")), claim("Q3$b", Some("stockholm/tyresta2"))],
        );
        let mut m = migrator(&server, kb, ScriptedPrompter::new(&[]));
        let report = m.start().await.unwrap();
        assert_eq!(report.migrated, 1);
        assert_eq!(m.sites[0].id, 13979);
        let edits = &m.kb().edits;
        assert_eq!(edits.len(), 1);
        let claims = edits[0].1["claims"].as_array().unwrap();
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[0], json!({"id": "Q3$a", "remove": ""}));
        assert_eq!(claims[1], json!({"id": "Q3$b", "remove": ""}));
        assert_eq!(claims[2]["mainsnak"]["property"], "P10467");
        assert_eq!(claims[2]["mainsnak"]["datavalue"]["value"], "13979");
        assert!(edits[0].2.starts_with("Migrated to new ID"));
        // no confirmation needed for a successful migration
        assert!(m.prompter().questions.is_empty());
    }

    #[tokio::test]
    async fn test_link_rot_confirmed() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q4", "uppsala/gone")]);
        kb.claims
            .insert("Q4".to_string(), vec![claim("Q4$a", Some("uppsala/gone"))]);
        let mut m = migrator(&server, kb, ScriptedPrompter::new(&["y"]));
        let report = m.start().await.unwrap();
        assert_eq!(report.link_rot_recorded, 1);
        assert_eq!(m.sites[0].id, 0);
        let edits = &m.kb().edits;
        assert_eq!(edits.len(), 1);
        let claim = &edits[0].1["claims"][0];
        assert_eq!(claim["id"], "Q4$a");
        assert_eq!(claim["rank"], "deprecated");
        assert_eq!(
            claim["qualifiers"]["P2241"][0]["datavalue"]["value"]["id"],
            "Q1193907"
        );
    }

    #[tokio::test]
    async fn test_link_rot_declined() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q4", "uppsala/gone")]);
        kb.claims
            .insert("Q4".to_string(), vec![claim("Q4$a", Some("uppsala/gone"))]);
        let mut m = migrator(&server, kb, ScriptedPrompter::new(&["n"]));
        let report = m.start().await.unwrap();
        assert_eq!(report.declined, 1);
        assert!(m.kb().edits.is_empty());
    }

    #[tokio::test]
    async fn test_link_rot_unexpected_claim_count() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[("Q4", "uppsala/gone"), ("Q1", "12345")]);
        kb.claims.insert(
            "Q4".to_string(),
            vec![claim("Q4$a", Some("uppsala/gone")), claim("Q4$b", Some("x"))],
        );
        let mut m = migrator(&server, kb, AutoConfirm);
        let err = m.start().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<NaturkartanError>(),
            Some(&NaturkartanError::UnexpectedClaimCount {
                qid: "Q4".to_string(),
                property: "P10467".to_string(),
                found: 2
            })
        );
        assert!(m.kb().edits.is_empty());
        // sites survive an aborted run
        assert_eq!(m.sites.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_site_id_stops_run() {
        let server = server().await;
        let kb = MockKnowledgeBase::with_items(&[
            ("Q5", "uppsala/redesigned"),
            ("Q3", "stockholm/tyresta"),
        ]);
        let mut m = migrator(&server, kb, AutoConfirm);
        let err = m.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NaturkartanError>(),
            Some(NaturkartanError::MissingSiteId(_))
        ));
        assert!(m.kb().edits.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_skips_site() {
        let kb = MockKnowledgeBase::with_items(&[("Q6", "stockholm/tyresta")]);
        let mut app = get_test_app();
        app.site_base_url = "http://127.0.0.1:1/sv/".to_string();
        let mut m = NaturkartanMigrator::new(&app, kb, AutoConfirm).unwrap();
        let report = m.start().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(m.kb().edits.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run() {
        let server = server().await;
        let mut kb = MockKnowledgeBase::with_items(&[
            ("Q3", "stockholm/tyresta"),
            ("Q4", "uppsala/gone"),
        ]);
        kb.claims
            .insert("Q3".to_string(), vec![claim("Q3$a", Some("stockholm/tyresta"))]);
        kb.claims
            .insert("Q4".to_string(), vec![claim("Q4$a", Some("uppsala/gone"))]);
        let mut m = migrator(&server, kb, AutoConfirm);
        m.set_dry_run(true);
        let report = m.start().await.unwrap();
        assert_eq!(
            report,
            MigrationReport {
                migrated: 1,
                link_rot_recorded: 1,
                ..Default::default()
            }
        );
        assert!(m.kb().edits.is_empty());
    }
}
