use serde_json::{Value, json};
use std::collections::HashMap;

pub const PROP_NATURKARTAN_ID: &str = "P10467";
pub const PROP_REASON_FOR_DEPRECATED_RANK: &str = "P2241";
pub const ITEM_LINK_ROT: &str = "Q1193907";

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    String(String),
    Item(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRank {
    Normal,
    Preferred,
    Deprecated,
}

impl ClaimRank {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimRank::Normal => "normal",
            ClaimRank::Preferred => "preferred",
            ClaimRank::Deprecated => "deprecated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimPropertyValue {
    pub property: String,
    pub value: ClaimValue,
}

/// A statement as returned by `wbgetclaims`
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingClaim {
    pub id: String,
    pub snaktype: String,
    pub value: Option<String>,
    pub rank: String,
    pub mainsnak: Value,
}

impl ExistingClaim {
    pub fn from_json(j: &Value) -> Option<Self> {
        let mainsnak = j.get("mainsnak")?.to_owned();
        Some(Self {
            id: j["id"].as_str()?.to_string(),
            snaktype: mainsnak["snaktype"].as_str().unwrap_or("value").to_string(),
            value: mainsnak["datavalue"]["value"].as_str().map(|s| s.to_string()),
            rank: j["rank"].as_str().unwrap_or("normal").to_string(),
            mainsnak,
        })
    }

    /// "some value" and "no value" statements have no datavalue
    pub fn is_placeholder(&self) -> bool {
        self.snaktype != "value"
    }
}

/// One change inside a `wbeditentity` call
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimCommand {
    Remove {
        claim_id: String,
    },
    Create {
        property: String,
        value: ClaimValue,
        rank: Option<ClaimRank>,
        qualifiers: Vec<ClaimPropertyValue>,
    },
    /// Rewrites an existing statement; its qualifiers are replaced
    Update {
        claim: ExistingClaim,
        rank: Option<ClaimRank>,
        qualifiers: Vec<ClaimPropertyValue>,
    },
}

impl ClaimCommand {
    pub fn as_json(&self) -> Value {
        match self {
            ClaimCommand::Remove { claim_id } => json!({"id":claim_id,"remove":""}),
            ClaimCommand::Create {
                property,
                value,
                rank,
                qualifiers,
            } => {
                let mut claim = json!({
                    "mainsnak":Self::value_as_snak(property, value),
                    "type":"statement",
                    "rank":Self::rank_as_str(rank)
                });
                Self::add_qualifiers(&mut claim, qualifiers);
                claim
            }
            ClaimCommand::Update {
                claim: existing,
                rank,
                qualifiers,
            } => {
                let mut claim = json!({
                    "id":existing.id,
                    "mainsnak":existing.mainsnak,
                    "type":"statement",
                    "rank":Self::rank_as_str(rank)
                });
                Self::add_qualifiers(&mut claim, qualifiers);
                claim
            }
        }
    }

    fn add_qualifiers(claim: &mut Value, qualifiers: &[ClaimPropertyValue]) {
        if qualifiers.is_empty() {
            return;
        }
        let mut snaks: HashMap<String, Vec<Value>> = HashMap::new();
        for qualifier in qualifiers {
            let snak = Self::value_as_snak(&qualifier.property, &qualifier.value);
            snaks
                .entry(qualifier.property.to_owned())
                .or_default()
                .push(snak);
        }
        claim["qualifiers"] = json!(snaks);
    }

    fn rank_as_str(rank: &Option<ClaimRank>) -> &'static str {
        rank.unwrap_or(ClaimRank::Normal).as_str()
    }

    fn datavalue_as_snak(property: &str, datavalue: Value) -> Value {
        json!({"snaktype":"value","property":property,"datavalue":datavalue})
    }

    fn value_as_snak(property: &str, value: &ClaimValue) -> Value {
        Self::datavalue_as_snak(property, Self::as_datavalue(value))
    }

    fn as_datavalue(value: &ClaimValue) -> Value {
        match value {
            ClaimValue::String(s) => json!({"value":s,"type":"string"}),
            ClaimValue::Item(q) => {
                let numeric_id: u64 = q.trim_start_matches('Q').parse().unwrap_or_default();
                json!({"value":{"entity-type":"item","numeric-id":numeric_id,"id":q},"type":"wikibase-entityid"})
            }
        }
    }
}

/// The `data` parameter of `wbeditentity` for a list of claim changes
pub fn edit_entity_data(commands: &[ClaimCommand]) -> Value {
    let claims: Vec<Value> = commands.iter().map(|c| c.as_json()).collect();
    json!({ "claims": claims })
}

/// Removes every existing claim and adds `P10467 = new_id`, in one edit
pub fn replace_identifier_commands(existing: &[ExistingClaim], new_id: &str) -> Vec<ClaimCommand> {
    let mut ret: Vec<ClaimCommand> = existing
        .iter()
        .map(|c| ClaimCommand::Remove {
            claim_id: c.id.to_owned(),
        })
        .collect();
    ret.push(ClaimCommand::Create {
        property: PROP_NATURKARTAN_ID.to_string(),
        value: ClaimValue::String(new_id.to_string()),
        rank: None,
        qualifiers: vec![],
    });
    ret
}

/// Deprecates the claim with "reason for deprecated rank: link rot"
pub fn link_rot_command(claim: &ExistingClaim) -> ClaimCommand {
    ClaimCommand::Update {
        claim: claim.to_owned(),
        rank: Some(ClaimRank::Deprecated),
        qualifiers: vec![ClaimPropertyValue {
            property: PROP_REASON_FOR_DEPRECATED_RANK.to_string(),
            value: ClaimValue::Item(ITEM_LINK_ROT.to_string()),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(id: &str, value: Option<&str>) -> ExistingClaim {
        let mainsnak = match value {
            Some(v) => json!({"snaktype":"value","property":"P10467","datavalue":{"value":v,"type":"string"}}),
            None => json!({"snaktype":"somevalue","property":"P10467"}),
        };
        ExistingClaim::from_json(&json!({"id":id,"mainsnak":mainsnak,"rank":"normal","type":"statement"}))
            .unwrap()
    }

    #[test]
    fn test_rank_as_str() {
        assert_eq!(ClaimRank::Normal.as_str(), "normal");
        assert_eq!(ClaimRank::Preferred.as_str(), "preferred");
        assert_eq!(ClaimRank::Deprecated.as_str(), "deprecated");
    }

    #[test]
    fn test_existing_claim_from_json() {
        let claim = existing("Q1$abc", Some("stockholm/tyresta"));
        assert_eq!(claim.value, Some("stockholm/tyresta".to_string()));
        assert!(!claim.is_placeholder());
        let claim = existing("Q1$def", None);
        assert_eq!(claim.value, None);
        assert!(claim.is_placeholder());
        assert!(ExistingClaim::from_json(&json!({"id":"x"})).is_none());
    }

    #[test]
    fn test_as_datavalue() {
        assert_eq!(
            ClaimCommand::as_datavalue(&ClaimValue::String("13979".to_string())),
            json!({"value":"13979","type":"string"})
        );
        assert_eq!(
            ClaimCommand::as_datavalue(&ClaimValue::Item("Q1193907".to_string())),
            json!({"value":{"entity-type":"item","numeric-id":1193907,"id":"Q1193907"},"type":"wikibase-entityid"})
        );
    }

    #[test]
    fn test_replace_identifier_commands() {
        let claims = vec![existing("Q1$a", Some("old/path")), existing("Q1$b", None)];
        let data = edit_entity_data(&replace_identifier_commands(&claims, "13979"));
        assert_eq!(
            data,
            json!({"claims":[
                {"id":"Q1$a","remove":""},
                {"id":"Q1$b","remove":""},
                {"mainsnak":{"snaktype":"value","property":"P10467","datavalue":{"value":"13979","type":"string"}},"type":"statement","rank":"normal"}
            ]})
        );
    }

    #[test]
    fn test_link_rot_command() {
        let claim = existing("Q1$a", Some("old/path"));
        let data = edit_entity_data(&[link_rot_command(&claim)]);
        assert_eq!(
            data,
            json!({"claims":[{
                "id":"Q1$a",
                "mainsnak":{"snaktype":"value","property":"P10467","datavalue":{"value":"old/path","type":"string"}},
                "type":"statement",
                "rank":"deprecated",
                "qualifiers":{"P2241":[{"snaktype":"value","property":"P2241","datavalue":{"value":{"entity-type":"item","numeric-id":1193907,"id":"Q1193907"},"type":"wikibase-entityid"}}]}
            }]})
        );
    }
}
