use crate::{
    error::NaturkartanError,
    knowledge_base::{KnowledgeBase, escape_sparql},
    qid_cache::QidCache,
};
use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::hash::{Hash, Hasher};

pub const ITEM_SWEDISH_MUNICIPALITY: &str = "Q127448";

/// Accepts `123` as well as `"123"`; JSON:API sends identifiers as strings.
pub fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match &v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom(format!("bad id: {v}")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Name {
    pub id: Option<String>,
    pub nl: Option<String>,
    pub de: Option<String>,
    pub en: Option<String>,
    pub fi: Option<String>,
    pub pl: Option<String>,
    pub sv: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attributes {
    pub lat: f64,
    pub lon: f64,
    pub name: Name,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Municipality {
    #[serde(deserialize_with = "deserialize_lenient_id")]
    pub id: i64,
    pub attributes: Attributes,
    #[serde(rename = "type", default)]
    pub type_name: String,
}

impl PartialEq for Municipality {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Municipality {}

impl Hash for Municipality {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Municipality {
    /// Parses one `data` element of the municipalities endpoint.
    /// A missing latitude or longitude resets both to 0.0.
    pub fn from_json(item: &Value) -> Result<Self> {
        let mut item = item.to_owned();
        if let Some(attributes) = item.get_mut("attributes").and_then(|a| a.as_object_mut()) {
            let lat_missing = attributes.get("lat").map_or(true, Value::is_null);
            let lon_missing = attributes.get("lon").map_or(true, Value::is_null);
            if lat_missing || lon_missing {
                debug!("found no coordinates");
                attributes.insert("lat".to_string(), json!(0.0));
                attributes.insert("lon".to_string(), json!(0.0));
            }
        }
        serde_json::from_value(item).map_err(|e| anyhow!("bad municipality record: {e}"))
    }

    /// Swedish name as used for Wikidata labels, eg "Sala kommun"
    pub fn name_sv(&self) -> Option<String> {
        self.attributes
            .name
            .sv
            .as_ref()
            .map(|sv| format!("{sv} kommun"))
    }

    /// Looks up the municipality item by its Swedish label.
    /// The cache is keyed by that label.
    pub async fn qid<K: KnowledgeBase + ?Sized + Sync>(
        &self,
        kb: &K,
        cache: &mut QidCache,
    ) -> Result<String> {
        let name_sv = self
            .name_sv()
            .ok_or_else(|| anyhow!("municipality {} has no Swedish name", self.id))?;
        if let Some(qid) = cache.get(&name_sv) {
            return Ok(qid);
        }
        let qids = kb.find_items(&Self::qid_sparql(&name_sv)).await?;
        if qids.len() != 1 {
            return Err(NaturkartanError::AmbiguousQid {
                query: name_sv,
                found: qids.len(),
            }
            .into());
        }
        let qid = qids[0].to_owned();
        cache.insert(&name_sv, &qid);
        Ok(qid)
    }

    fn qid_sparql(name_sv: &str) -> String {
        let name_sv = escape_sparql(name_sv);
        format!(
            r#"SELECT ?item WHERE {{
  ?item wdt:P31 wd:{ITEM_SWEDISH_MUNICIPALITY} .
  ?item rdfs:label ?label .
  FILTER NOT EXISTS {{ ?item wdt:P576 [] }}
  FILTER((LANG(?label)) = "sv" && regex(?label, "{name_sv}"))
}}"#
        )
    }

    pub const fn latitude(&self) -> f64 {
        self.attributes.lat
    }

    pub const fn longitude(&self) -> f64 {
        self.attributes.lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample(id: Value, lat: Value) -> Value {
        json!({
            "id": id,
            "type": "municipalities",
            "attributes": {
                "lat": lat,
                "lon": 16.6,
                "name": {"sv": "Sala", "en": "Sala", "de": null}
            }
        })
    }

    #[test]
    fn test_from_json_string_id() {
        let m = Municipality::from_json(&sample(json!("1981"), json!(59.9))).unwrap();
        assert_eq!(m.id, 1981);
        assert_eq!(m.type_name, "municipalities");
        assert_eq!(m.latitude(), 59.9);
        assert_eq!(m.longitude(), 16.6);
    }

    #[test]
    fn test_from_json_missing_coordinates() {
        let m = Municipality::from_json(&sample(json!(1981), Value::Null)).unwrap();
        assert_eq!(m.latitude(), 0.0);
        assert_eq!(m.longitude(), 0.0);
    }

    #[test]
    fn test_from_json_bad_id() {
        assert!(Municipality::from_json(&sample(json!("sala"), json!(1.0))).is_err());
    }

    #[test]
    fn test_name_sv() {
        let m = Municipality::from_json(&sample(json!(1), json!(1.0))).unwrap();
        assert_eq!(m.name_sv(), Some("Sala kommun".to_string()));
    }

    #[test]
    fn test_equality_by_id() {
        let a = Municipality::from_json(&sample(json!(7), json!(1.0))).unwrap();
        let mut b = a.clone();
        b.attributes.name.sv = Some("Other".to_string());
        assert_eq!(a, b);
        let set: HashSet<Municipality> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_qid() {
        use crate::knowledge_base::testing::MockKnowledgeBase;
        let kb = MockKnowledgeBase::with_items(&[("Q499404", "")]);
        let mut cache = QidCache::default();
        let mut m = Municipality::from_json(&sample(json!(1981), json!(1.0))).unwrap();
        assert_eq!(m.qid(&kb, &mut cache).await.unwrap(), "Q499404");
        assert_eq!(cache.get("Sala kommun"), Some("Q499404".to_string()));
        let queries = kb.queries.lock().unwrap().clone();
        assert!(queries[0].contains(r#"regex(?label, "Sala kommun")"#));
        assert!(queries[0].contains("wd:Q127448"));

        m.attributes.name.sv = None;
        assert!(m.qid(&kb, &mut cache).await.is_err());
    }
}
