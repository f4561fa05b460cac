use crate::error::NaturkartanError;
use log::debug;
use serde_json::{Map, Value, json};
use std::error::Error;
use std::fmt;

/// One field the search API sent in a shape that could not be coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub value: Value,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}: {}", self.field, self.value, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Error for ValidationErrors {}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "invalid fields: {}", parts.join("; "))
    }
}

/// `null`, `""` and `"None"` all mean "no value" upstream.
pub fn is_sentinel(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "None",
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// The search API returns messy datatypes, so clean them up.
    /// Takes a whole hit and returns the cleaned `document` object.
    pub fn preprocess_data(hit: &Value) -> Result<Map<String, Value>, ValidationErrors> {
        let document = match hit.get("document").and_then(|d| d.as_object()) {
            Some(document) => document,
            None => {
                return Err(ValidationErrors(vec![FieldError {
                    field: "document".to_string(),
                    value: hit.get("document").cloned().unwrap_or(Value::Null),
                    reason: NaturkartanError::MissingDocument.to_string(),
                }]));
            }
        };
        Self::preprocess_document(document)
    }

    pub fn preprocess_document(
        document: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ValidationErrors> {
        debug!("cleaning the data");
        let mut errors = vec![];
        let mut cleaned = Map::new();
        for (key, value) in document {
            let new_value = match key.as_str() {
                "name_en" if is_sentinel(value) => json!(""),
                "time" | "length" | "municipality_id" if is_sentinel(value) => json!(0),
                "average_rating" if is_sentinel(value) => {
                    debug!("cleaning up average_rating");
                    json!(0.0)
                }
                "length" | "average_rating" => match Self::coerce_float(value) {
                    Ok(v) => v,
                    Err(reason) => {
                        errors.push(Self::field_error(key, value, reason));
                        continue;
                    }
                },
                "time" | "municipality_id" | "importance" | "popularity" if !is_sentinel(value) => {
                    match Self::coerce_int(value) {
                        Ok(v) => v,
                        Err(reason) => {
                            errors.push(Self::field_error(key, value, reason));
                            continue;
                        }
                    }
                }
                _ => value.to_owned(),
            };
            cleaned.insert(key.to_owned(), new_value);
        }

        // flatten _geo
        if let Some(geo) = document.get("_geo").and_then(|g| g.as_object()) {
            cleaned.insert("lat".to_string(), geo.get("lat").cloned().unwrap_or(Value::Null));
            cleaned.insert("lng".to_string(), geo.get("lng").cloned().unwrap_or(Value::Null));
        }

        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Locale-independent: only `.` is a decimal separator.
    fn parse_float(s: &str) -> Option<f64> {
        let f = s.trim().parse::<f64>().ok()?;
        f.is_finite().then_some(f)
    }

    /// Numeric strings become floats, numbers pass through
    fn coerce_float(value: &Value) -> Result<Value, &'static str> {
        match value.as_str() {
            Some(s) => Self::parse_float(s).map(|f| json!(f)).ok_or("not a number"),
            None => Ok(value.to_owned()),
        }
    }

    /// Numeric strings and integral floats become integers
    fn coerce_int(value: &Value) -> Result<Value, &'static str> {
        match value {
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| json!(i))
                .map_err(|_| "not an integer"),
            Value::Number(n) if n.is_f64() => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(json!(f as i64)),
                _ => Err("not an integer"),
            },
            _ => Ok(value.to_owned()),
        }
    }

    fn field_error(key: &str, value: &Value, reason: &str) -> FieldError {
        FieldError {
            field: key.to_string(),
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }
}
