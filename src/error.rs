use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum NaturkartanError {
    ApiUnreachable,
    MissingDocument,
    BadStatus {
        url: String,
        status: u16,
    },
    MunicipalityNotFound(i64),
    AmbiguousQid {
        query: String,
        found: usize,
    },
    MissingSiteId(String),
    UnexpectedClaimCount {
        qid: String,
        property: String,
        found: usize,
    },
}

impl Error for NaturkartanError {}

impl fmt::Display for NaturkartanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ApiUnreachable => write!(f, "Wikidata API unreachable"),
            Self::MissingDocument => write!(f, "search hit has no document"),
            Self::BadStatus { url, status } => write!(f, "did not get 200 from {url}: {status}"),
            Self::MunicipalityNotFound(id) => write!(f, "municipality with id {id} not found"),
            Self::AmbiguousQid { query, found } => {
                write!(f, "expected exactly one item for '{query}', got {found}")
            }
            Self::MissingSiteId(url) => write!(f, "found no site id on {url}"),
            Self::UnexpectedClaimCount {
                qid,
                property,
                found,
            } => write!(f, "{qid} has {found} {property} claims, expected one"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            NaturkartanError::MunicipalityNotFound(42).to_string(),
            "municipality with id 42 not found"
        );
        assert_eq!(
            NaturkartanError::BadStatus {
                url: "https://example.org".to_string(),
                status: 404
            }
            .to_string(),
            "did not get 200 from https://example.org: 404"
        );
        assert_eq!(
            NaturkartanError::UnexpectedClaimCount {
                qid: "Q1".to_string(),
                property: "P10467".to_string(),
                found: 2
            }
            .to_string(),
            "Q1 has 2 P10467 claims, expected one"
        );
    }
}
