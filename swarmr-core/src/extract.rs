use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::Action;

/// Pulls a resource identifier out of a response body.
pub trait IdExtractor: Debug + Send + Sync {
    fn extract(&self, body: &[u8]) -> Option<String>;
}

/// Reads the identifier at a JSON pointer (RFC 6901). String and integer ids are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointerExtractor {
    pointer: String,
}

pub const DEFAULT_ID_POINTER: &str = "/data/id";

impl JsonPointerExtractor {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl Default for JsonPointerExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_ID_POINTER)
    }
}

impl IdExtractor for JsonPointerExtractor {
    fn extract(&self, body: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        match value.pointer(&self.pointer)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// What a worker does after a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpPolicy {
    pub probability: f64,
    pub action: Action,
    #[serde(skip)]
    pub extractor: Arc<dyn IdExtractor>,
}

pub const DEFAULT_FOLLOW_UP_PROBABILITY: f64 = 0.3;

impl Default for FollowUpPolicy {
    fn default() -> Self {
        Self {
            probability: DEFAULT_FOLLOW_UP_PROBABILITY,
            action: Action::UpdateItem,
            extractor: Arc::new(JsonPointerExtractor::default()),
        }
    }
}

impl FollowUpPolicy {
    pub fn disabled() -> Self {
        Self {
            probability: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::InvalidProbability(self.probability));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numeric_and_string_ids() {
        let ex = JsonPointerExtractor::default();
        assert_eq!(
            ex.extract(br#"{"instance":"a","data":{"id":17}}"#).as_deref(),
            Some("17")
        );
        assert_eq!(
            ex.extract(br#"{"data":{"id":"abc-1"}}"#).as_deref(),
            Some("abc-1")
        );
    }

    #[test]
    fn malformed_or_missing_yields_none() {
        let ex = JsonPointerExtractor::default();
        assert_eq!(ex.extract(b"not json"), None);
        assert_eq!(ex.extract(br#"{"data":{}}"#), None);
        assert_eq!(ex.extract(br#"{"data":{"id":null}}"#), None);
        assert_eq!(ex.extract(br#"{"data":{"id":""}}"#), None);
        assert_eq!(ex.extract(b""), None);
    }

    #[test]
    fn custom_pointer() {
        let ex = JsonPointerExtractor::new("/id");
        assert_eq!(ex.extract(br#"{"id":5}"#).as_deref(), Some("5"));
    }

    #[test]
    fn probability_bounds() {
        assert!(FollowUpPolicy::default().validate().is_ok());
        assert!(FollowUpPolicy::disabled().validate().is_ok());
        let bad = FollowUpPolicy {
            probability: 1.5,
            ..FollowUpPolicy::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidProbability(_))));
        let nan = FollowUpPolicy {
            probability: f64::NAN,
            ..FollowUpPolicy::default()
        };
        assert!(nan.validate().is_err());
    }
}
