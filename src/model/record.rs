//! Records flowing through the pipeline
//!
//! Upstream payloads are kept as JSON maps: the merge rules only depend on a
//! handful of well-known keys and everything else is carried through untouched.

use super::kinds::RecordKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw upstream record
pub type Record = Map<String, Value>;

/// The primary reference of a record: its `uri`, falling back to `ref`
pub fn record_identifier(record: &Record) -> Option<&str> {
    record
        .get("uri")
        .and_then(Value::as_str)
        .or_else(|| record.get("ref").and_then(Value::as_str))
}

/// True for absent values and for `null`, `""`, `[]` and `{}`
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

/// An identifier produced by change enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStub {
    pub uri: String,
    /// Whether the upstream marks the record as publishable
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

impl CandidateStub {
    pub fn new(uri: impl Into<String>, publish: bool) -> Self {
        Self {
            uri: uri.into(),
            publish,
        }
    }
}

/// A changed record handed to an enrichment worker
#[derive(Debug, Clone)]
pub struct ChangedRecord {
    pub payload: Record,
    /// False when the record should be removed downstream instead of enriched
    pub publishable: bool,
}

impl ChangedRecord {
    /// Build from a fetched payload, reading its `publish` flag (default true)
    pub fn from_payload(payload: Record) -> Self {
        let publishable = payload
            .get("publish")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Self {
            payload,
            publishable,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        record_identifier(&self.payload)
    }
}

/// Output of the merger: the enriched payload and the kind it should be stored as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub identifier: String,
    pub kind: RecordKind,
    pub payload: Record,
}

impl EnrichedRecord {
    pub fn new(identifier: impl Into<String>, kind: RecordKind, payload: Record) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identifier_prefers_uri_over_ref() {
        let r = record(json!({"uri": "/repositories/2/resources/1", "ref": "/other"}));
        assert_eq!(record_identifier(&r), Some("/repositories/2/resources/1"));

        let r = record(json!({"ref": "/api/components/4/"}));
        assert_eq!(record_identifier(&r), Some("/api/components/4/"));

        let r = record(json!({"title": "untitled"}));
        assert_eq!(record_identifier(&r), None);
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&json!(null))));
        assert!(is_empty_value(Some(&json!(""))));
        assert!(is_empty_value(Some(&json!([]))));
        assert!(is_empty_value(Some(&json!({}))));
        assert!(!is_empty_value(Some(&json!(0))));
        assert!(!is_empty_value(Some(&json!(false))));
        assert!(!is_empty_value(Some(&json!(["eng"]))));
    }

    #[test]
    fn changed_record_reads_publish_flag() {
        let published = ChangedRecord::from_payload(record(json!({"uri": "/a/1"})));
        assert!(published.publishable);

        let hidden = ChangedRecord::from_payload(record(json!({"uri": "/a/2", "publish": false})));
        assert!(!hidden.publishable);
        assert_eq!(hidden.identifier(), Some("/a/2"));
    }
}
