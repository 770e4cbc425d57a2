//! Inheritance from a record's ancestor chain
//!
//! Catalog records carry `ancestors` nearest first, each with the full
//! ancestor inlined under `_resolved`. Walks are iterative and refuse chains
//! deeper than the configured limit.

use super::traits::ResolutionError;
use crate::model::{is_empty_value, record_identifier, Record};
use serde_json::{json, Value};

/// The inlined ancestor records, nearest first
pub fn resolved_ancestors(record: &Record) -> impl Iterator<Item = &Record> {
    record
        .get("ancestors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("_resolved").and_then(Value::as_object))
}

fn bounded<'a>(
    record: &'a Record,
    max_depth: usize,
) -> impl Iterator<Item = Result<&'a Record, ResolutionError>> {
    resolved_ancestors(record).enumerate().map(move |(depth, ancestor)| {
        if depth >= max_depth {
            Err(ResolutionError::DepthExceeded {
                identifier: record_identifier(record).unwrap_or("<unknown>").to_string(),
                limit: max_depth,
            })
        } else {
            Ok(ancestor)
        }
    })
}

/// First non-empty value of `field` among the ancestors
pub fn closest_value<'a>(
    record: &'a Record,
    field: &str,
    max_depth: usize,
) -> Result<Option<&'a Value>, ResolutionError> {
    for ancestor in bounded(record, max_depth) {
        let value = ancestor?.get(field);
        if !is_empty_value(value) {
            return Ok(value);
        }
    }
    Ok(None)
}

/// Linked agents of a record whose role is `creator`
pub fn creators(record: &Record) -> Vec<&Value> {
    record
        .get("linked_agents")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|agent| agent.get("role").and_then(Value::as_str) == Some("creator"))
        .collect()
}

/// Every creator of the nearest ancestor that has at least one
pub fn closest_creators(record: &Record, max_depth: usize) -> Result<Vec<Value>, ResolutionError> {
    for ancestor in bounded(record, max_depth) {
        let found = creators(ancestor?);
        if !found.is_empty() {
            return Ok(found.into_iter().cloned().collect());
        }
    }
    Ok(Vec::new())
}

/// Compact stub for an ancestor reported by the arrangement service
pub fn arrangement_stub(ancestor: &Record) -> Record {
    let mut stub = Record::new();
    stub.insert(
        "ref".to_string(),
        ancestor
            .get("ref")
            .or_else(|| ancestor.get("uri"))
            .cloned()
            .unwrap_or(Value::Null),
    );
    stub.insert(
        "title".to_string(),
        ancestor.get("title").cloned().unwrap_or(Value::Null),
    );
    if let Some(order) = ancestor.get("order") {
        stub.insert("order".to_string(), order.clone());
    }
    stub.insert("type".to_string(), json!("collection"));
    stub
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn with_ancestors(ancestors: Vec<Value>) -> Record {
        let ancestors: Vec<Value> = ancestors
            .into_iter()
            .enumerate()
            .map(|(i, resolved)| json!({"ref": format!("/ancestors/{}", i), "_resolved": resolved}))
            .collect();
        record(json!({"uri": "/repositories/2/archival_objects/1", "ancestors": ancestors}))
    }

    #[test]
    fn closest_value_skips_empty_ancestors() {
        let rec = with_ancestors(vec![
            json!({"dates": []}),
            json!({"dates": ""}),
            json!({"title": "no dates key"}),
            json!({"dates": [{"expression": "1920-1940"}]}),
            json!({"dates": [{"expression": "ignored"}]}),
        ]);

        let value = closest_value(&rec, "dates", 64).unwrap().unwrap();
        assert_eq!(value, &json!([{"expression": "1920-1940"}]));
    }

    #[test]
    fn closest_value_is_none_when_exhausted() {
        let rec = with_ancestors(vec![json!({"language": {}}), json!({"language": null})]);
        assert_eq!(closest_value(&rec, "language", 64).unwrap(), None);

        let orphan = record(json!({"uri": "/x/1"}));
        assert_eq!(closest_value(&orphan, "language", 64).unwrap(), None);
    }

    #[test]
    fn walks_stop_at_the_depth_limit() {
        let rec = with_ancestors(vec![json!({}), json!({}), json!({"dates": ["d"]})]);
        assert!(matches!(
            closest_value(&rec, "dates", 2),
            Err(ResolutionError::DepthExceeded { limit: 2, .. })
        ));

        // A match inside the limit never reaches the deeper ancestors
        let rec = with_ancestors(vec![json!({"dates": ["d"]}), json!({}), json!({})]);
        assert!(closest_value(&rec, "dates", 1).unwrap().is_some());
    }

    #[test]
    fn closest_creators_returns_every_creator_of_first_match() {
        let rec = with_ancestors(vec![
            json!({"linked_agents": [{"ref": "/agents/people/1", "role": "subject"}]}),
            json!({"linked_agents": [
                {"ref": "/agents/people/2", "role": "creator"},
                {"ref": "/agents/people/3", "role": "subject"},
                {"ref": "/agents/people/4", "role": "creator"}
            ]}),
            json!({"linked_agents": [{"ref": "/agents/people/5", "role": "creator"}]}),
        ]);

        let found = closest_creators(&rec, 64).unwrap();
        let refs: Vec<&str> = found
            .iter()
            .filter_map(|c| c.get("ref").and_then(Value::as_str))
            .collect();
        assert_eq!(refs, vec!["/agents/people/2", "/agents/people/4"]);
    }

    #[test]
    fn closest_creators_empty_without_creators() {
        let rec = with_ancestors(vec![json!({"linked_agents": []}), json!({})]);
        assert!(closest_creators(&rec, 64).unwrap().is_empty());
    }

    #[test]
    fn arrangement_stub_is_a_collection_reference() {
        let stub = arrangement_stub(&record(json!({
            "ref": "/api/components/3/",
            "title": "Series I",
            "order": 2,
            "archivesspace_uri": "/repositories/2/resources/5"
        })));
        assert_eq!(
            Value::Object(stub),
            json!({"ref": "/api/components/3/", "title": "Series I", "order": 2, "type": "collection"})
        );
    }
}
