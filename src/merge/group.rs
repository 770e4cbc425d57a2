//! Group metadata: the outermost record a record belongs to

use crate::model::{is_empty_value, record_identifier, Record, RecordKind};
use crate::resolver::ancestry::creators;
use serde_json::{json, Value};

fn first_present<'a>(record: &'a Record, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !is_empty_value(Some(*value)))
}

fn title_of(record: &Record) -> Value {
    first_present(record, &["title", "display_string"])
        .or_else(|| record.get("display_name").and_then(|n| n.get("sort_name")))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Creator links of a record as `{ref, role, type, title}` stubs
fn creator_stubs(record: &Record) -> Vec<Value> {
    creators(record)
        .into_iter()
        .map(|agent| {
            let resolved = agent.get("_resolved").and_then(Value::as_object);
            json!({
                "ref": agent.get("ref").cloned().unwrap_or(Value::Null),
                "role": "creator",
                "type": resolved
                    .and_then(|r| r.get("agent_type"))
                    .or_else(|| agent.get("type"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "title": resolved
                    .map(title_of)
                    .or_else(|| agent.get("title").cloned())
                    .unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn summary(identifier: Value, record: &Record) -> Value {
    json!({
        "identifier": identifier,
        "title": title_of(record),
        "dates": first_present(record, &["dates", "dates_of_existence"])
            .cloned()
            .unwrap_or_else(|| json!([])),
        "creators": creator_stubs(record),
    })
}

/// Summary of the outermost ancestor, or of the record itself for entities
/// and records without ancestors
pub fn group_for(record: &Record, kind: RecordKind) -> Value {
    let outermost = if kind.is_entity() {
        None
    } else {
        record
            .get("ancestors")
            .and_then(Value::as_array)
            .and_then(|a| a.last())
            .and_then(Value::as_object)
    };

    match outermost {
        Some(ancestor) => {
            let reference = ancestor.get("ref").cloned().unwrap_or(Value::Null);
            match ancestor.get("_resolved").and_then(Value::as_object) {
                Some(resolved) => {
                    let identifier = resolved.get("uri").cloned().unwrap_or(reference);
                    summary(identifier, resolved)
                }
                None => summary(reference, ancestor),
            }
        }
        None => summary(json!(record_identifier(record)), record),
    }
}

/// Attach group metadata under `group`
///
/// Must run before references are combined; creators are read from the
/// ancestors' inlined payloads.
pub fn add_group(record: &mut Record, kind: RecordKind) {
    let group = group_for(record, kind);
    record.insert("group".to_string(), group);
}
