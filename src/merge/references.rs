//! Compacting embedded references into stubs

use crate::model::Record;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy)]
enum ReferenceKind {
    Collection,
    Subject,
    Agent,
}

const REFERENCE_FIELDS: [(&str, ReferenceKind); 4] = [
    ("ancestors", ReferenceKind::Collection),
    ("children", ReferenceKind::Collection),
    ("subjects", ReferenceKind::Subject),
    ("linked_agents", ReferenceKind::Agent),
];

/// Replace inlined `_resolved` payloads with `type` and `title` on the stub
///
/// Subjects of a resolved payload are compacted recursively and kept on the
/// stub. Running this twice is a no-op the second time.
pub fn combine_references(record: &mut Record) {
    for (field, kind) in REFERENCE_FIELDS {
        if let Some(Value::Array(entries)) = record.get_mut(field) {
            for stub in entries.iter_mut().filter_map(Value::as_object_mut) {
                compact(stub, kind);
            }
        }
    }
}

fn compact(stub: &mut Record, kind: ReferenceKind) {
    let mut resolved = match stub.remove("_resolved") {
        Some(Value::Object(resolved)) => resolved,
        _ => return,
    };

    if let Some(reference_type) = reference_type(&resolved, kind) {
        stub.insert("type".to_string(), reference_type);
    }

    let title = resolved
        .get("title")
        .filter(|t| !t.is_null())
        .or_else(|| resolved.get("display_string"))
        .cloned();
    if let Some(title) = title {
        stub.insert("title".to_string(), title);
    }

    if let Some(Value::Array(mut subjects)) = resolved.remove("subjects") {
        for subject in subjects.iter_mut().filter_map(Value::as_object_mut) {
            compact(subject, ReferenceKind::Subject);
        }
        if !subjects.is_empty() {
            stub.insert("subjects".to_string(), Value::Array(subjects));
        }
    }
}

fn reference_type(resolved: &Record, kind: ReferenceKind) -> Option<Value> {
    match kind {
        ReferenceKind::Collection => Some(json!("collection")),
        ReferenceKind::Subject => resolved
            .get("terms")
            .and_then(|terms| terms.get(0))
            .and_then(|term| term.get("term_type"))
            .cloned(),
        ReferenceKind::Agent => resolved
            .get("agent_type")
            .or_else(|| resolved.get("jsonmodel_type"))
            .cloned(),
    }
}
