//! Child listings from resource trees

use crate::model::Record;
use crate::upstream::Waypoint;
use serde_json::{json, Value};

/// Render dates as display text: the expression, else `begin-end`, else `begin`
pub fn date_string(dates: &[Value]) -> String {
    dates
        .iter()
        .filter_map(|date| {
            let text = |key: &str| {
                date.get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            };
            match (text("expression"), text("begin"), text("end")) {
                (Some(expression), _, _) => Some(expression.to_string()),
                (None, Some(begin), Some(end)) => Some(format!("{}-{}", begin, end)),
                (None, Some(begin), None) => Some(begin.to_string()),
                _ => None,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Child stub for a tree waypoint; untitled children are labelled by date
pub fn child_stub(waypoint: &Waypoint) -> Record {
    let title = match waypoint.title.as_deref() {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => date_string(&waypoint.dates),
    };
    let kind = if waypoint.child_count > 0 {
        "collection"
    } else {
        "object"
    };

    let mut stub = Record::new();
    stub.insert("title".to_string(), json!(title));
    stub.insert("ref".to_string(), json!(waypoint.uri));
    stub.insert("level".to_string(), json!(waypoint.level));
    stub.insert("order".to_string(), json!(waypoint.position));
    stub.insert("type".to_string(), json!(kind));
    stub
}
