//! Upstream-shaped record fixtures

use gleaner::Record;
use serde_json::{json, Value};

pub const RESOURCE_URI: &str = "/repositories/2/resources/1";

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

pub fn subject(n: usize) -> Record {
    record(json!({
        "uri": format!("/subjects/{}", n),
        "jsonmodel_type": "subject",
        "title": format!("Subject {}", n),
        "terms": [{"term": format!("Subject {}", n), "term_type": "topical"}]
    }))
}

/// Mark a fixture as not publishable
pub fn unpublished(mut rec: Record) -> Record {
    rec.insert("publish".to_string(), json!(false));
    rec
}

pub fn resource() -> Record {
    record(json!({
        "uri": RESOURCE_URI,
        "jsonmodel_type": "resource",
        "title": "Family papers",
        "dates": [{"expression": "1900-1950"}],
        "language": "eng",
        "extents": [{"number": "4", "extent_type": "linear feet"}],
        "linked_agents": [],
        "subjects": []
    }))
}

/// An archival object of the fixture resource, with one boxed instance
pub fn archival_object(n: usize) -> Record {
    record(json!({
        "uri": format!("/repositories/2/archival_objects/{}", n),
        "jsonmodel_type": "archival_object",
        "title": format!("Folder {}", n),
        "resource": {"ref": RESOURCE_URI},
        "dates": [],
        "linked_agents": [],
        "subjects": [
            {"ref": "/subjects/1", "_resolved": {"title": "Rivers", "terms": [{"term_type": "geographic"}]}}
        ],
        "instances": [
            {"instance_type": "mixed_materials",
             "sub_container": {"top_container": {"_resolved": {"type": "box"}}}}
        ],
        "ancestors": [
            {"ref": RESOURCE_URI, "level": "collection", "_resolved": {
                "uri": RESOURCE_URI,
                "title": "Family papers",
                "dates": [{"expression": "1900-1950"}],
                "language": "eng",
                "extents": [{"number": "4", "extent_type": "linear feet"}],
                "linked_agents": [
                    {"ref": "/agents/people/1", "role": "creator",
                     "_resolved": {"title": "Doe, Jane", "agent_type": "agent_person"}}
                ]
            }}
        ]
    }))
}

/// An arrangement-map component pointing at the fixture resource
pub fn component(n: usize, order: i64) -> Record {
    record(json!({
        "ref": format!("/api/components/{}/", n),
        "archivesspace_uri": RESOURCE_URI,
        "order": order,
        "ancestors": [{"ref": "/api/components/1/", "title": "Collections"}]
    }))
}
