//! Gathering supplementary data for one record

use super::ancestry::{arrangement_stub, closest_creators, closest_value};
use super::traits::{ResolutionError, SecondaryClient};
use crate::model::{is_empty_value, record_identifier, Record, RecordKind};
use serde_json::Value;
use std::sync::Arc;

/// References resolved when fetching the catalog resource behind a component
pub const COMPONENT_RESOLVE: &[&str] = &["subjects", "linked_agents"];

/// Supplementary data for one record, ready to be merged into it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Supplement {
    /// Arrangement ancestors as reference stubs, nearest first
    pub ancestors: Vec<Value>,
    /// Position among siblings in the arrangement
    pub position: Option<i64>,
    /// Creators inherited from the nearest ancestor that has any
    pub creators: Vec<Value>,
    /// Direct children as reference stubs
    pub children: Vec<Value>,
    /// Field values inherited from ancestors, keyed by field name
    pub inherited: Record,
    /// The catalog record an arrangement component points at
    pub base: Option<Record>,
}

/// Resolves supplements through a `SecondaryClient`
#[derive(Clone)]
pub struct Resolver {
    client: Arc<dyn SecondaryClient>,
    max_depth: usize,
}

fn identifier(record: &Record) -> String {
    record_identifier(record).unwrap_or("<unknown>").to_string()
}

fn required_str<'a>(record: &'a Record, field: &'static str) -> Result<&'a str, ResolutionError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ResolutionError::MissingField {
            identifier: identifier(record),
            field,
        })
}

/// The uri of the resource that owns an archival object
fn resource_ref(record: &Record) -> Result<&str, ResolutionError> {
    record
        .get("resource")
        .and_then(|r| r.get("ref"))
        .and_then(Value::as_str)
        .ok_or_else(|| ResolutionError::MissingField {
            identifier: identifier(record),
            field: "resource",
        })
}

impl Resolver {
    pub fn new(client: Arc<dyn SecondaryClient>, max_depth: usize) -> Self {
        Self { client, max_depth }
    }

    pub fn client(&self) -> &Arc<dyn SecondaryClient> {
        &self.client
    }

    /// Direct child count of an archival object within its resource tree
    pub async fn child_count(&self, record: &Record) -> Result<u64, ResolutionError> {
        let uri = required_str(record, "uri")?;
        self.client.child_count(uri, resource_ref(record)?).await
    }

    /// Supplement for a record that is to be stored as `kind`
    pub async fn resolve(&self, record: &Record, kind: RecordKind) -> Result<Supplement, ResolutionError> {
        match kind {
            RecordKind::ArchivalObject => self.archival_object(record, false).await,
            RecordKind::ArchivalObjectCollection => self.archival_object(record, true).await,
            RecordKind::Resource => self.resource(record).await,
            RecordKind::ArrangementMapComponent => self.component(record).await,
            RecordKind::Subject
            | RecordKind::AgentPerson
            | RecordKind::AgentCorporateEntity
            | RecordKind::AgentFamily => Ok(Supplement::default()),
        }
    }

    async fn archival_object(&self, record: &Record, collection: bool) -> Result<Supplement, ResolutionError> {
        let resource = resource_ref(record)?;
        let mut supplement = Supplement::default();

        if let Some(entry) = self.client.find_ancestors(resource).await? {
            supplement.ancestors = entry
                .ancestors
                .iter()
                .map(|a| Value::Object(arrangement_stub(a)))
                .collect();
        }

        if is_empty_value(record.get("dates")) {
            self.inherit(record, "dates", &mut supplement)?;
        }

        match record.get("lang_materials") {
            Some(own) if is_empty_value(Some(own)) => {
                self.inherit(record, "lang_materials", &mut supplement)?
            }
            Some(_) => {}
            None => self.inherit(record, "language", &mut supplement)?,
        }

        if collection {
            if is_empty_value(record.get("extents")) {
                self.inherit(record, "extents", &mut supplement)?;
            }
            supplement.creators = closest_creators(record, self.max_depth)?;
            let uri = required_str(record, "uri")?;
            supplement.children = self
                .client
                .children(uri, resource)
                .await?
                .into_iter()
                .map(Value::Object)
                .collect();
        }

        Ok(supplement)
    }

    async fn resource(&self, record: &Record) -> Result<Supplement, ResolutionError> {
        let uri = required_str(record, "uri")?;
        let mut supplement = Supplement::default();

        if let Some(entry) = self.client.find_ancestors(uri).await? {
            supplement.position = entry.order;
            supplement.ancestors = entry
                .ancestors
                .iter()
                .map(|a| Value::Object(arrangement_stub(a)))
                .collect();
        }

        supplement.children = self
            .client
            .children(uri, uri)
            .await?
            .into_iter()
            .map(Value::Object)
            .collect();

        Ok(supplement)
    }

    async fn component(&self, record: &Record) -> Result<Supplement, ResolutionError> {
        let target = required_str(record, "archivesspace_uri")?;
        let base = self.client.fetch(target, COMPONENT_RESOLVE).await?;

        let ancestors = record
            .get("ancestors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .map(|a| Value::Object(arrangement_stub(a)))
            .collect();

        Ok(Supplement {
            ancestors,
            position: record.get("order").and_then(Value::as_i64),
            base: Some(base),
            ..Supplement::default()
        })
    }

    fn inherit(&self, record: &Record, field: &str, supplement: &mut Supplement) -> Result<(), ResolutionError> {
        if let Some(value) = closest_value(record, field, self.max_depth)? {
            supplement.inherited.insert(field.to_string(), value.clone());
        }
        Ok(())
    }
}
