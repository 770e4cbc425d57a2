//! Enrich-and-classify for one record

use super::error::{MergeCause, MergeError};
use super::extent::parse_instances;
use super::group::add_group;
use super::references::combine_references;
use crate::model::{is_empty_value, record_identifier, EnrichedRecord, Record, RecordKind};
use crate::resolver::{Resolver, Supplement};
use serde_json::{json, Value};

/// Merges a changed record with its supplementary data
///
/// Kind rules:
/// - archival objects gain arrangement ancestors and inherit dates, language
///   and (for collections) extents and creators from their ancestors
/// - resources take their ancestors and position from the arrangement
/// - arrangement components become the catalog resource they point at
/// - subjects and agents pass through
///
/// Every kind then gets group metadata and compacted references.
#[derive(Clone)]
pub struct Merger {
    resolver: Resolver,
}

impl Merger {
    pub fn new(resolver: Resolver) -> Self {
        Self { resolver }
    }

    /// Merge one record harvested as `kind`
    ///
    /// Returns the enriched record and the kind it should be stored as.
    pub async fn merge(
        &self,
        kind: RecordKind,
        record: Record,
    ) -> Result<(EnrichedRecord, RecordKind), MergeError> {
        let Some(identifier) = record_identifier(&record).map(str::to_string) else {
            return Err(MergeError::new("<unknown>", MergeCause::MissingIdentifier));
        };

        match self.enrich(kind, record).await {
            Ok((payload, target)) => Ok((EnrichedRecord::new(identifier, target, payload), target)),
            Err(cause) => Err(MergeError::new(identifier, cause)),
        }
    }

    /// The kind a record is stored as, after reclassification
    pub async fn target_kind(&self, kind: RecordKind, record: &Record) -> Result<RecordKind, MergeCause> {
        match kind {
            RecordKind::ArrangementMapComponent => Ok(RecordKind::Resource),
            RecordKind::ArchivalObject => {
                let children = self.resolver.child_count(record).await?;
                Ok(match kind.collection_variant() {
                    Some(collection) if children > 0 => collection,
                    _ => kind,
                })
            }
            other => Ok(other),
        }
    }

    async fn enrich(&self, kind: RecordKind, record: Record) -> Result<(Record, RecordKind), MergeCause> {
        let target = self.target_kind(kind, &record).await?;

        let mut payload = match kind {
            RecordKind::ArrangementMapComponent => {
                let supplement = self.resolver.resolve(&record, kind).await?;
                combine_component(supplement)?
            }
            _ => {
                let supplement = self.resolver.resolve(&record, target).await?;
                combine(record, target, supplement)?
            }
        };

        add_group(&mut payload, target);
        combine_references(&mut payload);
        Ok((payload, target))
    }
}

/// Append list values, overwrite anything else
fn merge_field(record: &mut Record, key: &str, value: Value) {
    match value {
        Value::Array(mut extra) => match record.get_mut(key) {
            Some(Value::Array(existing)) => existing.append(&mut extra),
            _ => {
                record.insert(key.to_string(), Value::Array(extra));
            }
        },
        value => {
            record.insert(key.to_string(), value);
        }
    }
}

fn combine(mut record: Record, target: RecordKind, supplement: Supplement) -> Result<Record, MergeCause> {
    match target {
        RecordKind::ArchivalObject | RecordKind::ArchivalObjectCollection => {
            let collection = target == RecordKind::ArchivalObjectCollection;

            let extents = if !is_empty_value(record.get("extents")) {
                None
            } else {
                let instances = record
                    .get("instances")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let parsed = parse_instances(instances)?;
                match supplement.inherited.get("extents") {
                    Some(inherited) if parsed.is_empty() && collection => Some(inherited.clone()),
                    _ => Some(Value::Array(parsed)),
                }
            };

            merge_field(&mut record, "ancestors", Value::Array(supplement.ancestors));
            for (key, value) in supplement.inherited {
                if key != "extents" {
                    merge_field(&mut record, &key, value);
                }
            }
            if let Some(extents) = extents {
                record.insert("extents".to_string(), extents);
            }
            if collection {
                merge_field(&mut record, "linked_agents", Value::Array(supplement.creators));
                record.insert("children".to_string(), Value::Array(supplement.children));
            }
        }
        RecordKind::Resource => {
            record.insert("ancestors".to_string(), Value::Array(supplement.ancestors));
            record.insert("position".to_string(), json!(supplement.position.unwrap_or(0)));
            record.insert("children".to_string(), Value::Array(supplement.children));
        }
        RecordKind::Subject
        | RecordKind::AgentPerson
        | RecordKind::AgentCorporateEntity
        | RecordKind::AgentFamily
        | RecordKind::ArrangementMapComponent => {}
    }
    Ok(record)
}

fn combine_component(supplement: Supplement) -> Result<Record, MergeCause> {
    let position = supplement
        .position
        .ok_or_else(|| MergeCause::Invalid("arrangement component has no order".to_string()))?;
    let mut resource = supplement
        .base
        .ok_or_else(|| MergeCause::Invalid("arrangement component has no catalog record".to_string()))?;

    resource.insert("ancestors".to_string(), Value::Array(supplement.ancestors));
    resource.insert("position".to_string(), json!(position));
    Ok(resource)
}
