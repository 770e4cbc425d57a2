//! Enumerations naming upstream systems, record kinds and lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a string does not name a known enumeration value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {what}: {value}")]
pub struct ParseKindError {
    pub what: &'static str,
    pub value: String,
}

impl ParseKindError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// An upstream system records are harvested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The archival description system (resources, archival objects, agents, subjects)
    Catalog,
    /// The arrangement-map service that places catalog records into hierarchies
    Arrangement,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog",
            Source::Arrangement => "arrangement",
        }
    }

    /// Record kinds that can be harvested from this source
    pub fn harvestable_kinds(&self) -> &'static [RecordKind] {
        match self {
            Source::Catalog => &[
                RecordKind::Resource,
                RecordKind::ArchivalObject,
                RecordKind::Subject,
                RecordKind::AgentPerson,
                RecordKind::AgentCorporateEntity,
                RecordKind::AgentFamily,
            ],
            Source::Arrangement => &[RecordKind::ArrangementMapComponent],
        }
    }

    pub fn supports(&self, kind: RecordKind) -> bool {
        self.harvestable_kinds().contains(&kind)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog" => Ok(Source::Catalog),
            "arrangement" => Ok(Source::Arrangement),
            other => Err(ParseKindError::new("source", other)),
        }
    }
}

/// The logical kind of a record
///
/// Wire names match the `jsonmodel_type` values used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Resource,
    ArchivalObject,
    /// Archival object with children; only ever produced by reclassification
    ArchivalObjectCollection,
    Subject,
    AgentPerson,
    AgentCorporateEntity,
    AgentFamily,
    ArrangementMapComponent,
}

impl RecordKind {
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Resource,
        RecordKind::ArchivalObject,
        RecordKind::ArchivalObjectCollection,
        RecordKind::Subject,
        RecordKind::AgentPerson,
        RecordKind::AgentCorporateEntity,
        RecordKind::AgentFamily,
        RecordKind::ArrangementMapComponent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Resource => "resource",
            RecordKind::ArchivalObject => "archival_object",
            RecordKind::ArchivalObjectCollection => "archival_object_collection",
            RecordKind::Subject => "subject",
            RecordKind::AgentPerson => "agent_person",
            RecordKind::AgentCorporateEntity => "agent_corporate_entity",
            RecordKind::AgentFamily => "agent_family",
            RecordKind::ArrangementMapComponent => "arrangement_map_component",
        }
    }

    /// Entities stand alone; they are never contained by another record
    pub fn is_entity(&self) -> bool {
        matches!(
            self,
            RecordKind::Subject
                | RecordKind::AgentPerson
                | RecordKind::AgentCorporateEntity
                | RecordKind::AgentFamily
        )
    }

    /// The kind a record is reclassified to when it turns out to have children
    pub fn collection_variant(&self) -> Option<RecordKind> {
        match self {
            RecordKind::ArchivalObject => Some(RecordKind::ArchivalObjectCollection),
            _ => None,
        }
    }

    /// Path segment that identifies URIs of this kind (e.g. `/subjects/12`)
    pub fn uri_segment(&self) -> &'static str {
        match self {
            RecordKind::Resource => "/resources/",
            RecordKind::ArchivalObject | RecordKind::ArchivalObjectCollection => {
                "/archival_objects/"
            }
            RecordKind::Subject => "/subjects/",
            RecordKind::AgentPerson => "/agents/people/",
            RecordKind::AgentCorporateEntity => "/agents/corporate_entities/",
            RecordKind::AgentFamily => "/agents/families/",
            RecordKind::ArrangementMapComponent => "/components/",
        }
    }

    /// Embedded references the upstream should inline when fetching records of this kind
    pub fn resolve_directive(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Resource => &["ancestors", "subjects", "linked_agents"],
            RecordKind::ArchivalObject | RecordKind::ArchivalObjectCollection => &[
                "ancestors",
                "ancestors::linked_agents",
                "subjects",
                "linked_agents",
                "top_container",
            ],
            RecordKind::Subject => &[],
            RecordKind::AgentPerson | RecordKind::AgentCorporateEntity | RecordKind::AgentFamily => {
                &["related_agents"]
            }
            RecordKind::ArrangementMapComponent => &[],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseKindError::new("record kind", s))
    }
}

/// Whether a harvest looks for updated or deleted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Updated,
    Deleted,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Updated => "updated",
            ChangeStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeStatus {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "updated" => Ok(ChangeStatus::Updated),
            "deleted" => Ok(ChangeStatus::Deleted),
            other => Err(ParseKindError::new("change status", other)),
        }
    }
}

/// Lifecycle status of a run
///
/// Transitions only go `Started -> Finished` or `Started -> Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Finished,
    Errored,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Finished => "finished",
            RunStatus::Errored => "errored",
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RunStatus::Started),
            "finished" => Ok(RunStatus::Finished),
            "errored" => Ok(RunStatus::Errored),
            other => Err(ParseKindError::new("run status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_round_trips_through_wire_name() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("folder".parse::<RecordKind>().is_err());
    }

    #[test]
    fn only_archival_objects_have_a_collection_variant() {
        assert_eq!(
            RecordKind::ArchivalObject.collection_variant(),
            Some(RecordKind::ArchivalObjectCollection)
        );
        assert_eq!(RecordKind::Resource.collection_variant(), None);
        assert_eq!(RecordKind::AgentPerson.collection_variant(), None);
    }

    #[test]
    fn sources_restrict_harvestable_kinds() {
        assert!(Source::Catalog.supports(RecordKind::Subject));
        assert!(!Source::Catalog.supports(RecordKind::ArchivalObjectCollection));
        assert!(!Source::Catalog.supports(RecordKind::ArrangementMapComponent));
        assert!(Source::Arrangement.supports(RecordKind::ArrangementMapComponent));
        assert!(!Source::Arrangement.supports(RecordKind::Resource));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&RecordKind::AgentCorporateEntity).unwrap();
        assert_eq!(json, "\"agent_corporate_entity\"");
        let status: ChangeStatus = serde_json::from_str("\"deleted\"").unwrap();
        assert_eq!(status, ChangeStatus::Deleted);
    }

    #[test]
    fn only_started_runs_are_open() {
        assert!(!RunStatus::Started.is_closed());
        assert!(RunStatus::Finished.is_closed());
        assert!(RunStatus::Errored.is_closed());
    }
}
