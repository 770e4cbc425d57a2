//! Per-item outcomes

use crate::model::Run;

/// What happened to one changed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Enriched and delivered downstream
    Enriched(String),
    /// Not publishable; to be deleted downstream instead
    ToDelete(String),
    /// Merge or delivery failed
    Failed { id: String, reason: String },
}

impl ItemOutcome {
    pub fn identifier(&self) -> &str {
        match self {
            ItemOutcome::Enriched(id) | ItemOutcome::ToDelete(id) => id,
            ItemOutcome::Failed { id, .. } => id,
        }
    }

    /// Run error message for a failed item
    pub fn error_message(&self) -> Option<String> {
        match self {
            ItemOutcome::Failed { id, reason } => Some(format!("{}: {}", id, reason)),
            _ => None,
        }
    }
}

/// Counts gathered while joining item tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub enriched: usize,
    pub routed_to_delete: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl Tally {
    /// Items that completed successfully
    pub fn processed(&self) -> usize {
        self.enriched + self.deleted
    }
}

/// A closed run and what it achieved
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub run: Run,
    pub tally: Tally,
}

impl HarvestReport {
    pub fn processed(&self) -> usize {
        self.tally.processed()
    }
}
