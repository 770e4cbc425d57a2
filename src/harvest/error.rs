//! Harvest errors

use crate::deletion::PropagationError;
use crate::ledger::LedgerError;
use crate::model::{RecordKind, Source};
use crate::resolver::ResolutionError;
use crate::upstream::UpstreamError;
use thiserror::Error;

/// Infrastructure-level failures that abort a harvest
///
/// Per-item failures never surface here; they are recorded as run errors.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("{system} does not harvest {kind} records")]
    UnsupportedKind { system: Source, kind: RecordKind },

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("secondary systems unavailable: {0}")]
    Secondary(#[source] ResolutionError),

    #[error("enumeration failed: {0}")]
    Enumeration(#[source] UpstreamError),

    #[error("deletion propagation failed: {0}")]
    Propagation(#[from] PropagationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
