//! Merge errors

use crate::resolver::ResolutionError;
use thiserror::Error;

/// What went wrong while merging a record
#[derive(Debug, Error)]
pub enum MergeCause {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("invalid container indicator '{0}'")]
    InvalidIndicator(String),

    #[error("record has neither uri nor ref")]
    MissingIdentifier,

    #[error("{0}")]
    Invalid(String),
}

/// A failed merge, tagged with the record's primary reference
#[derive(Debug, Error)]
#[error("Error merging {identifier}: {cause}")]
pub struct MergeError {
    pub identifier: String,
    #[source]
    pub cause: MergeCause,
}

impl MergeError {
    pub fn new(identifier: impl Into<String>, cause: impl Into<MergeCause>) -> Self {
        Self {
            identifier: identifier.into(),
            cause: cause.into(),
        }
    }
}
