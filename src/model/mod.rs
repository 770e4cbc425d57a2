//! Core data types shared by every stage of the pipeline

mod kinds;
mod record;
mod run;

pub use kinds::{ChangeStatus, ParseKindError, RecordKind, RunStatus, Source};
pub use record::{
    is_empty_value, record_identifier, CandidateStub, ChangedRecord, EnrichedRecord, Record,
};
pub use run::{Run, RunError, RunId};
