//! Gleaner: incremental harvest-merge pipeline for archival records
//!
//! Keeps a downstream index in sync with an archival description system and
//! an arrangement-map service. Each harvest enumerates records changed since
//! the last successful run, enriches them with data from related records,
//! delivers the results downstream and propagates deletions.
//!
//! # Core Concepts
//!
//! - **Runs**: one harvest attempt per (source, kind, change-status), recorded
//!   in a [`RunLedger`] whose finished runs provide the watermark
//! - **Enrichment**: the [`Merger`] folds ancestors, inherited fields, extents
//!   and children into each record, reclassifying where needed
//! - **Deletions**: unpublished and deleted records are removed downstream by
//!   content-addressed identifier
//!
//! # Example
//!
//! ```
//! use gleaner::{MemoryLedger, RunLedger, ChangeStatus, RecordKind, Source};
//!
//! let ledger = MemoryLedger::new();
//! let since = ledger
//!     .last_finished_run_timestamp(Source::Catalog, RecordKind::Subject, ChangeStatus::Updated)
//!     .unwrap();
//! assert_eq!(since, 0);
//! ```

pub mod config;
pub mod deletion;
pub mod downstream;
pub mod harvest;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod notify;
pub mod resolver;
pub mod upstream;

pub use config::{ConfigError, GleanerConfig, HarvestSettings};
pub use deletion::{content_id, DeletionOutcome, DeletionPropagator, PropagationError, RunContext};
pub use downstream::{DownstreamConsumer, DownstreamError, HttpDownstream, RecordingConsumer};
pub use harvest::{HarvestContext, HarvestError, HarvestOrchestrator, HarvestReport, ItemOutcome, Tally};
pub use ledger::{LedgerError, LedgerResult, MemoryLedger, OpenLedger, RunFilter, RunLedger, SqliteLedger};
pub use merge::{MergeCause, MergeError, Merger};
pub use model::{
    CandidateStub, ChangeStatus, ChangedRecord, EnrichedRecord, Record, RecordKind, Run, RunError,
    RunId, RunStatus, Source,
};
pub use notify::{LogNotifier, Notifier, NotifyError, RecordingNotifier};
pub use resolver::{MockSecondary, Resolver, SecondaryClient};
pub use upstream::{ChangeEnumerator, FetchedBatch, MockUpstream, UpstreamClient, UpstreamError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
