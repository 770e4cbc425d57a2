//! Run ledger backends
//!
//! The ledger records every harvest run and the errors raised while it was
//! in flight. `SqliteLedger` is the persistent implementation; `MemoryLedger`
//! keeps everything in process and is handy for tests and dry runs.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{LedgerError, LedgerResult, OpenLedger, RunFilter, RunLedger};
