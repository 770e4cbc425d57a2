//! Upstream systems and change enumeration
//!
//! `UpstreamClient` abstracts a paginated record system. `ChangeEnumerator`
//! turns its pages into lazy streams of changed or deleted identifiers.

mod arrangement;
mod catalog;
mod enumerator;
pub(crate) mod http;
mod mock;
mod traits;

pub use arrangement::ArrangementClient;
pub use catalog::{CatalogClient, TreeNode, Waypoint};
pub use enumerator::ChangeEnumerator;
pub use mock::MockUpstream;
pub use traits::{FetchedBatch, Page, UpstreamClient, UpstreamError};
