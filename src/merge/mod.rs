//! Record merging
//!
//! Combines a changed record with the supplement gathered by the resolver,
//! reclassifies it where its structure demands, and compacts embedded
//! references into stubs.

mod error;
pub mod extent;
pub mod group;
mod merger;
pub mod references;

pub use error::{MergeCause, MergeError};
pub use extent::{extent_span, indicator_to_integer, parse_instances};
pub use group::add_group;
pub use merger::Merger;
pub use references::combine_references;
