//! Secondary data resolution
//!
//! Everything a record needs from systems other than the one it was
//! harvested from: arrangement ancestors, tree children, fields inherited
//! from catalog ancestors and, for arrangement components, the catalog
//! record they point at.

pub mod ancestry;
mod http;
mod mock;
mod supplement;
mod traits;
pub mod tree;

pub use http::HttpSecondary;
pub use mock::MockSecondary;
pub use supplement::{Resolver, Supplement, COMPONENT_RESOLVE};
pub use traits::{ArrangementEntry, ResolutionError, SecondaryClient};
