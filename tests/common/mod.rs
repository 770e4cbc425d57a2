//! Common test utilities for gleaner integration tests
//!
//! Record fixtures shaped like upstream payloads, and a pipeline builder that
//! wires mock clients into a `HarvestOrchestrator`.

#![allow(dead_code)]

pub mod fixtures;
pub mod pipeline;

pub use fixtures::{archival_object, component, record, resource, subject, unpublished};
pub use pipeline::{GaugedConsumer, Pipeline};
