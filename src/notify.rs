//! Error notification sink

use crate::model::{Run, RunError};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Told about runs that finished with errors
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn run_errors(&self, run: &Run, errors: &[RunError]) -> Result<(), NotifyError>;
}

/// Reports run errors through `tracing`
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn run_errors(&self, run: &Run, errors: &[RunError]) -> Result<(), NotifyError> {
        tracing::warn!(
            run_id = %run.id,
            source = %run.source,
            kind = %run.kind,
            change_status = %run.change_status,
            errors = errors.len(),
            "run finished with errors"
        );
        for error in errors {
            tracing::warn!(run_id = %run.id, at = %error.created_at, "{}", error.message);
        }
        Ok(())
    }
}

/// Notifier that remembers what it was told (testing)
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(Run, Vec<RunError>)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call fails after being recorded
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(Run, Vec<RunError>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn run_errors(&self, run: &Run, errors: &[RunError]) -> Result<(), NotifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((run.clone(), errors.to_vec()));
        if self.fail {
            return Err(NotifyError("mock notifier configured to fail".to_string()));
        }
        Ok(())
    }
}
