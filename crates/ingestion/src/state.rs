//! Single-writer concurrency controller for the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Idle,
    Processing,
    Completed,
    CompletedWithErrors,
}

impl IngestionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Idle => "idle",
            IngestionStatus::Processing => "processing",
            IngestionStatus::Completed => "completed",
            IngestionStatus::CompletedWithErrors => "completed_with_errors",
        }
    }
}

/// Result counters recorded by the most recently finished ingestion run.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub documents_processed: usize,
    pub chunks_added: usize,
}

#[derive(Debug)]
struct Inner {
    is_running: bool,
    status: IngestionStatus,
    last_completed_at: Option<DateTime<Utc>>,
    last_result: RunResult,
    errors: Vec<String>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            is_running: false,
            status: IngestionStatus::Idle,
            last_completed_at: None,
            last_result: RunResult::default(),
            errors: Vec::new(),
        }
    }
}

/// Process-wide record of ingestion state, mutated only under exclusive access.
///
/// Invariant: `is_running == true` iff `status == Processing`.
pub struct IngestionStateService {
    inner: Mutex<Inner>,
}

impl Default for IngestionStateService {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub is_processing: bool,
    pub status: String,
    pub last_completed: Option<String>,
    pub documents_processed: Option<usize>,
    pub chunks_added: Option<usize>,
    pub errors: Vec<String>,
}

impl IngestionStateService {
    /// Atomically start a run. Returns `true` if this call acquired the lock.
    pub fn start_ingestion(&self) -> bool {
        let mut inner = self.inner.lock().expect("ingestion state lock poisoned");
        if inner.is_running {
            return false;
        }
        inner.is_running = true;
        inner.status = IngestionStatus::Processing;
        inner.errors.clear();
        true
    }

    pub fn stop_ingestion(&self, result: RunResult, errors: Vec<String>) {
        let mut inner = self.inner.lock().expect("ingestion state lock poisoned");
        inner.is_running = false;
        inner.last_completed_at = Some(Utc::now());
        inner.status = if errors.is_empty() {
            IngestionStatus::Completed
        } else {
            IngestionStatus::CompletedWithErrors
        };
        inner.last_result = result;
        inner.errors = errors;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("ingestion state lock poisoned").is_running
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("ingestion state lock poisoned");
        let has_result = inner.last_completed_at.is_some();
        StatusSnapshot {
            is_processing: inner.is_running,
            status: inner.status.as_str().to_string(),
            last_completed: inner.last_completed_at.map(|t| t.to_rfc3339()),
            documents_processed: has_result.then_some(inner.last_result.documents_processed),
            chunks_added: has_result.then_some(inner.last_result.chunks_added),
            errors: inner.errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_start_again_fails() {
        let svc = IngestionStateService::default();
        assert!(svc.start_ingestion());
        assert!(!svc.start_ingestion());
        assert!(svc.is_running());
    }

    #[test]
    fn stop_clears_running_and_sets_status() {
        let svc = IngestionStateService::default();
        svc.start_ingestion();
        svc.stop_ingestion(
            RunResult {
                documents_processed: 2,
                chunks_added: 10,
            },
            Vec::new(),
        );
        let snap = svc.snapshot();
        assert!(!snap.is_processing);
        assert_eq!(snap.status, "completed");
        assert_eq!(snap.documents_processed, Some(2));
        assert_eq!(snap.chunks_added, Some(10));
    }

    #[test]
    fn stop_with_errors_sets_completed_with_errors() {
        let svc = IngestionStateService::default();
        svc.start_ingestion();
        svc.stop_ingestion(RunResult::default(), vec!["boom".to_string()]);
        let snap = svc.snapshot();
        assert_eq!(snap.status, "completed_with_errors");
        assert_eq!(snap.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn can_restart_after_completion() {
        let svc = IngestionStateService::default();
        svc.start_ingestion();
        svc.stop_ingestion(RunResult::default(), Vec::new());
        assert!(svc.start_ingestion());
    }

    #[test]
    fn initial_state_is_idle() {
        let svc = IngestionStateService::default();
        let snap = svc.snapshot();
        assert!(!snap.is_processing);
        assert_eq!(snap.status, "idle");
        assert_eq!(snap.documents_processed, None);
    }
}
