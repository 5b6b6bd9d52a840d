//! In-memory collaborators for tests
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for dependents that need to run the agent without a host or a network.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use hl_protocol::{BasicInfo, Report, TaskResult};

use crate::error::UplinkError;
use crate::traits::{TelemetryProvider, Uplink};

/// Provider returning the same snapshot every time
#[derive(Debug, Clone, Default)]
pub struct FixedTelemetry {
    report: Report,
}

impl FixedTelemetry {
    /// Create a provider that always reports `report`
    pub fn new(report: Report) -> Self {
        Self { report }
    }
}

impl TelemetryProvider for FixedTelemetry {
    fn snapshot(&self) -> Report {
        self.report.clone()
    }
}

/// Uplink that keeps everything it is given.
///
/// The first `failures` posts of any kind are rejected with a 503.
#[derive(Debug, Default)]
pub struct RecordingUplink {
    reports: Mutex<Vec<Report>>,
    task_results: Mutex<Vec<TaskResult>>,
    basic_infos: Mutex<Vec<BasicInfo>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl RecordingUplink {
    /// Create an uplink that accepts every post
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an uplink that rejects the first `failures` posts
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    /// Accepted fallback reports
    pub fn reports(&self) -> Vec<Report> {
        snapshot(&self.reports)
    }

    /// Accepted task results
    pub fn task_results(&self) -> Vec<TaskResult> {
        snapshot(&self.task_results)
    }

    /// Accepted basic info uploads
    pub fn basic_infos(&self) -> Vec<BasicInfo> {
        snapshot(&self.basic_infos)
    }

    /// Posts attempted so far, rejected ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record<T: Clone>(&self, list: &Mutex<Vec<T>>, item: &T) -> Result<(), UplinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(UplinkError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }

        list.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(item.clone());
        Ok(())
    }
}

fn snapshot<T: Clone>(list: &Mutex<Vec<T>>) -> Vec<T> {
    list.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

#[async_trait]
impl Uplink for RecordingUplink {
    async fn post_report(&self, report: &Report) -> Result<(), UplinkError> {
        self.record(&self.reports, report)
    }

    async fn post_task_result(&self, result: &TaskResult) -> Result<(), UplinkError> {
        self.record(&self.task_results, result)
    }

    async fn post_basic_info(&self, info: &BasicInfo) -> Result<(), UplinkError> {
        self.record(&self.basic_infos, info)
    }
}
