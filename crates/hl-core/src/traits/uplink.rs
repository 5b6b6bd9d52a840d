//! One-shot HTTP deliveries to the control plane

use async_trait::async_trait;

use hl_protocol::{BasicInfo, Report, TaskResult};

use crate::error::UplinkError;

/// Request/response channel used alongside the persistent transport.
///
/// Each call is a single attempt; retry policy belongs to the caller.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Deliver a telemetry report while the transport is unavailable
    async fn post_report(&self, report: &Report) -> Result<(), UplinkError>;

    /// Deliver the outcome of a remote execution task
    async fn post_task_result(&self, result: &TaskResult) -> Result<(), UplinkError>;

    /// Deliver the static host description
    async fn post_basic_info(&self, info: &BasicInfo) -> Result<(), UplinkError>;
}
