//! Reachability probes
//!
//! A probe measures one latency sample to a target and reports it over the
//! report transport. Name resolution always happens before timing starts,
//! so the reported value never includes DNS time. Any failure reports 0.

mod http;
mod icmp;
mod resolver;
mod tcp;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use hl_protocol::{ProbeKind, ProbeResult};

use crate::state::AgentState;
use crate::transport::SafeConn;

pub use http::normalize_target;
pub use resolver::{resolve_host, Resolver, SystemResolver};
pub use tcp::split_target;

/// Reasons a probe produced no sample
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid target '{0}'")]
    InvalidTarget(String),

    #[error("resolution failed: {0}")]
    Resolve(std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("icmp: {0}")]
    Icmp(String),

    #[error("http: {0}")]
    Http(String),

    #[error("http status {0}")]
    Status(u16),
}

/// One probe to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub task_id: u64,
    pub kind: ProbeKind,
    pub target: String,
    pub timeout: Duration,
}

/// Run the probe and return the latency in milliseconds, or 0 on failure
pub async fn measure(request: &ProbeRequest, resolver: &dyn Resolver) -> u64 {
    let outcome = match request.kind {
        ProbeKind::Icmp => icmp::probe(&request.target, request.timeout, resolver).await,
        ProbeKind::Tcp => tcp::probe(&request.target, request.timeout, resolver).await,
        ProbeKind::Http => http::probe(&request.target, request.timeout, resolver).await,
    };

    match outcome {
        Ok(rtt) => rtt.as_millis() as u64,
        Err(e) => {
            tracing::debug!(
                "{} probe {} to {} failed: {}",
                request.kind,
                request.task_id,
                request.target,
                e
            );
            0
        }
    }
}

/// Handle one inbound ping request, replying over `conn`
pub async fn run_probe(
    state: Arc<AgentState>,
    conn: Arc<SafeConn>,
    task_id: u64,
    kind: ProbeKind,
    target: String,
) {
    let request = ProbeRequest {
        task_id,
        kind,
        target,
        timeout: state.config.probe_timeout,
    };
    let value = measure(&request, state.resolver.as_ref()).await;

    let result = ProbeResult {
        task_id,
        ping_type: kind,
        value,
        finished_at: Utc::now(),
    };
    tracing::debug!("Probe {} ({} {}): {} ms", task_id, kind, request.target, value);

    if let Err(e) = conn.send_json(&result, state.config.write_timeout).await {
        tracing::warn!("Failed to send probe result {}: {}", task_id, e);
    }
}
