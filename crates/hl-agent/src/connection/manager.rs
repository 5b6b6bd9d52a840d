//! Report transport lifecycle
//!
//! The `ConnectionManager` owns the report transport. On every timer tick it
//! makes sure a transport exists (dialing with a fixed retry budget when it
//! does not), takes one telemetry snapshot and delivers it: over the
//! transport when connected, or as a one-shot HTTP post when reconnection
//! has been exhausted and the manager is degraded.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use hl_core::config::ReconnectPolicy;
use hl_core::error::ConnectionError;
use hl_core::ConnectionState;
use hl_protocol::Report;

use super::retry::RetryBudget;
use crate::dispatch::{run_receive_loop, Dispatcher};
use crate::state::AgentState;
use crate::transport::{redact, SafeConn};

/// An open report transport and its receive loop
struct ActiveTransport {
    conn: Arc<SafeConn>,
    /// Cancelled by the receive loop when the read side fails or closes
    lost: CancellationToken,
    reader: JoinHandle<()>,
}

/// Drives the report transport state machine
pub struct ConnectionManager {
    state: Arc<AgentState>,
    policy: ReconnectPolicy,
    status: watch::Sender<ConnectionState>,
    active: Option<ActiveTransport>,
    /// When the last handshake was tried while degraded
    last_degraded_attempt: Option<Instant>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state
    pub fn new(state: Arc<AgentState>) -> Self {
        let policy = state.config.reconnect_policy();
        let (status, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            state,
            policy,
            status,
            active: None,
            last_degraded_attempt: None,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Report on a fixed timer until `shutdown` is cancelled.
    ///
    /// Also keeps the host basic info fresh. On exit the transport is
    /// closed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let period = self.policy.tick_period();
        tracing::info!(
            "Reporting every {:?} to {}",
            period,
            redact(&self.state.endpoints.report_ws())
        );

        let refresher = tokio::spawn(run_basic_info_refresher(
            Arc::clone(&self.state),
            shutdown.child_token(),
        ));

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        tracing::info!("Report loop stopping");
        self.disconnect().await;
        refresher.abort();
    }

    /// One timer tick: ensure a transport, then make one report attempt
    pub async fn tick(&mut self) {
        self.reap_lost_transport().await;

        if self.active.is_none() {
            if self.state() == ConnectionState::Degraded {
                self.retry_while_degraded().await;
            } else {
                self.connect().await;
            }
        }

        let report = self.snapshot().await;

        if let Some(active) = &self.active {
            let sent = active
                .conn
                .send_json(&report, self.state.config.write_timeout)
                .await;

            if let Err(e) = sent {
                tracing::warn!("Report write failed: {}", e);
                self.disconnect().await;
            }
        } else if let Err(e) = self.state.uplink.post_report(&report).await {
            tracing::warn!("Fallback report failed: {}", e);
        }
    }

    /// Run one connecting cycle, ending `Connected` or `Degraded`
    async fn connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let mut budget = RetryBudget::from_policy(&self.policy);

        loop {
            match self.dial().await {
                Ok(()) => return,
                Err(e) => match budget.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            "Connection failed: {}. Retrying in {:?} ({} retries left)",
                            e,
                            delay,
                            budget.remaining()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            "Connection failed after {} attempt(s): {}. Falling back to HTTP reports",
                            self.policy.max_attempts(),
                            e
                        );
                        self.last_degraded_attempt = Some(Instant::now());
                        self.set_state(ConnectionState::Degraded);
                        return;
                    }
                },
            }
        }
    }

    /// While degraded, try a single handshake once per reconnect interval
    async fn retry_while_degraded(&mut self) {
        let interval = self.state.config.degraded_reconnect_interval;
        let due = self
            .last_degraded_attempt
            .map_or(true, |last| last.elapsed() >= interval);
        if !due {
            return;
        }

        self.last_degraded_attempt = Some(Instant::now());
        tracing::debug!("Degraded, trying the report transport again");
        if let Err(e) = self.dial().await {
            tracing::debug!("Still degraded: {}", e);
        }
    }

    /// One handshake. On success the transport becomes active.
    async fn dial(&mut self) -> Result<(), ConnectionError> {
        let url = self.state.endpoints.report_ws();
        let (conn, stream) = self.state.dialer.dial(&url).await?;
        let conn = Arc::new(conn);

        let lost = CancellationToken::new();
        let dispatcher = Dispatcher::new(Arc::clone(&self.state), Arc::clone(&conn));
        let reader = tokio::spawn(run_receive_loop(stream, dispatcher, lost.clone()));

        self.active = Some(ActiveTransport { conn, lost, reader });
        self.last_degraded_attempt = None;
        tracing::info!("Connected to {}", redact(&url));
        self.set_state(ConnectionState::Connected);

        tokio::spawn(upload_basic_info(Arc::clone(&self.state)));
        Ok(())
    }

    async fn reap_lost_transport(&mut self) {
        let lost = self
            .active
            .as_ref()
            .is_some_and(|active| active.lost.is_cancelled() || active.conn.is_closed());
        if lost {
            tracing::warn!("Report transport lost");
            self.disconnect().await;
        }
    }

    /// Close and drop the transport, if any
    async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.reader.abort();
        if tokio::time::timeout(self.state.config.write_timeout, active.conn.close())
            .await
            .is_err()
        {
            tracing::debug!("Timed out closing report transport");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn snapshot(&self) -> Report {
        let telemetry = Arc::clone(&self.state.telemetry);
        match tokio::task::spawn_blocking(move || telemetry.snapshot()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Telemetry snapshot panicked: {}", e);
                let mut report = Report::default();
                report.warn(format!("snapshot failed: {}", e));
                report
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.status.send_replace(next);
        if previous != next {
            tracing::debug!("Connection state: {} -> {}", previous, next);
        }
    }
}

/// Collect and upload the host basic info once
pub async fn upload_basic_info(state: Arc<AgentState>) {
    let telemetry = Arc::clone(&state.telemetry);
    let info = match tokio::task::spawn_blocking(move || telemetry.basic_info()).await {
        Ok(info) => info,
        Err(e) => {
            tracing::error!("Collecting basic info panicked: {}", e);
            return;
        }
    };

    let uploaded = match state.uplink.post_basic_info(&info).await {
        // Control planes from before kernel reporting reject the field
        Err(e) if !info.kernel_version.is_empty() => {
            tracing::debug!("Basic info rejected ({}), retrying without kernel version", e);
            state
                .uplink
                .post_basic_info(&info.without_kernel_version())
                .await
        }
        other => other,
    };

    match uploaded {
        Ok(()) => tracing::debug!("Uploaded basic info"),
        Err(e) => tracing::warn!("Failed to upload basic info: {}", e),
    }
}

/// Re-upload the basic info every `info_report_interval`
pub async fn run_basic_info_refresher(state: Arc<AgentState>, shutdown: CancellationToken) {
    let period = state.config.info_report_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => upload_basic_info(Arc::clone(&state)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use reqwest::Url;

    use hl_core::config::AgentConfig;
    use hl_core::testing::{FixedTelemetry, RecordingUplink};
    use hl_core::traits::TelemetryProvider;
    use hl_protocol::report::CpuUsage;
    use hl_protocol::{BasicInfo, Frame};

    use crate::transport::duplex::DuplexDialer;
    use crate::transport::{Dialer, FrameStream};

    fn fixed_report() -> Report {
        Report {
            cpu: Some(CpuUsage { usage: 12.5 }),
            uptime: Some(3600),
            ..Default::default()
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            endpoint: "http://panel.test".into(),
            token: "tok".into(),
            ..AgentConfig::default()
        }
    }

    fn state(dialer: Arc<dyn Dialer>, uplink: Arc<RecordingUplink>) -> Arc<AgentState> {
        Arc::new(
            AgentState::new(config())
                .unwrap()
                .with_dialer(dialer)
                .with_uplink(uplink)
                .with_telemetry(Arc::new(FixedTelemetry::new(fixed_report()))),
        )
    }

    /// Dialer whose transports accept the handshake but never take a write
    struct BrokenWriteDialer {
        stall: bool,
    }

    #[async_trait]
    impl Dialer for BrokenWriteDialer {
        async fn dial(&self, _url: &Url) -> Result<(SafeConn, FrameStream), ConnectionError> {
            let stall = self.stall;
            let sink = futures::sink::unfold((), move |(), _frame: Frame| async move {
                if stall {
                    std::future::pending::<()>().await;
                }
                Err::<(), _>(ConnectionError::Send("broken pipe".into()))
            });
            let conn = SafeConn::new(Box::pin(sink));
            let source = stream::pending::<Result<Frame, ConnectionError>>();
            let stream = FrameStream::new(Box::pin(source));
            Ok((conn, stream))
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_degrade_then_recover() {
        let (dialer, mut peers) = DuplexDialer::new();
        let dialer = Arc::new(dialer);
        dialer.refuse(true);
        let uplink = Arc::new(RecordingUplink::new());
        let mut manager = ConnectionManager::new(state(dialer.clone(), uplink.clone()));

        let started = Instant::now();
        manager.tick().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(16), "{:?}", elapsed);
        assert_eq!(dialer.dial_count(), 4);
        assert_eq!(manager.state(), ConnectionState::Degraded);
        assert_eq!(uplink.reports(), vec![fixed_report()]);

        // Inside the degraded reconnect interval: no handshake, one post per tick
        tokio::time::advance(Duration::from_secs(30)).await;
        manager.tick().await;
        manager.tick().await;
        assert_eq!(dialer.dial_count(), 4);
        assert_eq!(uplink.reports().len(), 3);

        dialer.refuse(false);
        tokio::time::advance(Duration::from_secs(31)).await;
        manager.tick().await;
        assert_eq!(dialer.dial_count(), 5);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(uplink.reports().len(), 3);

        let (url, mut peer) = peers.next().await.unwrap();
        assert_eq!(url.path(), "/api/clients/report");
        assert_eq!(url.scheme(), "ws");
        let frame = peer.recv().await.unwrap();
        let report: Report = serde_json::from_slice(frame.as_bytes()).unwrap();
        assert_eq!(report, fixed_report());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_degraded_attempt_waits_full_interval_again() {
        let (dialer, _peers) = DuplexDialer::new();
        let dialer = Arc::new(dialer);
        dialer.refuse(true);
        let uplink = Arc::new(RecordingUplink::new());
        let mut manager = ConnectionManager::new(state(dialer.clone(), uplink.clone()));

        manager.tick().await;
        assert_eq!(dialer.dial_count(), 4);

        tokio::time::advance(Duration::from_secs(60)).await;
        manager.tick().await;
        assert_eq!(dialer.dial_count(), 5);
        assert_eq!(manager.state(), ConnectionState::Degraded);

        tokio::time::advance(Duration::from_secs(30)).await;
        manager.tick().await;
        assert_eq!(dialer.dial_count(), 5);
        assert_eq!(uplink.reports().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_ticks_send_identical_snapshots() {
        let (dialer, mut peers) = DuplexDialer::new();
        let uplink = Arc::new(RecordingUplink::new());
        let mut manager = ConnectionManager::new(state(Arc::new(dialer), uplink.clone()));
        let mut status = manager.subscribe();

        manager.tick().await;
        manager.tick().await;
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), ConnectionState::Connected);

        let (_url, mut peer) = peers.next().await.unwrap();
        let first = peer.recv().await.unwrap();
        let second = peer.recv().await.unwrap();
        assert_eq!(first, second);
        assert!(uplink.reports().is_empty());

        wait_for(|| uplink.basic_infos().len() == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_disconnects_then_reconnects() {
        let uplink = Arc::new(RecordingUplink::new());
        let dialer = Arc::new(BrokenWriteDialer { stall: false });
        let mut manager = ConnectionManager::new(state(dialer, uplink.clone()));

        manager.tick().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.active.is_none());

        // The next tick dials again instead of falling back
        manager.tick().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(uplink.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let uplink = Arc::new(RecordingUplink::new());
        let dialer = Arc::new(BrokenWriteDialer { stall: true });
        let mut manager = ConnectionManager::new(state(dialer, uplink));

        let started = Instant::now();
        manager.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_is_reaped_and_reconnected() {
        let (dialer, mut peers) = DuplexDialer::new();
        let dialer = Arc::new(dialer);
        let uplink = Arc::new(RecordingUplink::new());
        let mut manager = ConnectionManager::new(state(dialer.clone(), uplink));

        manager.tick().await;
        let (_url, peer) = peers.next().await.unwrap();
        peer.fail("connection reset");

        let lost = manager.active.as_ref().unwrap().lost.clone();
        tokio::time::timeout(Duration::from_secs(1), lost.cancelled())
            .await
            .unwrap();

        manager.tick().await;
        assert_eq!(dialer.dial_count(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);

        let (_url, mut peer) = peers.next().await.unwrap();
        assert!(peer.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_until_shutdown() {
        let (dialer, mut peers) = DuplexDialer::new();
        let uplink = Arc::new(RecordingUplink::new());
        let manager = ConnectionManager::new(state(Arc::new(dialer), uplink));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(manager.run(shutdown.clone()));

        let (_url, mut peer) = peers.next().await.unwrap();
        for _ in 0..3 {
            assert!(peer.recv().await.is_some());
        }

        shutdown.cancel();
        handle.await.unwrap();

        // Closed transport: the peer drains and then sees the end
        while peer.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_info_refresher_period() {
        let (dialer, _peers) = DuplexDialer::new();
        let uplink = Arc::new(RecordingUplink::new());
        let state = state(Arc::new(dialer), uplink.clone());
        let period = state.config.info_report_interval;
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_basic_info_refresher(state, shutdown.clone()));

        tokio::time::sleep(period / 2).await;
        assert!(uplink.basic_infos().is_empty());

        tokio::time::sleep(period * 2).await;
        assert_eq!(uplink.basic_infos().len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    struct KernelTelemetry;

    impl TelemetryProvider for KernelTelemetry {
        fn snapshot(&self) -> Report {
            fixed_report()
        }

        fn basic_info(&self) -> BasicInfo {
            BasicInfo {
                os: "linux".into(),
                kernel_version: "6.1.0".into(),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn test_basic_info_retried_without_kernel_version() {
        let uplink = Arc::new(RecordingUplink::failing(1));
        let state = Arc::new(
            AgentState::new(config())
                .unwrap()
                .with_uplink(uplink.clone())
                .with_telemetry(Arc::new(KernelTelemetry)),
        );

        upload_basic_info(state).await;

        assert_eq!(uplink.attempts(), 2);
        let accepted = uplink.basic_infos();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].os, "linux");
        assert!(accepted[0].kernel_version.is_empty());
    }

    #[tokio::test]
    async fn test_basic_info_without_kernel_version_not_retried() {
        let (dialer, _peers) = DuplexDialer::new();
        let uplink = Arc::new(RecordingUplink::failing(1));
        let state = state(Arc::new(dialer), uplink.clone());

        upload_basic_info(state).await;

        assert_eq!(uplink.attempts(), 1);
        assert!(uplink.basic_infos().is_empty());
    }
}
