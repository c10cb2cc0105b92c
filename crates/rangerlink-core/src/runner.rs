//! Frame loop with operator controls.
//!
//! [`run_session`] ticks a [`SessionController`] once per frame interval
//! until the operator stops it or a bound is hit, then shuts the controller
//! down cleanly. A tick that returns an error or panics is logged and the
//! loop carries on with the next frame; nothing a tick does can stop the
//! loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rangerlink_reconcile::HostGame;
use rangerlink_store::{SnapshotStore, WriterReport};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::controller::{SessionController, TickSummary};
use crate::operator::{OperatorState, SessionEndReason};
use crate::session::RemoteSession;

/// Result of a session run.
#[derive(Debug)]
pub struct SessionResult {
    /// Why the run ended.
    pub end_reason: SessionEndReason,
    /// The last successful tick, if any.
    pub final_summary: Option<TickSummary>,
    /// Ticks attempted.
    pub total_ticks: u64,
    /// Ticks that returned an error.
    pub failed_ticks: u64,
    /// Ticks that panicked.
    pub panicked_ticks: u64,
    /// What the snapshot writer did.
    pub writer: WriterReport,
}

fn frame_interval(ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Tick `controller` until a termination condition is met, then shut it
/// down.
pub async fn run_session<H, S, T>(
    controller: &mut SessionController<H, S, T>,
    operator: &Arc<OperatorState>,
) -> SessionResult
where
    H: HostGame,
    S: RemoteSession,
    T: SnapshotStore + 'static,
{
    let mut final_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;
    let mut failed_ticks: u64 = 0;
    let mut panicked_ticks: u64 = 0;

    let mut interval_ms = operator.tick_interval_ms();
    let mut interval = frame_interval(interval_ms);

    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = interval_ms,
        "session loop starting"
    );

    let end_reason = loop {
        if operator.is_paused() {
            info!("session paused, waiting for resume");
            operator.wait_if_paused().await;
            info!("session resumed");
        }

        if operator.is_stop_requested() {
            info!("operator stop requested");
            break SessionEndReason::OperatorStop;
        }

        if operator.time_limit_reached() {
            info!(
                max_seconds = operator.max_real_time_seconds(),
                elapsed = operator.elapsed_seconds(),
                "real-time limit reached"
            );
            break SessionEndReason::MaxRealTimeReached;
        }

        if operator.tick_interval_ms() != interval_ms {
            interval_ms = operator.tick_interval_ms();
            interval = frame_interval(interval_ms);
            info!(tick_interval_ms = interval_ms, "frame interval changed");
        }
        interval.tick().await;

        total_ticks = total_ticks.saturating_add(1);
        match AssertUnwindSafe(controller.tick()).catch_unwind().await {
            Ok(Ok(summary)) => final_summary = Some(summary),
            Ok(Err(e)) => {
                failed_ticks = failed_ticks.saturating_add(1);
                warn!(tick = total_ticks, error = %e, "tick failed");
            }
            Err(_panic) => {
                panicked_ticks = panicked_ticks.saturating_add(1);
                warn!(tick = total_ticks, "tick panicked");
            }
        }

        if operator.tick_limit_reached(total_ticks) {
            info!(
                ticks = total_ticks,
                max_ticks = operator.max_ticks(),
                "tick limit reached"
            );
            break SessionEndReason::MaxTicksReached;
        }
    };

    operator.set_end_reason(end_reason.clone()).await;
    let writer = controller.shutdown().await;
    SessionResult {
        end_reason,
        final_summary,
        total_ticks,
        failed_ticks,
        panicked_ticks,
        writer,
    }
}

/// Log how a run ended.
pub fn log_session_end(result: &SessionResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        failed_ticks = result.failed_ticks,
        panicked_ticks = result.panicked_ticks,
        final_sequence = result.final_summary.as_ref().map(|s| s.sequence),
        snapshots_written = result.writer.written,
        "session ended"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rangerlink_reconcile::MemoryHost;
    use rangerlink_store::MemoryStore;
    use rangerlink_types::{LocationId, Phase, SessionConfig, StageFlags, StageId};

    use super::*;
    use crate::config::ClientConfig;
    use crate::controller::Lifecycle;
    use crate::session::{ScriptedSession, event_channel};

    fn controller() -> SessionController<MemoryHost, ScriptedSession, MemoryStore> {
        let (_sink, backlog) = event_channel();
        let mut config = ClientConfig::default();
        config.tick.seed = Some(1);
        SessionController::new(
            MemoryHost::default(),
            ScriptedSession::new(SessionConfig::default()),
            Arc::new(MemoryStore::new()),
            backlog,
            &config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_tick_limit() {
        let mut controller = controller();
        let operator = Arc::new(OperatorState::new(16, 5, 0));
        let result = run_session(&mut controller, &operator).await;
        assert_eq!(result.end_reason, SessionEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 5);
        assert_eq!(result.failed_ticks, 0);
        assert_eq!(operator.end_reason().await, Some(SessionEndReason::MaxTicksReached));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick() {
        let mut controller = controller();
        let operator = Arc::new(OperatorState::new(16, 0, 0));
        operator.request_stop();
        let result = run_session(&mut controller, &operator).await;
        assert_eq!(result.end_reason, SessionEndReason::OperatorStop);
        assert_eq!(result.total_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_shuts_down() {
        let mut controller = controller();
        controller
            .request_connect(&ClientConfig::default().connection)
            .await
            .unwrap();
        controller.host_mut().phase = Phase::MAP;
        let operator = Arc::new(OperatorState::new(16, 3, 0));
        let result = run_session(&mut controller, &operator).await;
        assert_eq!(result.total_ticks, 3);
        assert!(result.writer.written >= 1);
        assert_eq!(controller.session().disconnects, 1);
        assert_eq!(controller.lifecycle(), Lifecycle::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_do_not_stop_the_loop() {
        let mut controller = controller();
        controller
            .request_connect(&ClientConfig::default().connection)
            .await
            .unwrap();
        controller.host_mut().phase = Phase::MAP;
        controller.host_mut().stages.mark(StageId(1), StageFlags::BEATEN);
        // The first failure hits the login resend, the second a tick.
        controller.session_mut().fail_checks = 2;

        let operator = Arc::new(OperatorState::new(16, 5, 0));
        let result = run_session(&mut controller, &operator).await;
        assert_eq!(result.total_ticks, 5);
        assert_eq!(result.failed_ticks, 1);
        assert_eq!(result.final_summary.map(|s| s.sequence), Some(5));
        assert_eq!(controller.session().checks, vec![LocationId(10_001)]);
    }
}
