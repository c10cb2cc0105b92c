//! The remote multiworld session and its inbound event backlog.
//!
//! The transport that talks to the server lives outside this crate. It
//! implements [`RemoteSession`] for outbound calls and pushes decoded
//! [`RemoteEvent`]s into an [`EventSink`]. The controller drains the matching
//! [`EventBacklog`] at the start of every tick, so events are handled in
//! arrival order and never re-entrantly.

use std::future::Future;

use rangerlink_types::{HintMode, LocationId, RemoteEvent, SessionConfig};
use tokio::sync::mpsc;

/// Errors surfaced by a remote session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The server could not be reached at all.
    #[error("server unreachable at {address}: {reason}")]
    Unreachable {
        /// `host:port` that was dialled.
        address: String,
        /// Transport's description of the failure.
        reason: String,
    },

    /// The server rejected the login.
    #[error("login refused: {}", reasons.join(", "))]
    Refused {
        /// One entry per reason the server gave.
        reasons: Vec<String>,
    },

    /// A call failed after the session was established.
    #[error("transport error: {0}")]
    Transport(String),

    /// The login did not complete in time.
    #[error("login timed out after {ms} ms")]
    Timeout {
        /// Configured timeout.
        ms: u64,
    },
}

/// Everything needed to join a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Game name.
    pub game: String,
    /// Slot name.
    pub slot_name: String,
    /// Room password.
    pub password: Option<String>,
    /// Tags announced at login.
    pub tags: Vec<String>,
}

impl LoginRequest {
    /// `host:port`, as shown to the user when the server is unreachable.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outbound half of a multiworld session.
pub trait RemoteSession: Send {
    /// Join the slot and return the negotiated options.
    fn login(
        &mut self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<SessionConfig, SessionError>> + Send;

    /// Report checked locations.
    fn check_locations(
        &mut self,
        locations: &[LocationId],
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Ask what sits behind `locations`. Results arrive as a
    /// [`RemoteEvent::LocationInfo`].
    fn scout_locations(
        &mut self,
        locations: &[LocationId],
        mode: HintMode,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Report that the goal is complete.
    fn report_goal_complete(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Broadcast a local death.
    fn send_death_link(
        &mut self,
        source: &str,
        cause: &str,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Subscribe to other sessions' deaths.
    fn enable_death_link(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Replace the session's tags.
    fn update_tags(&mut self, tags: &[String]) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Ask the server to resend the whole item stream.
    fn sync(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Close the session.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}

/// Sending half of the event backlog, held by the transport.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RemoteEvent>,
}

impl EventSink {
    /// Queue an event for the next tick. Returns `false` if the controller
    /// is gone.
    pub fn push(&self, event: RemoteEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half of the event backlog, owned by the controller.
#[derive(Debug)]
pub struct EventBacklog {
    rx: mpsc::UnboundedReceiver<RemoteEvent>,
}

impl EventBacklog {
    /// Take every queued event, oldest first, without waiting.
    pub fn drain(&mut self) -> Vec<RemoteEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sink/backlog pair.
pub fn event_channel() -> (EventSink, EventBacklog) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventBacklog { rx })
}

/// A session that answers from a script and records every outbound call.
///
/// Used by the replay binary and the integration tests in place of a real
/// transport.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSession {
    /// Options returned by a successful login.
    pub slot: SessionConfig,
    /// When set, the next login is refused with these reasons.
    pub refuse: Option<Vec<String>>,
    /// When set, the next login fails as unreachable.
    pub unreachable: bool,
    /// Logins attempted.
    pub logins: Vec<LoginRequest>,
    /// Every checked location, in send order.
    pub checks: Vec<LocationId>,
    /// Every scout request.
    pub scouts: Vec<(Vec<LocationId>, HintMode)>,
    /// Goal reports sent.
    pub goals: u32,
    /// Deaths sent as `(source, cause)`.
    pub deaths: Vec<(String, String)>,
    /// Whether death-link was enabled.
    pub death_link_enabled: bool,
    /// Tag updates, in order.
    pub tags: Vec<Vec<String>>,
    /// Sync requests sent.
    pub syncs: u32,
    /// Disconnects.
    pub disconnects: u32,
    /// Number of upcoming `check_locations` calls that fail.
    pub fail_checks: u32,
    /// Number of upcoming `sync` calls that fail.
    pub fail_sync: u32,
    /// Number of upcoming `send_death_link` calls that fail.
    pub fail_death: u32,
    /// Number of upcoming `report_goal_complete` calls that fail.
    pub fail_goal: u32,
}

/// Consume one scheduled failure, if any are left.
fn scheduled_failure(remaining: &mut u32, call: &str) -> Result<(), SessionError> {
    if *remaining == 0 {
        return Ok(());
    }
    *remaining = remaining.saturating_sub(1);
    Err(SessionError::Transport(format!("{call} dropped by script")))
}

impl ScriptedSession {
    /// A session whose logins succeed with `slot`.
    pub fn new(slot: SessionConfig) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }
}

impl RemoteSession for ScriptedSession {
    async fn login(&mut self, request: &LoginRequest) -> Result<SessionConfig, SessionError> {
        self.logins.push(request.clone());
        if self.unreachable {
            return Err(SessionError::Unreachable {
                address: request.address(),
                reason: "connection refused".to_owned(),
            });
        }
        if let Some(reasons) = self.refuse.take() {
            return Err(SessionError::Refused { reasons });
        }
        Ok(self.slot.clone())
    }

    async fn check_locations(&mut self, locations: &[LocationId]) -> Result<(), SessionError> {
        scheduled_failure(&mut self.fail_checks, "check_locations")?;
        self.checks.extend_from_slice(locations);
        Ok(())
    }

    async fn scout_locations(&mut self, locations: &[LocationId], mode: HintMode) -> Result<(), SessionError> {
        self.scouts.push((locations.to_vec(), mode));
        Ok(())
    }

    async fn report_goal_complete(&mut self) -> Result<(), SessionError> {
        scheduled_failure(&mut self.fail_goal, "report_goal_complete")?;
        self.goals = self.goals.saturating_add(1);
        Ok(())
    }

    async fn send_death_link(&mut self, source: &str, cause: &str) -> Result<(), SessionError> {
        scheduled_failure(&mut self.fail_death, "send_death_link")?;
        self.deaths.push((source.to_owned(), cause.to_owned()));
        Ok(())
    }

    async fn enable_death_link(&mut self) -> Result<(), SessionError> {
        self.death_link_enabled = true;
        Ok(())
    }

    async fn update_tags(&mut self, tags: &[String]) -> Result<(), SessionError> {
        self.tags.push(tags.to_vec());
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), SessionError> {
        scheduled_failure(&mut self.fail_sync, "sync")?;
        self.syncs = self.syncs.saturating_add(1);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects = self.disconnects.saturating_add(1);
    }
}
