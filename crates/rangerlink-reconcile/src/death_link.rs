//! Death propagation between sessions.
//!
//! Each life cycle of the party can do at most one of two things: send a
//! death (the local party was defeated) or apply one (another player died).
//! Both paths end in a terminal state that only clears when the host drops
//! below the map phase, so a remote death that kills the local party is not
//! echoed back as a new local death.

use rangerlink_types::{DeathNotice, Phase};
use tracing::{debug, info};

use crate::host::HostGame;

/// Where the current life cycle is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeathLinkState {
    /// Nothing has happened this life cycle.
    #[default]
    Idle,
    /// The local party was defeated and a send was requested.
    LocalDeathPending,
    /// The local death was sent.
    Sent,
    /// A remote death arrived and waits for active play.
    RemoteDeathReceived {
        /// Slot that died.
        source: String,
        /// Cause reported by that slot.
        cause: Option<String>,
    },
    /// A remote death was applied to the local party.
    Applied,
}

/// What the coordinator wants done this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathLinkAction {
    /// Nothing.
    None,
    /// Broadcast a local death.
    Send {
        /// Cause text for the broadcast.
        cause: String,
    },
    /// A remote death was just applied to the party.
    Applied {
        /// Slot the death came from.
        source: String,
    },
}

/// Per-life-cycle death-link state machine.
#[derive(Debug, Clone, Default)]
pub struct DeathLink {
    enabled: bool,
    slot: String,
    state: DeathLinkState,
}

impl DeathLink {
    /// A coordinator for `slot`. Disabled coordinators never act.
    pub fn new(slot: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            slot: slot.into(),
            state: DeathLinkState::Idle,
        }
    }

    /// Turn death-link on or off, e.g. after login negotiated it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether death-link is on.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current state.
    pub const fn state(&self) -> &DeathLinkState {
        &self.state
    }

    /// Accept a remote death notice.
    ///
    /// Ignored when disabled, when the notice is this slot's own echo, or when
    /// this life cycle already sent or received one. Returns `true` if the
    /// notice was accepted.
    pub fn receive(&mut self, notice: &DeathNotice) -> bool {
        if !self.enabled {
            return false;
        }
        if notice.source == self.slot {
            debug!(source = %notice.source, "ignoring own death echo");
            return false;
        }
        if self.state != DeathLinkState::Idle {
            debug!(source = %notice.source, state = ?self.state, "death already handled this life");
            return false;
        }
        info!(source = %notice.source, cause = ?notice.cause, "remote death received");
        self.state = DeathLinkState::RemoteDeathReceived {
            source: notice.source.clone(),
            cause: notice.cause.clone(),
        };
        true
    }

    /// Advance the state machine for this tick's phase.
    ///
    /// Falls back to idle below the map phase. Requests a send when the
    /// party is defeated in an idle cycle, and keeps requesting it until
    /// [`confirm_sent`](Self::confirm_sent). Applies a pending remote death once
    /// the host is in active play, killing every member.
    pub fn on_tick<H: HostGame + ?Sized>(&mut self, host: &mut H) -> DeathLinkAction {
        let phase = host.phase();
        if !phase.is_session_active() {
            if self.state != DeathLinkState::Idle {
                debug!(%phase, "death-link reset for new life cycle");
            }
            self.state = DeathLinkState::Idle;
            return DeathLinkAction::None;
        }
        if !self.enabled {
            return DeathLinkAction::None;
        }

        match &self.state {
            DeathLinkState::Idle if phase == Phase::DEFEAT => {
                self.state = DeathLinkState::LocalDeathPending;
                DeathLinkAction::Send {
                    cause: self.cause(),
                }
            }
            DeathLinkState::LocalDeathPending => {
                debug!("death send unconfirmed, requesting again");
                DeathLinkAction::Send {
                    cause: self.cause(),
                }
            }
            DeathLinkState::RemoteDeathReceived { source, .. } if phase.is_active_play() => {
                let source = source.clone();
                for member in host.party_mut() {
                    member.hp = 0;
                }
                host.clear_death_metadata();
                host.seal();
                info!(%source, "remote death applied");
                self.state = DeathLinkState::Applied;
                DeathLinkAction::Applied { source }
            }
            _ => DeathLinkAction::None,
        }
    }

    fn cause(&self) -> String {
        format!("{} was defeated", self.slot)
    }

    /// Record that the requested send went out. Until this is called the
    /// send is requested again on every tick of the same life cycle.
    pub fn confirm_sent(&mut self) {
        if self.state == DeathLinkState::LocalDeathPending {
            self.state = DeathLinkState::Sent;
        }
    }
}
