//! Session orchestration for the RangerLink multiworld client.
//!
//! This crate ties the pure reconciliation components to a remote session,
//! a snapshot store and the host game's frame loop:
//!
//! ```text
//! transport --push--> EventSink ~~> EventBacklog
//!                                        |
//!                                        v
//! run_session --tick--> SessionController --HostGame--> host
//!                           |         |
//!                    RemoteSession  SnapshotWriter --> SnapshotStore
//! ```
//!
//! # Modules
//!
//! - [`config`] -- `rangerlink.yaml` loading and validation
//! - [`session`] -- The [`RemoteSession`] trait, event backlog and a scripted session
//! - [`controller`] -- Connection lifecycle and the per-tick phases
//! - [`operator`] -- Pause, stop and bounds for a running session
//! - [`runner`] -- The frame loop

pub mod config;
pub mod controller;
pub mod operator;
pub mod runner;
pub mod session;

pub use config::{ClientConfig, ConfigError, ConnectionConfig, LoggingConfig, TickConfig};
pub use controller::{Lifecycle, SessionController, TickError, TickSummary};
pub use operator::{OperatorState, SessionEndReason};
pub use runner::{SessionResult, log_session_end, run_session};
pub use session::{
    EventBacklog, EventSink, LoginRequest, RemoteSession, ScriptedSession, SessionError,
    event_channel,
};
