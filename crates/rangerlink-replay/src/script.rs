//! Recorded session scripts.
//!
//! A script describes the host, the slot options the server negotiates and
//! an ordered list of steps: host-side actions (phase changes, beating a
//! stage, freeing a slot), server events and ticks. Scripts are YAML; JSON
//! works too since it is valid YAML.
//!
//! ```yaml
//! slot:
//!   death_link: true
//!   goal_stages: [3]
//! steps:
//!   - step: connect
//!   - step: phase
//!     phase: 6
//!   - step: tick
//!   - step: event
//!     event:
//!       type: items_delivered
//!       batch: { start_index: 0, items: [11001, 12004] }
//!   - step: beat
//!     stage: 1
//!   - step: tick
//!     count: 2
//! ```

use std::path::Path;
use std::sync::Arc;

use rangerlink_core::{
    ClientConfig, OperatorState, ScriptedSession, SessionController, event_channel, log_session_end,
    run_session,
};
use rangerlink_reconcile::MemoryHost;
use rangerlink_store::{AnyStore, WriterReport};
use rangerlink_types::{InventoryLayout, Phase, RemoteEvent, SessionConfig, SlotItem, StageFlags, StageId};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ReplayError;

/// The host the script runs against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostSetup {
    /// Stages in the record.
    #[serde(default = "default_stages")]
    pub stages: usize,
    /// Party members.
    #[serde(default = "default_party_size")]
    pub party_size: usize,
    /// Starting gold.
    #[serde(default)]
    pub gold: u64,
}

impl Default for HostSetup {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            party_size: default_party_size(),
            gold: 0,
        }
    }
}

const fn default_stages() -> usize {
    100
}

const fn default_party_size() -> usize {
    4
}

const fn default_count() -> u64 {
    1
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Request a connect with the configured connection.
    Connect,
    /// Move the host to a phase.
    Phase {
        /// Raw phase value.
        phase: u16,
    },
    /// Deliver a server event.
    Event {
        /// The event.
        event: RemoteEvent,
    },
    /// The player beats a stage.
    Beat {
        /// Stage index.
        stage: u16,
    },
    /// The player buys a stage's book.
    Book {
        /// Stage index.
        stage: u16,
    },
    /// An enemy type drops an item.
    Drop {
        /// Enemy id.
        enemy: u16,
    },
    /// The player empties an inventory slot.
    Free {
        /// Slot index.
        slot: usize,
    },
    /// The player picks up an item into the hand slot.
    Hold {
        /// Item index.
        item: u16,
    },
    /// Run ticks back to back.
    Tick {
        /// Number of ticks.
        #[serde(default = "default_count")]
        count: u64,
    },
    /// Hand the session to the frame loop for `ticks` frames. The loop shuts
    /// the session down when it ends.
    Run {
        /// Frame limit.
        ticks: u64,
    },
    /// Write the final snapshot and disconnect.
    Shutdown,
}

/// A whole script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Script {
    /// Host shape.
    #[serde(default)]
    pub host: HostSetup,
    /// Options returned by the scripted login.
    #[serde(default)]
    pub slot: SessionConfig,
    /// Reasons to refuse the first login with.
    #[serde(default)]
    pub refuse: Option<Vec<String>>,
    /// Steps, in order.
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl Script {
    /// Read a script from disk.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a script from YAML or JSON.
    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_yml::from_str(text)?)
    }
}

/// What a replay produced.
#[derive(Debug)]
pub struct ReplayReport {
    /// Ticks run.
    pub ticks: u64,
    /// Ticks that failed inside the frame loop.
    pub failed_ticks: u64,
    /// The scripted session, with every outbound call it recorded.
    pub session: ScriptedSession,
    /// Final state of the host.
    pub host: MemoryHost,
    /// The last snapshot the controller would persist.
    pub snapshot: rangerlink_types::Snapshot,
    /// What the snapshot writer did.
    pub writer: WriterReport,
}

type Controller = SessionController<MemoryHost, ScriptedSession, AnyStore>;

/// Play `script` against a fresh in-memory host.
pub async fn play(script: Script, config: &ClientConfig, store: AnyStore) -> Result<ReplayReport, ReplayError> {
    let layout: InventoryLayout = config.inventory;
    let mut host = MemoryHost::new(script.host.stages, layout, script.host.party_size);
    host.gold = script.host.gold;

    let mut session = ScriptedSession::new(script.slot);
    session.refuse = script.refuse;

    let (sink, backlog) = event_channel();
    let mut controller: Controller =
        SessionController::new(host, session, Arc::new(store), backlog, config);

    let mut ticks: u64 = 0;
    let mut failed_ticks: u64 = 0;
    let mut writer = WriterReport::default();
    let mut finished = false;

    for (index, step) in script.steps.into_iter().enumerate() {
        debug!(index, ?step, "script step");
        match step {
            ScriptStep::Connect => controller.request_connect(&config.connection).await?,
            ScriptStep::Phase { phase } => controller.host_mut().phase = Phase(phase),
            ScriptStep::Event { event } => {
                sink.push(event);
            }
            ScriptStep::Beat { stage } => {
                controller.host_mut().stages.mark(StageId(stage), StageFlags::BEATEN);
            }
            ScriptStep::Book { stage } => {
                controller.host_mut().stages.mark(StageId(stage), StageFlags::BOOKED);
            }
            ScriptStep::Drop { enemy } => controller.host_mut().enemy_drops.push(enemy),
            ScriptStep::Free { slot } => {
                controller.host_mut().inventory.take(slot);
            }
            ScriptStep::Hold { item } => {
                let inventory = &mut controller.host_mut().inventory;
                let transient = inventory.layout().transient;
                inventory.take(transient);
                inventory.place(transient, SlotItem::plain(item));
            }
            ScriptStep::Tick { count } => {
                for _ in 0..count {
                    controller.tick().await?;
                    ticks = ticks.saturating_add(1);
                }
            }
            ScriptStep::Run { ticks: limit } => {
                let operator = Arc::new(OperatorState::new(config.tick.interval_ms, limit, 0));
                let result = run_session(&mut controller, &operator).await;
                log_session_end(&result);
                ticks = ticks.saturating_add(result.total_ticks);
                failed_ticks = failed_ticks.saturating_add(result.failed_ticks);
                writer = result.writer;
                finished = true;
            }
            ScriptStep::Shutdown => {
                writer = controller.shutdown().await;
                finished = true;
            }
        }
    }

    if !finished {
        writer = controller.shutdown().await;
    }

    let snapshot = controller.snapshot();
    info!(
        ticks,
        received = snapshot.received_items.len(),
        checks = controller.session().checks.len(),
        goals = controller.session().goals,
        deaths = controller.session().deaths.len(),
        "replay finished"
    );

    Ok(ReplayReport {
        ticks,
        failed_ticks,
        session: controller.session().clone(),
        host: controller.host().clone(),
        snapshot,
        writer,
    })
}
