//! The session controller: lifecycle, per-tick orchestration and
//! persistence.
//!
//! The controller owns every reconciliation component and the host handle.
//! Each call to [`SessionController::tick`] runs the phases below in order,
//! once per host frame:
//!
//! ```text
//! 1.  Drain the event backlog (items, hints, deaths, connection changes)
//! 2.  Flush the inventory allocator (class-swap items first, then grants)
//! 3.  Trap gate: clear on defeat, fire queued traps in active play
//! 4.  Death stash: pull the in-hand item when the party is defeated
//! 5.  Progress watcher: stage diffs and enemy drops -> check queue, flushed
//! 6.  Goal check
//! 7.  Death-link
//! 8.  Stash restore
//! 9.  Item resync (new game, or a gap in the item stream)
//! 10. Pending connect (login once the host reaches the map)
//! 11. Shop scouting
//! 12. Persist if anything changed
//! ```
//!
//! A failed remote call never cuts a tick short. Whatever it carried stays
//! queued (checks, goal, death, sync) and is retried on the next connected
//! tick; the remaining phases still run and the first failure is returned as
//! a [`TickError`] once the tick is done.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rangerlink_reconcile::{
    BookLedger, DeathLink, DeathLinkAction, Effects, HostGame, InventoryAllocator,
    ProgressWatcher, Reconciler, StashSlot, TrapDispatcher,
};
use rangerlink_store::{SnapshotStore, SnapshotWriter, StorageKey, StoreError, WriterReport};
use rangerlink_types::{
    HintMode, LocationId, ModSettings, Phase, RemoteEvent, SNAPSHOT_VERSION, SessionConfig,
    Snapshot,
};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConnectionConfig};
use crate::session::{EventBacklog, LoginRequest, RemoteSession, SessionError};

/// Tag announced to the server while death-link is on.
const DEATH_LINK_TAG: &str = "DeathLink";

/// Log a failed remote call and keep the first one for the tick's result.
fn note_failure(failure: &mut Option<SessionError>, call: &'static str, error: SessionError) {
    warn!(call, error = %error, "remote call failed, retrying next tick");
    if failure.is_none() {
        *failure = Some(error);
    }
}

/// Errors that fail a tick or a connect request.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A remote call failed.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: SessionError,
    },

    /// The snapshot could not be loaded.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Where the controller is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// No session. A connect request is needed.
    #[default]
    Disconnected,
    /// State is restored; login waits for the host to reach the map.
    AwaitingGame,
    /// Logged in.
    Connected,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    /// Tick sequence number.
    pub sequence: u64,
    /// Host phase observed this tick.
    pub phase: Phase,
    /// Remote events handled.
    pub events: usize,
    /// Items applied for the first time.
    pub items_received: usize,
    /// Location checks sent.
    pub checks_sent: usize,
    /// Traps that fired.
    pub traps_fired: usize,
    /// Whether a snapshot was submitted.
    pub persisted: bool,
}

/// Drives one slot's session against one host.
#[derive(Debug)]
pub struct SessionController<H, S, T>
where
    H: HostGame,
    S: RemoteSession,
    T: SnapshotStore + 'static,
{
    host: H,
    session: S,
    store: Arc<T>,
    writer: Option<SnapshotWriter>,
    backlog: EventBacklog,
    rng: SmallRng,

    lifecycle: Lifecycle,
    request: Option<LoginRequest>,
    key: Option<StorageKey>,
    login_timeout_ms: u64,
    config: SessionConfig,

    reconciler: Reconciler,
    allocator: InventoryAllocator,
    traps: TrapDispatcher,
    watcher: ProgressWatcher,
    death_link: DeathLink,
    books: BookLedger,
    death_stash: StashSlot,
    connect_stash: StashSlot,

    unsent_checks: Vec<LocationId>,
    goal_pending: bool,
    sync_pending: bool,

    last_phase: Phase,
    sequence: u64,
    dirty: bool,
    had_snapshot: bool,
}

impl<H, S, T> SessionController<H, S, T>
where
    H: HostGame,
    S: RemoteSession,
    T: SnapshotStore + 'static,
{
    /// A disconnected controller. Nothing is loaded until
    /// [`request_connect`](Self::request_connect).
    pub fn new(host: H, session: S, store: Arc<T>, backlog: EventBacklog, config: &ClientConfig) -> Self {
        let rng = config
            .tick
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        let watcher = ProgressWatcher::new(host.stages());
        let last_phase = host.phase();
        Self {
            host,
            session,
            store,
            writer: None,
            backlog,
            rng,
            lifecycle: Lifecycle::Disconnected,
            request: None,
            key: None,
            login_timeout_ms: config.connection.login_timeout_ms,
            config: SessionConfig::default(),
            reconciler: Reconciler::new(),
            allocator: InventoryAllocator::new(),
            traps: TrapDispatcher::new(config.traps.clone()),
            watcher,
            death_link: DeathLink::default(),
            books: BookLedger::default(),
            death_stash: StashSlot::default(),
            connect_stash: StashSlot::default(),
            unsent_checks: Vec::new(),
            goal_pending: false,
            sync_pending: false,
            last_phase,
            sequence: 0,
            dirty: false,
            had_snapshot: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The host game.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The host game, mutably. Used by drivers to simulate play.
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The remote session.
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// The remote session, mutably.
    pub const fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Current lifecycle state.
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Options negotiated at the last login.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The item reconciler.
    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The inventory allocator.
    pub const fn allocator(&self) -> &InventoryAllocator {
        &self.allocator
    }

    /// The trap dispatcher.
    pub const fn traps(&self) -> &TrapDispatcher {
        &self.traps
    }

    /// The progress watcher.
    pub const fn watcher(&self) -> &ProgressWatcher {
        &self.watcher
    }

    /// The death-link coordinator.
    pub const fn death_link(&self) -> &DeathLink {
        &self.death_link
    }

    /// Book hints and prices.
    pub const fn books(&self) -> &BookLedger {
        &self.books
    }

    /// Item held back from a defeat.
    pub const fn death_stash(&self) -> &StashSlot {
        &self.death_stash
    }

    /// Item held back from a (re)connect.
    pub const fn connect_stash(&self) -> &StashSlot {
        &self.connect_stash
    }

    /// Location checks waiting for the server to accept them, oldest first.
    pub fn unsent_checks(&self) -> &[LocationId] {
        &self.unsent_checks
    }

    /// Current tick sequence.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Storage key of the current session, once a connect was requested.
    pub const fn storage_key(&self) -> Option<&StorageKey> {
        self.key.as_ref()
    }

    // -----------------------------------------------------------------------
    // Connect
    // -----------------------------------------------------------------------

    /// Restore persisted state for `connection` and arm the login.
    ///
    /// The login itself happens on the first tick where the host has reached
    /// the map.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Store`] if the snapshot cannot be read. The
    /// controller stays disconnected in that case.
    pub async fn request_connect(&mut self, connection: &ConnectionConfig) -> Result<(), TickError> {
        let key = connection.storage_key();
        info!(%key, "connect requested");

        self.connect_stash.capture(self.host.inventory_mut());
        let live_stash = self.connect_stash.item();

        let stored = self.store.load(&key).await?;
        self.had_snapshot = stored.is_some();
        let snapshot = stored.unwrap_or_default();
        debug!(
            %key,
            found = self.had_snapshot,
            sequence = snapshot.sequence,
            received = snapshot.received_items.len(),
            "snapshot loaded"
        );

        let saved_stash = snapshot.stashed_on_connect;
        self.restore(snapshot);

        // Keep both items if the live hand and the saved stash disagree.
        self.connect_stash = StashSlot::restore(live_stash.or(saved_stash));
        if let (Some(_), Some(extra)) = (live_stash, saved_stash) {
            self.allocator.grant(self.host.inventory_mut(), extra);
        }

        if let Some(old) = self.writer.take() {
            old.close().await;
        }
        self.writer = Some(SnapshotWriter::spawn(Arc::clone(&self.store), key.clone()));

        let request = connection.login_request();
        self.death_link = DeathLink::new(request.slot_name.clone(), false);
        self.request = Some(request);
        self.key = Some(key);
        self.lifecycle = Lifecycle::AwaitingGame;
        self.host.seal();
        Ok(())
    }

    /// Rebuild every component from `snapshot` and project it onto the host.
    fn restore(&mut self, snapshot: Snapshot) {
        let Snapshot {
            sequence,
            received_items,
            stage_status,
            book_hints,
            book_costs,
            stashed_on_death,
            sent_enemy_ids,
            pending_class_swap_items,
            pending_items,
            pending_traps,
            unsent_checks,
            goal_reported,
            host_save,
            ..
        } = snapshot;

        self.reconciler = Reconciler::new();
        self.reconciler.restore(&received_items);
        self.allocator = InventoryAllocator::restore(pending_items, pending_class_swap_items);
        self.traps.restore(&pending_traps);
        self.books = BookLedger::restore(book_hints, book_costs);
        self.death_stash = StashSlot::restore(stashed_on_death);
        self.unsent_checks = unsent_checks;
        self.goal_pending = false;
        self.sync_pending = false;

        if let Some(save) = &host_save {
            self.host.import_save(save);
        }
        self.host.stages_mut().merge(&stage_status);

        let mut fx = Effects {
            host: &mut self.host,
            allocator: &mut self.allocator,
            traps: &mut self.traps,
            rng: &mut self.rng,
        };
        self.reconciler.rebuild(&mut fx);

        self.watcher = ProgressWatcher::new(self.host.stages());
        self.watcher.restore(&sent_enemy_ids, goal_reported);
        self.sequence = self.sequence.max(sequence);
    }

    /// Log in, negotiate options and resend everything already checked.
    async fn login(&mut self) {
        let Some(request) = self.request.clone() else {
            return;
        };
        let timeout = Duration::from_millis(self.login_timeout_ms);
        let result = match tokio::time::timeout(timeout, self.session.login(&request)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(SessionError::Timeout {
                ms: self.login_timeout_ms,
            }),
        };

        match result {
            Ok(config) => self.on_logged_in(config).await,
            Err(e) => self.on_login_failed(&e),
        }
    }

    async fn on_logged_in(&mut self, config: SessionConfig) {
        info!(
            slot = %self.death_link_slot(),
            player_id = config.player_id,
            death_link = config.death_link,
            book_shuffle = config.book_shuffle,
            "logged in"
        );
        self.lifecycle = Lifecycle::Connected;

        self.death_link.set_enabled(config.death_link);
        if config.death_link {
            if let Err(e) = self.session.enable_death_link().await {
                warn!(error = %e, "failed to enable death-link");
            }
            if let Err(e) = self.session.update_tags(&[DEATH_LINK_TAG.to_owned()]).await {
                warn!(error = %e, "failed to update tags");
            }
        }

        let stage_count = self.host.stages().len();
        if self
            .books
            .ensure_costs(config.randomize_book_costs, stage_count, &mut self.rng)
        {
            self.dirty = true;
        }
        self.config = config;
        self.publish_settings();

        // The login replays the whole item stream.
        self.sync_pending = false;

        let locations = self.watcher.resync(self.host.stages(), self.config.book_shuffle);
        debug!(count = locations.len(), "resending checks");
        self.queue_checks(locations);
        if let Err(e) = self.send_unsent_checks().await {
            warn!(error = %e, queued = self.unsent_checks.len(), "failed to resend checks");
        }
        self.goal_pending = self.watcher.goal_reported();
        if let Err(e) = self.send_goal().await {
            warn!(error = %e, "failed to resend goal");
        }

        if !self.had_snapshot {
            self.had_snapshot = true;
            self.dirty = true;
            self.persist();
        }
    }

    fn on_login_failed(&mut self, error: &SessionError) {
        match error {
            SessionError::Unreachable { address, reason } => {
                warn!(%address, %reason, "server unreachable");
            }
            SessionError::Refused { reasons } => {
                for reason in reasons {
                    warn!(%reason, "login refused");
                }
            }
            other => warn!(error = %other, "login failed"),
        }
        self.lifecycle = Lifecycle::Disconnected;
        self.host.set_phase(Phase::TITLE);
    }

    fn death_link_slot(&self) -> &str {
        self.request.as_ref().map_or("", |r| r.slot_name.as_str())
    }

    /// Push multipliers, book prices and book hints to the host.
    fn publish_settings(&mut self) {
        let settings = ModSettings {
            gold_multiplier: self.config.gold_multiplier,
            xp_multiplier: self.config.xp_multiplier,
            drop_multiplier: self.config.drop_multiplier,
            book_cost_mode: self.config.randomize_book_costs,
            book_costs: self.books.costs().clone(),
            book_hints: self.books.hints().clone(),
        };
        self.host.apply_mod_settings(&settings);
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one frame of reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Session`] with the first remote call that failed.
    /// Every phase still ran, and the failed work stays queued for the next
    /// connected tick.
    pub async fn tick(&mut self) -> Result<TickSummary, TickError> {
        self.sequence = self.sequence.saturating_add(1);
        let mut summary = TickSummary {
            sequence: self.sequence,
            ..TickSummary::default()
        };
        let mut failure: Option<SessionError> = None;

        // --- Phase 1: events ---
        for event in self.backlog.drain() {
            summary.events = summary.events.saturating_add(1);
            self.handle_event(event, &mut summary);
        }

        let phase = self.host.phase();
        let previous = std::mem::replace(&mut self.last_phase, phase);
        summary.phase = phase;
        let connected = self.lifecycle == Lifecycle::Connected;

        // --- Phase 2: allocator ---
        let displaced = self.host.take_displaced_equipment();
        if !displaced.is_empty() {
            debug!(count = displaced.len(), "class swap displaced equipment");
            self.allocator.enqueue_class_swap(displaced);
            self.dirty = true;
        }
        if self.allocator.flush(self.host.inventory_mut()) > 0 {
            self.host.seal();
            self.dirty = true;
        }

        // --- Phase 3: traps ---
        if self.traps.observe_phase(phase) > 0 {
            self.dirty = true;
        }
        let fired = self.traps.drain(&mut self.host, &mut self.rng);
        if !fired.is_empty() {
            summary.traps_fired = fired.len();
            self.dirty = true;
        }

        // --- Phase 4: death stash ---
        if phase == Phase::DEFEAT
            && previous != Phase::DEFEAT
            && self.death_stash.capture(self.host.inventory_mut())
        {
            debug!("in-hand item stashed on defeat");
            self.host.seal();
            self.dirty = true;
        }

        // --- Phase 5: progress ---
        let mut checks = self.watcher.observe(self.host.stages(), self.config.book_shuffle);
        let drops = self.host.take_enemy_drops();
        checks.extend(self.watcher.observe_enemy_drops(&drops));
        if !checks.is_empty() {
            if !connected {
                debug!(count = checks.len(), "offline, checks queued for login");
            }
            self.queue_checks(checks.into_iter().map(|c| c.location));
        }
        if connected {
            match self.send_unsent_checks().await {
                Ok(sent) => summary.checks_sent = sent,
                Err(e) => note_failure(&mut failure, "check_locations", e),
            }
        }

        // --- Phase 6: goal ---
        if connected {
            if self
                .watcher
                .check_goal(self.host.stages(), &self.config.goal_stages)
            {
                self.goal_pending = true;
                self.dirty = true;
            }
            if let Err(e) = self.send_goal().await {
                note_failure(&mut failure, "report_goal_complete", e);
            }
        }

        // --- Phase 7: death-link ---
        match self.death_link.on_tick(&mut self.host) {
            DeathLinkAction::Send { cause } if connected => {
                let source = self.death_link_slot().to_owned();
                match self.session.send_death_link(&source, &cause).await {
                    Ok(()) => {
                        info!(%cause, "death sent");
                        self.death_link.confirm_sent();
                    }
                    Err(e) => note_failure(&mut failure, "send_death_link", e),
                }
            }
            DeathLinkAction::Send { .. } => {
                debug!("offline, death not broadcast");
                self.death_link.confirm_sent();
            }
            DeathLinkAction::Applied { source } => {
                debug!(%source, "party killed by death-link");
            }
            DeathLinkAction::None => {}
        }

        // --- Phase 8: stash restore ---
        if phase.is_playable() {
            let inventory = self.host.inventory_mut();
            let restored = self.death_stash.try_restore(inventory)
                | self.connect_stash.try_restore(inventory);
            if restored {
                debug!("stashed item returned to inventory");
                self.host.seal();
                self.dirty = true;
            }
        }

        // --- Phase 9: item resync ---
        if previous == Phase::NEW_GAME && phase == Phase::MAP && connected {
            info!("new game started, requesting full item resync");
            self.sync_pending = true;
        }
        if self.sync_pending && connected {
            match self.session.sync().await {
                Ok(()) => self.sync_pending = false,
                Err(e) => note_failure(&mut failure, "sync", e),
            }
        }

        // --- Phase 10: pending connect ---
        if self.lifecycle == Lifecycle::AwaitingGame && phase.is_session_active() {
            self.login().await;
        }

        // --- Phase 11: shop scouting ---
        if let Some(targets) = self.books.on_phase(phase, self.host.stages())
            && self.lifecycle == Lifecycle::Connected
            && self.config.shop_hints
            && !targets.is_empty()
        {
            debug!(count = targets.len(), "scouting shop books");
            if let Err(e) = self
                .session
                .scout_locations(&targets, HintMode::AnnounceNew)
                .await
            {
                note_failure(&mut failure, "scout_locations", e);
            }
        }

        // --- Phase 12: persist ---
        if self.dirty {
            summary.persisted = self.persist();
        }

        match failure {
            Some(source) => Err(TickError::Session { source }),
            None => Ok(summary),
        }
    }

    fn handle_event(&mut self, event: RemoteEvent, summary: &mut TickSummary) {
        match event {
            RemoteEvent::Connected => debug!("server acknowledged connection"),
            RemoteEvent::ItemsDelivered { batch } => {
                let mut fx = Effects {
                    host: &mut self.host,
                    allocator: &mut self.allocator,
                    traps: &mut self.traps,
                    rng: &mut self.rng,
                };
                let outcome = self.reconciler.apply_batch(&batch, &mut fx);
                summary.items_received = summary.items_received.saturating_add(outcome.first_time);
                self.dirty = true;
                if outcome.gap {
                    info!(start_index = batch.start_index, "gap in item stream, full resync queued");
                    self.sync_pending = true;
                }
            }
            RemoteEvent::LocationInfo { hints } => {
                if self.books.record_hints(&hints) > 0 {
                    self.publish_settings();
                    self.dirty = true;
                }
            }
            RemoteEvent::ConnectionRefused { errors } => {
                self.on_login_failed(&SessionError::Refused { reasons: errors });
            }
            RemoteEvent::Disconnected { reason } => {
                info!(?reason, "disconnected");
                self.lifecycle = Lifecycle::Disconnected;
                self.dirty = true;
            }
            RemoteEvent::DeathReceived { notice } => {
                self.death_link.receive(&notice);
            }
            RemoteEvent::Bounced { tags } => debug!(?tags, "unhandled bounce"),
            RemoteEvent::InvalidPacket { text } => warn!(%text, "server rejected a packet"),
        }
    }

    /// Append `locations` to the outbound queue, skipping any already queued.
    fn queue_checks(&mut self, locations: impl IntoIterator<Item = LocationId>) {
        for location in locations {
            if !self.unsent_checks.contains(&location) {
                self.unsent_checks.push(location);
                self.dirty = true;
            }
        }
    }

    /// Send the whole outbound queue. It is only emptied once the server
    /// accepted it.
    async fn send_unsent_checks(&mut self) -> Result<usize, SessionError> {
        if self.unsent_checks.is_empty() {
            return Ok(0);
        }
        self.session.check_locations(&self.unsent_checks).await?;
        let sent = std::mem::take(&mut self.unsent_checks).len();
        debug!(count = sent, "checks sent");
        self.dirty = true;
        Ok(sent)
    }

    async fn send_goal(&mut self) -> Result<(), SessionError> {
        if !self.goal_pending {
            return Ok(());
        }
        self.session.report_goal_complete().await?;
        self.goal_pending = false;
        info!("goal reported");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Everything persisted for this session, as of now.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            sequence: self.sequence,
            received_items: self.reconciler.received_items(),
            stage_status: self.host.stages().clone(),
            book_hints: self.books.hints().clone(),
            book_costs: self.books.costs().clone(),
            stashed_on_death: self.death_stash.item(),
            stashed_on_connect: self.connect_stash.item(),
            sent_enemy_ids: self.watcher.sent_enemies(),
            pending_class_swap_items: self.allocator.pending_class_swap(),
            pending_items: self.allocator.pending_grants(),
            pending_traps: self.traps.pending_items(),
            unsent_checks: self.unsent_checks.clone(),
            goal_reported: self.watcher.goal_reported(),
            host_save: self.host.export_save(),
        }
    }

    /// Hand the current snapshot to the writer. Returns `false` if no
    /// session key exists yet; the state stays dirty until one does.
    fn persist(&mut self) -> bool {
        let Some(writer) = &self.writer else {
            return false;
        };
        writer.submit(self.snapshot());
        self.dirty = false;
        true
    }

    /// Write a final snapshot, wait for the writer and close the session.
    pub async fn shutdown(&mut self) -> WriterReport {
        let mut report = WriterReport::default();
        if let Some(writer) = self.writer.take() {
            self.sequence = self.sequence.saturating_add(1);
            writer.submit(self.snapshot());
            self.dirty = false;
            report = writer.close().await;
        }
        if self.lifecycle != Lifecycle::Disconnected {
            self.session.disconnect().await;
        }
        self.lifecycle = Lifecycle::Disconnected;
        info!(
            written = report.written,
            stale = report.stale,
            failed = report.failed,
            "session shut down"
        );
        report
    }
}
