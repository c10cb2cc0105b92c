//! End-to-end behaviour of the session controller against the in-memory
//! host, a scripted session and the in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::sync::Arc;

use chrono::Utc;
use rangerlink_core::{
    ClientConfig, EventSink, Lifecycle, ScriptedSession, SessionController, event_channel,
};
use rangerlink_reconcile::MemoryHost;
use rangerlink_store::{MemoryStore, SnapshotStore};
use rangerlink_types::{
    DeathNotice, ItemBatch, ItemId, LocationId, Phase, RemoteEvent, SessionConfig, SlotItem,
    Snapshot, StageFlags, StageId,
};

type Controller = SessionController<MemoryHost, ScriptedSession, MemoryStore>;

const SLOT: &str = "Ranger";

fn client_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.connection.slot_name = SLOT.to_owned();
    config.tick.seed = Some(42);
    config
}

fn new_controller(store: &Arc<MemoryStore>, slot: SessionConfig) -> (Controller, EventSink) {
    let (sink, backlog) = event_channel();
    let controller = SessionController::new(
        MemoryHost::default(),
        ScriptedSession::new(slot),
        Arc::clone(store),
        backlog,
        &client_config(),
    );
    (controller, sink)
}

/// A controller that has restored state and logged in on the map.
async fn online(store: &Arc<MemoryStore>, slot: SessionConfig) -> (Controller, EventSink) {
    let (mut controller, sink) = new_controller(store, slot);
    controller
        .request_connect(&client_config().connection)
        .await
        .unwrap();
    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Connected);
    (controller, sink)
}

fn items(start_index: u64, ids: &[i64]) -> RemoteEvent {
    RemoteEvent::ItemsDelivered {
        batch: ItemBatch {
            start_index,
            items: ids.iter().copied().map(ItemId).collect(),
        },
    }
}

fn death_from(source: &str) -> RemoteEvent {
    RemoteEvent::DeathReceived {
        notice: DeathNotice {
            source: source.to_owned(),
            time: Utc::now(),
            cause: None,
        },
    }
}

fn count_item(host: &MemoryHost, item_id: u16) -> usize {
    (0..host.inventory.layout().slot_count)
        .filter(|slot| host.inventory.get(*slot).map(|i| i.item_id) == Some(item_id))
        .count()
}

fn fill_ordinary(host: &mut MemoryHost) {
    for slot in host.inventory.free_ordinary() {
        host.inventory.place(slot, SlotItem::plain(900));
    }
}

// ---------------------------------------------------------------------------
// Item reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn known_id_is_never_granted_twice() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;

    sink.push(items(0, &[12_001]));
    controller.tick().await.unwrap();
    sink.push(items(1, &[12_001]));
    controller.tick().await.unwrap();

    assert_eq!(count_item(controller.host(), 1), 1);
    assert_eq!(controller.reconciler().received_items(), vec![ItemId(12_001)]);
}

#[tokio::test]
async fn reconnect_replay_applies_only_unseen_ids() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;

    sink.push(items(0, &[12_001, 12_002]));
    controller.tick().await.unwrap();
    assert_eq!(count_item(controller.host(), 1), 1);
    assert_eq!(count_item(controller.host(), 2), 1);

    sink.push(items(0, &[12_001, 12_002, 12_005]));
    let summary = controller.tick().await.unwrap();

    assert_eq!(summary.items_received, 1);
    assert_eq!(count_item(controller.host(), 1), 1);
    assert_eq!(count_item(controller.host(), 2), 1);
    assert_eq!(count_item(controller.host(), 5), 1);
}

#[tokio::test]
async fn replay_restores_stage_unlocks_after_reload() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;

    sink.push(items(0, &[11_004]));
    controller.tick().await.unwrap();
    // The host reloaded an older save that predates the unlock.
    controller.host_mut().stages.reset();

    sink.push(items(0, &[11_004]));
    controller.tick().await.unwrap();
    assert!(controller
        .host()
        .stages
        .has(StageId(4), StageFlags::UNLOCKED));
}

// ---------------------------------------------------------------------------
// Inventory allocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_inventory_queues_and_drains_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    fill_ordinary(controller.host_mut());

    sink.push(items(0, &[12_005, 12_006]));
    controller.tick().await.unwrap();
    assert_eq!(controller.allocator().pending_grants().len(), 2);
    assert_eq!(count_item(controller.host(), 5), 0);

    controller.host_mut().inventory.take(30);
    controller.tick().await.unwrap();
    assert_eq!(controller.host().inventory.get(30), Some(SlotItem::plain(5)));
    assert_eq!(count_item(controller.host(), 6), 0);

    controller.host_mut().inventory.take(17);
    controller.tick().await.unwrap();
    assert_eq!(controller.host().inventory.get(17), Some(SlotItem::plain(6)));
    assert!(controller.allocator().is_idle());
}

#[tokio::test]
async fn transient_slot_is_never_allocated() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    fill_ordinary(controller.host_mut());

    sink.push(items(0, &[12_007]));
    controller.tick().await.unwrap();
    let transient = controller.host().inventory.layout().transient;
    assert_eq!(controller.host().inventory.get(transient), None);
}

#[tokio::test]
async fn class_swap_leftovers_are_placed_before_grants() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    fill_ordinary(controller.host_mut());

    sink.push(items(0, &[12_008]));
    controller.host_mut().displaced.push(SlotItem {
        item_id: 77,
        mod1: 3,
        mod2: 1,
    });
    controller.tick().await.unwrap();
    assert_eq!(controller.allocator().pending_class_swap().len(), 1);

    controller.host_mut().inventory.take(20);
    controller.tick().await.unwrap();
    assert_eq!(controller.host().inventory.get(20).map(|i| i.item_id), Some(77));
    assert_eq!(controller.allocator().pending_grants(), vec![SlotItem::plain(8)]);
}

// ---------------------------------------------------------------------------
// Traps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trap_waits_for_active_play() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    controller.host_mut().phase = Phase(2);

    sink.push(items(0, &[13_002]));
    let summary = controller.tick().await.unwrap();
    assert_eq!(summary.traps_fired, 0);
    assert_eq!(controller.traps().pending(), 1);
    assert!(controller.host().party.iter().all(|m| m.is_alive()));

    controller.host_mut().phase = Phase::SHOP;
    let summary = controller.tick().await.unwrap();
    assert_eq!(summary.traps_fired, 1);
    assert_eq!(controller.traps().pending(), 0);
    assert_eq!(
        controller.host().party.iter().filter(|m| !m.is_alive()).count(),
        1
    );
}

#[tokio::test]
async fn defeat_discards_waiting_traps() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    controller.host_mut().gold = 1000;

    sink.push(items(0, &[13_001, 13_001]));
    controller.tick().await.unwrap();
    assert_eq!(controller.traps().pending(), 2);

    controller.host_mut().phase = Phase::DEFEAT;
    controller.tick().await.unwrap();
    assert_eq!(controller.traps().pending(), 0);

    controller.host_mut().phase = Phase::STAGE;
    let summary = controller.tick().await.unwrap();
    assert_eq!(summary.traps_fired, 0);
    assert_eq!(controller.host().gold, 1000);
}

#[tokio::test]
async fn traps_in_active_play_fire_on_arrival() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    controller.host_mut().phase = Phase::STAGE;
    controller.host_mut().gold = 1000;

    sink.push(items(0, &[13_001, 13_001]));
    let summary = controller.tick().await.unwrap();
    assert_eq!(summary.traps_fired, 0);
    assert_eq!(controller.host().gold, 250);
}

// ---------------------------------------------------------------------------
// Progress and goal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_beaten_stage_is_checked_once() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, SessionConfig::default()).await;

    controller.host_mut().stages.mark(StageId(3), StageFlags::BEATEN);
    for _ in 0..3 {
        controller.tick().await.unwrap();
    }
    assert_eq!(controller.session().checks, vec![LocationId(10_003)]);
}

#[tokio::test]
async fn checks_in_one_tick_are_in_stage_order() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, SessionConfig::default()).await;

    controller.host_mut().stages.mark(StageId(5), StageFlags::BEATEN);
    controller.host_mut().stages.mark(StageId(2), StageFlags::BEATEN);
    controller.host_mut().enemy_drops.push(7);
    let summary = controller.tick().await.unwrap();

    assert_eq!(summary.checks_sent, 3);
    assert_eq!(
        controller.session().checks,
        vec![LocationId(10_002), LocationId(10_005), LocationId(10_207)]
    );
}

#[tokio::test]
async fn offline_progress_is_sent_at_login() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = new_controller(&store, SessionConfig::default());
    controller
        .request_connect(&client_config().connection)
        .await
        .unwrap();

    controller.host_mut().stages.mark(StageId(1), StageFlags::BEATEN);
    controller.tick().await.unwrap();
    assert!(controller.session().checks.is_empty());

    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    controller.tick().await.unwrap();
    assert_eq!(controller.session().checks, vec![LocationId(10_001)]);
}

#[tokio::test]
async fn goal_is_reported_once() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, SessionConfig::default()).await;

    controller.host_mut().stages.mark(StageId(88), StageFlags::BEATEN);
    for _ in 0..3 {
        controller.tick().await.unwrap();
    }
    assert_eq!(controller.session().goals, 1);
    assert!(controller.watcher().goal_reported());
}

#[tokio::test]
async fn booked_stage_is_a_check_with_book_shuffle() {
    let store = Arc::new(MemoryStore::new());
    let slot = SessionConfig {
        book_shuffle: true,
        ..SessionConfig::default()
    };
    let (mut controller, _sink) = online(&store, slot).await;

    controller.host_mut().stages.mark(StageId(9), StageFlags::BOOKED);
    controller.tick().await.unwrap();
    assert_eq!(controller.session().checks, vec![LocationId(10_109)]);
}

// ---------------------------------------------------------------------------
// Death-link
// ---------------------------------------------------------------------------

fn death_link_slot() -> SessionConfig {
    SessionConfig {
        death_link: true,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn own_death_echo_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, death_link_slot()).await;
    controller.host_mut().phase = Phase::STAGE;

    sink.push(death_from(SLOT));
    controller.tick().await.unwrap();
    assert!(controller.host().party.iter().all(|m| m.is_alive()));
}

#[tokio::test]
async fn remote_death_kills_party_without_echo() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, death_link_slot()).await;

    sink.push(death_from("Mia"));
    controller.tick().await.unwrap();
    assert!(controller.host().party.iter().all(|m| m.is_alive()));

    controller.host_mut().phase = Phase::STAGE;
    controller.tick().await.unwrap();
    assert!(controller.host().party.iter().all(|m| !m.is_alive()));

    controller.host_mut().phase = Phase::DEFEAT;
    controller.tick().await.unwrap();
    assert!(controller.session().deaths.is_empty());
}

#[tokio::test]
async fn local_defeat_is_sent_once_per_life() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, death_link_slot()).await;

    controller.host_mut().phase = Phase::DEFEAT;
    controller.tick().await.unwrap();
    controller.tick().await.unwrap();
    assert_eq!(
        controller.session().deaths,
        vec![(SLOT.to_owned(), format!("{SLOT} was defeated"))]
    );

    for phase in [Phase::TITLE, Phase::MAP, Phase::STAGE, Phase::DEFEAT] {
        controller.host_mut().phase = phase;
        controller.tick().await.unwrap();
    }
    assert_eq!(controller.session().deaths.len(), 2);
}

// ---------------------------------------------------------------------------
// Stashes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_hand_item_survives_defeat() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, SessionConfig::default()).await;
    let transient = controller.host().inventory.layout().transient;
    let held = SlotItem {
        item_id: 42,
        mod1: 1,
        mod2: 2,
    };
    controller.host_mut().inventory.place(transient, held);

    controller.host_mut().phase = Phase::DEFEAT;
    controller.tick().await.unwrap();
    assert_eq!(controller.death_stash().item(), Some(held));
    assert_eq!(controller.host().inventory.get(transient), None);

    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    assert!(controller.death_stash().is_empty());
    assert_eq!(controller.host().inventory.get(16), Some(held));
}

// ---------------------------------------------------------------------------
// Connection failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refused_login_returns_to_title() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = new_controller(&store, SessionConfig::default());
    controller.session_mut().refuse = Some(vec!["InvalidPassword".to_owned()]);
    controller
        .request_connect(&client_config().connection)
        .await
        .unwrap();

    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Disconnected);
    assert_eq!(controller.host().phase, Phase::TITLE);

    controller
        .request_connect(&client_config().connection)
        .await
        .unwrap();
    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Connected);
}

#[tokio::test]
async fn unreachable_server_returns_to_title() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = new_controller(&store, SessionConfig::default());
    controller.session_mut().unreachable = true;
    controller
        .request_connect(&client_config().connection)
        .await
        .unwrap();

    controller.host_mut().phase = Phase::MAP;
    controller.tick().await.unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Disconnected);
    assert_eq!(controller.host().phase, Phase::TITLE);
}

#[tokio::test]
async fn refusal_event_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    sink.push(RemoteEvent::ConnectionRefused {
        errors: vec!["InvalidSlot".to_owned()],
    });
    controller.tick().await.unwrap();
    assert_eq!(controller.lifecycle(), Lifecycle::Disconnected);
    assert_eq!(controller.host().phase, Phase::TITLE);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_round_trip_restores_state() {
    let store = Arc::new(MemoryStore::new());
    let (mut first, sink) = online(&store, SessionConfig::default()).await;

    sink.push(items(0, &[11_002, 12_003, 14_001]));
    first.tick().await.unwrap();
    first.host_mut().stages.mark(StageId(2), StageFlags::BEATEN);
    first.host_mut().save = Some("host-save-v1".to_owned());
    let transient = first.host().inventory.layout().transient;
    first.host_mut().inventory.place(transient, SlotItem::plain(55));
    first.host_mut().phase = Phase::DEFEAT;
    first.tick().await.unwrap();
    first.shutdown().await;

    let (mut second, _sink) = new_controller(&store, SessionConfig::default());
    second
        .request_connect(&client_config().connection)
        .await
        .unwrap();

    assert_eq!(
        second.reconciler().received_items(),
        first.reconciler().received_items()
    );
    assert_eq!(second.host().stages, first.host().stages);
    assert_eq!(second.death_stash().item(), Some(SlotItem::plain(55)));
    assert_eq!(second.host().imported, vec!["host-save-v1".to_owned()]);
    assert!(!second.host().classes.is_empty());
}

#[tokio::test]
async fn queues_survive_a_restart() {
    let store = Arc::new(MemoryStore::new());
    let (mut first, sink) = online(&store, SessionConfig::default()).await;
    fill_ordinary(first.host_mut());
    sink.push(items(0, &[12_010, 13_003]));
    first.tick().await.unwrap();
    first.shutdown().await;

    let (mut second, _sink) = new_controller(&store, SessionConfig::default());
    second
        .request_connect(&client_config().connection)
        .await
        .unwrap();
    assert_eq!(second.allocator().pending_grants(), vec![SlotItem::plain(10)]);
    assert_eq!(second.traps().pending_items(), vec![ItemId(13_003)]);
}

#[tokio::test]
async fn first_login_writes_initial_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, _sink) = online(&store, SessionConfig::default()).await;
    controller.shutdown().await;
    let key = client_config().connection.storage_key();
    assert!(store.load(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn sequence_continues_past_stored_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let key = client_config().connection.storage_key();
    store
        .save(
            &key,
            &Snapshot {
                sequence: 500,
                received_items: vec![ItemId(12_001)],
                ..Snapshot::default()
            },
        )
        .await
        .unwrap();

    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    sink.push(items(0, &[12_001, 12_002]));
    controller.tick().await.unwrap();
    assert_eq!(count_item(controller.host(), 1), 0);
    let report = controller.shutdown().await;

    assert_eq!(report.stale, 0);
    let stored = store.load(&key).await.unwrap().unwrap();
    assert!(stored.sequence > 500);
    assert_eq!(stored.received_items, vec![ItemId(12_001), ItemId(12_002)]);
}

// ---------------------------------------------------------------------------
// Failed remote calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batches_behind_a_failed_sync_are_applied() {
    let store = Arc::new(MemoryStore::new());
    let (mut controller, sink) = online(&store, SessionConfig::default()).await;
    controller.session_mut().fail_sync = 1;
    sink.push(items(3, &[12_001]));
    sink.push(items(4, &[12_005]));
    sink.push(death_from("Mia"));

    assert!(controller.tick().await.is_err());
    assert_eq!(count_item(controller.host(), 1), 1);
    assert_eq!(count_item(controller.host(), 5), 1);

    controller.tick().await.unwrap();
    assert_eq!(controller.session().syncs, 1);
}

#[tokio::test]
async fn unsent_checks_survive_a_restart() {
    let store = Arc::new(MemoryStore::new());
    let (mut first, _sink) = online(&store, SessionConfig::default()).await;
    first.session_mut().fail_checks = 1;
    first.host_mut().stages.mark(StageId(3), StageFlags::BEATEN);
    assert!(first.tick().await.is_err());
    first.shutdown().await;
    assert!(first.session().checks.is_empty());

    let key = client_config().connection.storage_key();
    let stored = store.load(&key).await.unwrap().unwrap();
    assert_eq!(stored.unsent_checks, vec![LocationId(10_003)]);

    let (second, _sink) = online(&store, SessionConfig::default()).await;
    assert_eq!(second.session().checks, vec![LocationId(10_003)]);
    assert!(second.unsent_checks().is_empty());
}
