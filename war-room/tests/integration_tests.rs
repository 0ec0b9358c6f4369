// Integration tests for the draft room.
//
// These tests exercise the library crate's public API end-to-end: a shared
// SQLite store seeded from a CSV export, several draft sessions acting as
// separate clients, reconciliation between them, and roster placement.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use war_room::draft::clock::PickClock;
use war_room::draft::ledger::{Ledger, Rotation};
use war_room::draft::pool::{load_csv_from_reader, Item};
use war_room::draft::position::Eligibility;
use war_room::draft::queue::Queue;
use war_room::draft::reconcile::Reconciled;
use war_room::draft::roster::{owned_items, Assignments, AssignmentError, SlotDef};
use war_room::draft::session::{Confirmation, DraftSession, Mode, SelectError, Selection};
use war_room::llm::client::LlmClient;
use war_room::llm::commentary::{AnalysisRecord, CommentaryTrigger, ANALYSIS_UNAVAILABLE};
use war_room::store::{DraftStore, SqliteStore, StoreError};

use tokio::sync::mpsc;

// ===========================================================================
// Test helpers
// ===========================================================================

const POOL_CSV: &str = "\
ESPN PlayerID,Player,Position,Team,ADP,Availability,ZIPSR,ZIPSHR,ZIPSRBI,ZIPSSB,ZIPSOBP,ZIPSK,ZIPSQS,ZIPSERA,ZIPSWHIP,ZIPSSV+HDs
33192,Aaron Judge,OF,NYY,1.5,Available,110,45,115,8,.410,,,,,
42404,Bobby Witt Jr.,SS,KC,2.1,Available,105,28,95,35,.355,,,,,
42409,Tarik Skubal,SP,DET,8.0,Available,,,,,,230,20,2.75,0.95,0
39832,Pete Alonso,\"1B,DH\",NYM,40.2,,85,36,105,2,.330,,,,,
";

fn pool_items() -> Vec<Item> {
    load_csv_from_reader(POOL_CSV.as_bytes()).unwrap()
}

fn owners() -> Vec<String> {
    vec!["Alex".to_string(), "Blake".to_string()]
}

/// Fresh on-disk store path, so several `SqliteStore`s can share it the way
/// separate clients would.
fn store_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("war_room_it_{name}_{}.db", std::process::id()));
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
    path
}

/// Seed a store with the CSV pool and a linear two-owner ledger
/// (Alex, Blake, Alex, Blake).
fn seeded_store(path: &PathBuf) -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());
    let ledger = Ledger::generate(&owners(), 2, Rotation::Linear);
    assert!(store.seed(&pool_items(), &ledger).unwrap());
    store
}

async fn client(
    store: Arc<SqliteStore>,
    mode: Mode,
) -> (DraftSession, mpsc::Receiver<AnalysisRecord>) {
    let (tx, rx) = mpsc::channel(16);
    let commentary = CommentaryTrigger::new(Arc::new(LlmClient::Disabled), tx);
    let session = DraftSession::from_store(
        store as Arc<dyn DraftStore>,
        mode,
        Queue::new(),
        PickClock::new(Duration::from_secs(60)),
        commentary,
    )
    .await
    .unwrap();
    (session, rx)
}

async fn draft(session: &mut DraftSession, item: u64, acting: &str) -> Result<Selection, SelectError> {
    session.select(item, acting, &mut Confirmation::Accept).await
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[tokio::test]
async fn turn_order_alternates_between_owners() {
    let path = store_path("turns");
    let store = seeded_store(&path);
    let (mut session, _rx) = client(store.clone(), Mode::Live).await;

    assert!(matches!(draft(&mut session, 33192, "Alex").await, Ok(Selection::Drafted(_))));

    // Alex may not take Blake's pick.
    match draft(&mut session, 42404, "Alex").await {
        Err(SelectError::TurnViolation { acting, owner }) => {
            assert_eq!(acting, "Alex");
            assert_eq!(owner, "Blake");
        }
        other => panic!("expected a turn violation, got {other:?}"),
    }

    assert!(matches!(draft(&mut session, 42404, "Blake").await, Ok(Selection::Drafted(_))));
    match draft(&mut session, 42409, "Alex").await {
        Ok(Selection::Drafted(pick)) => {
            assert_eq!(pick.pick_number, 3);
            assert_eq!(pick.round, 2);
        }
        other => panic!("expected pick 3 to bind, got {other:?}"),
    }
    assert_eq!(session.current_pick().map(|p| p.pick_number), Some(4));

    // The shared store saw every write.
    let picks = store.load_picks().await.unwrap();
    let bound: Vec<Option<u64>> = picks.iter().map(|p| p.item_id).collect();
    assert_eq!(bound, vec![Some(33192), Some(42404), Some(42409), None]);
    let items = store.load_items().await.unwrap();
    let skubal = items.iter().find(|i| i.id == 42409).unwrap();
    assert_eq!(skubal.availability.owner(), Some("Alex"));
}

#[tokio::test]
async fn racing_clients_same_item_second_is_unavailable() {
    let path = store_path("race_same");
    let store_a = seeded_store(&path);
    let store_b = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());

    // Two devices logged in as Alex, both looking at an open pick 1.
    let (mut first_device, _rx_a) = client(store_a, Mode::Live).await;
    let (mut second_device, _rx_b) = client(store_b, Mode::Live).await;

    assert!(matches!(draft(&mut first_device, 33192, "Alex").await, Ok(Selection::Drafted(_))));
    match draft(&mut second_device, 33192, "Alex").await {
        Err(SelectError::ItemUnavailable { item, owner }) => {
            assert_eq!(item, "Aaron Judge");
            assert_eq!(owner, "Alex");
        }
        other => panic!("expected ItemUnavailable, got {other:?}"),
    }

    // The refusal already brought the second device up to date.
    assert_eq!(second_device.ledger().get(1).unwrap().item_id, Some(33192));
    assert_eq!(second_device.current_pick().map(|p| p.pick_number), Some(2));
    assert_eq!(second_device.sweep().await.unwrap().bound, 0);
    assert!(matches!(
        draft(&mut second_device, 42404, "Blake").await,
        Ok(Selection::Drafted(_))
    ));
}

#[tokio::test]
async fn stale_client_cannot_bind_a_taken_pick() {
    let path = store_path("race");
    let store_a = seeded_store(&path);
    let store_b = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());

    let (mut alex, _rx_a) = client(store_a, Mode::Live).await;
    let (mut second_device, _rx_b) = client(store_b.clone(), Mode::Live).await;

    assert!(matches!(draft(&mut alex, 33192, "Alex").await, Ok(Selection::Drafted(_))));

    // The second client still sees pick 1 open; the store refuses it.
    match draft(&mut second_device, 42404, "Alex").await {
        Err(SelectError::StoreWriteFailure(StoreError::AlreadyBound(1))) => {}
        other => panic!("expected AlreadyBound, got {other:?}"),
    }
    assert_eq!(second_device.pool().owner_of(33192), Some("Alex"));
    assert!(second_device.pool().is_available(42404));

    // The store itself never lets one item sit on two picks.
    assert_eq!(
        store_b.update_pick(2, 33192, "Aaron Judge").await,
        Err(StoreError::ItemTaken(33192))
    );

    match draft(&mut second_device, 33192, "Blake").await {
        Err(SelectError::ItemUnavailable { owner, .. }) => assert_eq!(owner, "Alex"),
        other => panic!("expected ItemUnavailable, got {other:?}"),
    }
    assert!(matches!(
        draft(&mut second_device, 42404, "Blake").await,
        Ok(Selection::Drafted(_))
    ));
}

#[tokio::test]
async fn repeated_notifications_generate_one_commentary() {
    let path = store_path("notify");
    let store_a = seeded_store(&path);
    let store_b = Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap());

    let (mut writer, _rx_a) = client(store_a.clone(), Mode::Live).await;
    let (mut watcher, mut rx_b) = client(store_b, Mode::Live).await;

    draft(&mut writer, 42409, "Alex").await.unwrap();
    let pick = store_a.load_picks().await.unwrap().remove(0);

    match watcher.apply_notification(pick.clone()).unwrap() {
        Reconciled::Bound(resolved) => assert_eq!(resolved.item.name, "Tarik Skubal"),
        other => panic!("expected Bound, got {other:?}"),
    }
    assert_eq!(watcher.apply_notification(pick.clone()).unwrap(), Reconciled::Unchanged);
    assert_eq!(watcher.sweep().await.unwrap().bound, 0);

    let record = rx_b.recv().await.unwrap();
    assert_eq!(record.pick_number, 1);
    assert_eq!(record.text, ANALYSIS_UNAVAILABLE);
    assert!(tokio::time::timeout(Duration::from_millis(100), rx_b.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn simulated_session_never_writes_to_the_store() {
    let path = store_path("simulated");
    let store = seeded_store(&path);
    let (mut sim, _rx) = client(store.clone(), Mode::Simulated).await;

    // Any participant may act in a simulation.
    assert!(matches!(draft(&mut sim, 33192, "Blake").await, Ok(Selection::Drafted(_))));
    assert!(matches!(draft(&mut sim, 42404, "Alex").await, Ok(Selection::Drafted(_))));
    assert_eq!(sim.ledger().bound_picks().count(), 2);

    let picks = store.load_picks().await.unwrap();
    assert!(picks.iter().all(|p| p.item_id.is_none()));
    assert!(store.load_items().await.unwrap().iter().all(|i| i.is_available()));
}

#[tokio::test]
async fn multi_position_item_fits_either_slot() {
    let path = store_path("slots");
    let store = seeded_store(&path);
    let (mut session, _rx) = client(store, Mode::Simulated).await;
    draft(&mut session, 39832, "Alex").await.unwrap();
    draft(&mut session, 42404, "Blake").await.unwrap();
    draft(&mut session, 33192, "Alex").await.unwrap();

    let slot = |id: &str, eligible: &[&str]| SlotDef {
        id: id.to_string(),
        label: id.to_string(),
        eligibility: Eligibility::from_config(
            &eligible.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        )
        .unwrap(),
    };
    let slots = vec![slot("1B", &["1B"]), slot("OF1", &["OF"])];
    let owned = owned_items(session.ledger(), session.pool(), "Alex").unwrap();
    assert_eq!(owned.len(), 2);

    let mut assignments = Assignments::default();
    assert!(matches!(
        assignments.assign(&slots, &owned, "OF1", 39832),
        Err(AssignmentError::Ineligible { .. })
    ));
    assert_eq!(assignments.assign(&slots, &owned, "1B", 39832), Ok(None));
    assert_eq!(assignments.assign(&slots, &owned, "OF1", 33192), Ok(None));
    assert!(matches!(
        assignments.assign(&slots, &owned, "1B", 42404),
        Err(AssignmentError::NotOwned(42404))
    ));
    assert_eq!(assignments.occupant("1B"), Some(39832));
}
