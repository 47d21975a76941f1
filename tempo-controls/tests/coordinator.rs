use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rand::{SeedableRng, rngs::StdRng};
use tempo_controls::{
    ChangeKind, Controls, Coordinator, Event, Listener, Player, PlayerSettings, RepeatMode,
    Result, Status,
    engine::SimulatedEngine,
    library::{MemoryLibrary, ParentEntry},
    persistence::{self, MemoryStore, Store},
    queue_view::QueueView,
    session::{Artwork, ArtworkResolver, Session, SessionMirror, SessionSettings, SessionSink},
};
use tempo_models::{Item, Parent, ParentKind};
use tokio::{runtime::Handle, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder(Mutex<Vec<Event>>);

impl Listener for Recorder {
    fn on_event(&self, event: &Event) -> Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl Recorder {
    fn queue_changes(&self) -> Vec<ChangeKind> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::QueueChanged { change, .. } => Some(change.kind),
                _ => None,
            })
            .collect()
    }
}

fn library() -> MemoryLibrary {
    let items: Vec<Item> = (0..5)
        .map(|i| Item {
            album: Some("Record".into()),
            ..Item::new(format!("song-{i}"), format!("Song {i}"), 240_000)
        })
        .collect();
    let parent = ParentEntry {
        parent: Parent::new("record", ParentKind::Album, "Record"),
        items: items.iter().map(|item| item.uid.clone()).collect(),
    };
    MemoryLibrary::new(items, vec![parent])
}

fn player() -> Player {
    Player::new(Box::new(SimulatedEngine::new()), PlayerSettings::default())
        .with_rng(StdRng::seed_from_u64(21))
}

fn start(player: Player) -> (Controls, Coordinator) {
    let (coordinator, controls) = Coordinator::new(player);
    (controls, coordinator.with_tick(Duration::from_secs(3600)))
}

/// Waits until every command sent before it has been handled.
async fn sync(controls: &Controls) {
    assert!(!controls.goto_queue_index(usize::MAX).await);
}

#[tokio::test]
async fn next_at_end_with_repeat_all_wraps_to_start() {
    let library = library();
    let player = player();
    let recorder = Arc::new(Recorder::default());
    player.listeners().add(recorder.clone());

    let (controls, coordinator) = start(player);
    let mut queue = coordinator.queue_receiver();
    let handle = tokio::spawn(coordinator.run());

    let (parent, items) = library.parent_items(&"record".into()).unwrap();
    controls
        .play_items(items[..3].to_vec(), Some(parent), 2, Some(false))
        .await
        .unwrap();
    controls.set_repeat_mode(RepeatMode::All);
    controls.next();
    sync(&controls).await;

    let snapshot = timeout(WAIT, queue.wait_for(|queue| queue.index == Some(0)))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.current().unwrap().uid.as_str(), "song-0");
    assert_eq!(recorder.queue_changes(), vec![ChangeKind::Song]);

    controls.quit();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn stale_index_commands_report_failure() {
    let library = library();
    let (controls, coordinator) = start(player());
    let mut state = coordinator.state_receiver();
    let handle = tokio::spawn(coordinator.run());

    assert!(!controls.remove_queue_item(0).await);

    controls
        .play_items(library.items().to_vec(), None, 0, Some(false))
        .await
        .unwrap();
    assert!(controls.move_queue_item(0, 4).await);
    assert!(!controls.move_queue_item(0, 5).await);
    assert!(controls.goto_queue_index(1).await);

    for _ in 0..5 {
        assert!(controls.remove_queue_item(0).await);
    }
    assert!(!controls.remove_queue_item(0).await);

    let state = timeout(WAIT, state.wait_for(|state| state.status == Status::Idle))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(state.position_ms, 0);

    controls.quit();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn play_items_rejects_empty_queue() {
    let (controls, coordinator) = start(player());
    let handle = tokio::spawn(coordinator.run());

    assert!(matches!(
        controls.play_items(vec![], None, 0, None).await,
        Err(tempo_controls::Error::InvalidQueue)
    ));

    controls.quit();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn saved_session_restores_after_restart() {
    let library = library();
    let store = Arc::new(MemoryStore::new());

    let (controls, coordinator) = start(player());
    let saver = tokio::spawn(persistence::store_state_loop(
        store.clone(),
        coordinator.snapshot_receiver(),
    ));
    let handle = tokio::spawn(coordinator.run());

    let (parent, items) = library.parent_items(&"record".into()).unwrap();
    controls
        .play_items(items, Some(parent.clone()), 1, Some(true))
        .await
        .unwrap();
    controls.set_repeat_mode(RepeatMode::Track);
    assert!(controls.move_queue_item(3, 1).await);
    controls.quit();
    handle.await.unwrap().unwrap();
    saver.await.unwrap();

    let restored = persistence::load(store.as_ref(), &library).await.unwrap();
    assert_eq!(restored.dropped, 0);
    assert_eq!(restored.repeat_mode, RepeatMode::Track);
    assert_eq!(restored.parent, Some(parent));
    assert!(restored.queue.is_shuffled());
    assert_eq!(restored.queue.current().unwrap().uid.as_str(), "song-1");

    let recorder = Arc::new(Recorder::default());
    let mut player = player();
    player.listeners().add(recorder.clone());
    player.restore(restored);

    assert_eq!(player.state().status, Status::Loaded);
    let events = recorder.0.lock().unwrap();
    assert!(matches!(events[0], Event::NewPlayback { .. }));
    assert!(matches!(
        events[1],
        Event::RepeatChanged {
            mode: RepeatMode::Track
        }
    ));
}

#[tokio::test]
async fn corrupt_saved_session_starts_empty() {
    let library = library();
    let store = MemoryStore::new();
    store
        .set(persistence::SNAPSHOT_KEY, b"{\"version\":1".to_vec())
        .await
        .unwrap();

    assert!(persistence::load(&store, &library).await.is_none());
}

#[tokio::test]
async fn library_change_drops_missing_items() {
    let mut library = library();
    let (controls, coordinator) = start(player());
    let mut queue = coordinator.queue_receiver();
    let handle = tokio::spawn(coordinator.run());

    controls
        .play_items(library.items().to_vec(), None, 2, Some(false))
        .await
        .unwrap();

    library.remove_item(&"song-2".into());
    controls.library_changed(Arc::new(library));
    sync(&controls).await;

    let snapshot = timeout(WAIT, queue.wait_for(|queue| queue.len() == 4))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.current().unwrap().uid.as_str(), "song-3");

    controls.quit();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn queue_view_attached_to_loaded_player_tracks_edits() {
    let library = library();
    let mut player = player();
    player
        .play_items(library.items().to_vec(), None, 3, Some(false))
        .unwrap();

    let (controls, coordinator) = start(player);
    let view = Arc::new(QueueView::with_queue(
        controls.clone(),
        &coordinator.player().queue().snapshot(),
    ));
    coordinator.player().listeners().add(view.clone());
    let handle = tokio::spawn(coordinator.run());

    assert_eq!(view.items().len(), 5);
    assert_eq!(view.index(), Some(3));

    assert!(view.remove(0).await);
    assert_eq!(view.items().len(), 4);
    assert_eq!(view.index(), Some(2));
    assert_eq!(view.take_instructions().len(), 1);

    assert!(!view.remove(4).await);
    assert!(view.goto(0).await);
    assert_eq!(view.take_scroll_to(), Some(0));

    controls.quit();
    handle.await.unwrap().unwrap();
}

struct InstantResolver;

#[async_trait]
impl ArtworkResolver for InstantResolver {
    async fn resolve(&self, item: &Item) -> Option<Artwork> {
        Some(Artwork {
            bytes: item.uid.as_str().as_bytes().into(),
            mime: "image/jpeg".into(),
        })
    }
}

#[derive(Default)]
struct LatestSession(Mutex<Option<Session>>);

impl SessionSink for LatestSession {
    fn update(&self, session: &Session) {
        *self.0.lock().unwrap() = Some(session.clone());
    }
}

#[tokio::test]
async fn session_mirror_follows_navigation() {
    let library = library();
    let player = player();
    let sink = Arc::new(LatestSession::default());
    let mirror = SessionMirror::new(
        Handle::current(),
        Arc::new(InstantResolver),
        sink.clone(),
        SessionSettings::default(),
    );
    player.listeners().add(Arc::new(mirror.clone()));

    let (controls, coordinator) = start(player);
    let handle = tokio::spawn(coordinator.run());

    controls
        .play_items(library.items().to_vec(), None, 0, Some(false))
        .await
        .unwrap();
    controls.next();
    controls.next();
    sync(&controls).await;

    let session = timeout(WAIT, async {
        loop {
            let session = mirror.session();
            if !session.artwork_pending {
                return session;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let metadata = session.metadata.unwrap();
    assert_eq!(metadata.title, "Song 2");
    assert_eq!(metadata.display_description, "All songs");
    assert_eq!(session.active_queue_id, Some(2));
    assert_eq!(session.artwork.unwrap().bytes.as_ref(), b"song-2");
    assert_eq!(sink.0.lock().unwrap().as_ref().unwrap().active_queue_id, Some(2));

    controls.quit();
    handle.await.unwrap().unwrap();
}
