use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tempo_models::{Item, Parent, Uid};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

use crate::{
    PlaybackState, RepeatMode, Result,
    dispatch::{Event, Listener},
    queue::QueueSnapshot,
};

const ALL_SONGS: &str = "All songs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub bytes: Arc<[u8]>,
    pub mime: String,
}

/// Loads artwork for an item. May be slow; results for items that are no
/// longer current are dropped.
#[async_trait]
pub trait ArtworkResolver: Send + Sync {
    async fn resolve(&self, item: &Item) -> Option<Artwork>;
}

/// Receives every published session. Called with the mirror locked, so it
/// must not call back into the mirror.
pub trait SessionSink: Send + Sync {
    fn update(&self, session: &Session);
}

/// Which extra action the session offers next to the transport buttons.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum SecondaryActionMode {
    Shuffle,
    #[default]
    Repeat,
}

impl SecondaryActionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecondaryActionMode::Shuffle => "shuffle",
            SecondaryActionMode::Repeat => "repeat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "shuffle" => Some(SecondaryActionMode::Shuffle),
            "repeat" => Some(SecondaryActionMode::Repeat),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub secondary_action: SecondaryActionMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub media_id: Uid,
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    /// Name of the parent the queue was started from.
    pub display_description: String,
    pub duration_ms: u64,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub date: Option<String>,
    /// Location of the accepted artwork, filled in by sinks that export it.
    pub art_url: Option<String>,
}

impl SessionMetadata {
    fn new(item: &Item, parent: Option<&Parent>) -> Self {
        Self {
            media_id: item.uid.clone(),
            title: item.title.clone(),
            album: item.album.clone(),
            artist: item.artist_names(),
            album_artist: item.album_artist_names(),
            genre: item.genre_names(),
            display_description: parent
                .map(|parent| parent.name.clone())
                .unwrap_or_else(|| ALL_SONGS.to_string()),
            duration_ms: item.duration_ms,
            track: item.track,
            disc: item.disc,
            date: item.date.clone(),
            art_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQueueItem {
    pub id: u64,
    pub media_id: Uid,
    pub title: String,
    pub subtitle: Option<String>,
}

/// The externally visible projection of the playback session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Session {
    pub metadata: Option<SessionMetadata>,
    pub artwork: Option<Artwork>,
    pub artwork_pending: bool,
    pub queue: Vec<SessionQueueItem>,
    pub active_queue_id: Option<u64>,
    pub playback: PlaybackState,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub secondary_action: SecondaryActionMode,
    /// Bumped whenever the current item changes.
    pub generation: u64,
}

#[derive(Default)]
struct MirrorState {
    session: Session,
    parent: Option<Parent>,
    artwork_uid: Option<Uid>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    handle: Handle,
    resolver: Arc<dyn ArtworkResolver>,
    sink: Arc<dyn SessionSink>,
    state: Mutex<MirrorState>,
}

/// Listener projecting coordinator events onto an external media session.
///
/// Metadata is published as soon as the current item changes. Artwork
/// follows once resolved, unless another item became current in the
/// meantime.
#[derive(Clone)]
pub struct SessionMirror {
    inner: Arc<Inner>,
}

impl SessionMirror {
    pub fn new(
        handle: Handle,
        resolver: Arc<dyn ArtworkResolver>,
        sink: Arc<dyn SessionSink>,
        settings: SessionSettings,
    ) -> Self {
        let state = MirrorState {
            session: Session {
                secondary_action: settings.secondary_action,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            inner: Arc::new(Inner {
                handle,
                resolver,
                sink,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn set_settings(&self, settings: SessionSettings) {
        let mut state = self.lock();
        state.session.secondary_action = settings.secondary_action;
        self.inner.sink.update(&state.session);
    }

    fn lock(&self) -> MutexGuard<'_, MirrorState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn apply_queue(&self, state: &mut MirrorState, queue: &QueueSnapshot) {
        state.session.queue = queue
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| SessionQueueItem {
                id: index as u64,
                media_id: item.uid.clone(),
                title: item.title.clone(),
                subtitle: item.album.clone(),
            })
            .collect();
        state.session.active_queue_id = queue.index.map(|index| index as u64);
        state.session.shuffle = queue.shuffled;

        let current = queue.current();
        state.session.metadata =
            current.map(|item| SessionMetadata::new(item, state.parent.as_ref()));

        if current.map(|item| &item.uid) != state.artwork_uid.as_ref() {
            self.request_artwork(state, current);
        }
    }

    fn request_artwork(&self, state: &mut MirrorState, item: Option<&Item>) {
        if let Some(task) = state.task.take() {
            task.abort();
        }

        state.session.generation += 1;
        state.session.artwork = None;
        state.artwork_uid = item.map(|item| item.uid.clone());

        let Some(item) = item.cloned() else {
            state.session.artwork_pending = false;
            return;
        };

        state.session.artwork_pending = true;
        let generation = state.session.generation;
        let mirror = self.clone();

        debug!(uid = %item.uid, generation, "resolving artwork");
        state.task = Some(self.inner.handle.spawn(async move {
            let artwork = mirror.inner.resolver.resolve(&item).await;
            mirror.complete_artwork(generation, artwork);
        }));
    }

    fn complete_artwork(&self, generation: u64, artwork: Option<Artwork>) {
        let mut state = self.lock();
        if generation != state.session.generation {
            debug!(
                generation,
                latest = state.session.generation,
                "discarding stale artwork"
            );
            return;
        }

        state.session.artwork = artwork;
        state.session.artwork_pending = false;
        state.task = None;
        self.inner.sink.update(&state.session);
    }
}

impl Listener for SessionMirror {
    fn on_event(&self, event: &Event) -> Result<()> {
        let mut state = self.lock();

        match event {
            Event::NewPlayback { queue, parent } => {
                state.parent = parent.clone();
                // Parent changed, so the description must be rebuilt even when
                // the same item stays current.
                self.apply_queue(&mut state, queue);
            }
            Event::QueueChanged { queue, .. } => {
                self.apply_queue(&mut state, queue);
            }
            Event::StateChanged { state: playback } => {
                state.session.playback = *playback;
                state.session.repeat = playback.repeat_mode;
            }
            Event::RepeatChanged { mode } => {
                state.session.repeat = *mode;
                state.session.playback.repeat_mode = *mode;
            }
        }

        self.inner.sink.update(&state.session);
        Ok(())
    }

    fn name(&self) -> &str {
        "session-mirror"
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Status;
    use std::collections::HashMap;
    use tempo_models::ParentKind;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct GatedResolver {
        gates: Mutex<HashMap<Uid, oneshot::Receiver<Artwork>>>,
    }

    impl GatedResolver {
        fn gate(&self, uid: &str) -> oneshot::Sender<Artwork> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(uid.into(), rx);
            tx
        }
    }

    #[async_trait]
    impl ArtworkResolver for GatedResolver {
        async fn resolve(&self, item: &Item) -> Option<Artwork> {
            let gate = self.gates.lock().unwrap().remove(&item.uid)?;
            gate.await.ok()
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Session>>);

    impl SessionSink for RecordingSink {
        fn update(&self, session: &Session) {
            self.0.lock().unwrap().push(session.clone());
        }
    }

    impl RecordingSink {
        fn latest(&self) -> Session {
            self.0.lock().unwrap().last().cloned().unwrap()
        }
    }

    fn artwork(tag: &str) -> Artwork {
        Artwork {
            bytes: tag.as_bytes().into(),
            mime: "image/png".into(),
        }
    }

    fn item(uid: &str) -> Item {
        Item {
            album: Some("Album".into()),
            artists: vec!["One".into(), "Two".into()],
            ..Item::new(uid, uid.to_uppercase(), 60_000)
        }
    }

    fn snapshot(index: usize) -> QueueSnapshot {
        QueueSnapshot {
            items: vec![item("a"), item("b"), item("c")].into(),
            index: Some(index),
            shuffled: false,
        }
    }

    fn mirror() -> (SessionMirror, Arc<GatedResolver>, Arc<RecordingSink>) {
        let resolver = Arc::new(GatedResolver::default());
        let sink = Arc::new(RecordingSink::default());
        let mirror = SessionMirror::new(
            Handle::current(),
            resolver.clone(),
            sink.clone(),
            SessionSettings::default(),
        );
        (mirror, resolver, sink)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn navigate(index: usize) -> Event {
        Event::QueueChanged {
            queue: snapshot(index),
            change: crate::queue::Change::navigation(),
        }
    }

    #[tokio::test]
    async fn publishes_metadata_before_artwork() {
        let (mirror, resolver, sink) = mirror();
        let gate = resolver.gate("a");

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(0),
                parent: None,
            })
            .unwrap();

        let session = sink.latest();
        let metadata = session.metadata.unwrap();
        assert_eq!(metadata.title, "A");
        assert_eq!(metadata.artist.as_deref(), Some("One, Two"));
        assert_eq!(metadata.display_description, "All songs");
        assert!(session.artwork_pending);
        assert_eq!(session.queue.len(), 3);
        assert_eq!(session.active_queue_id, Some(0));

        gate.send(artwork("a")).unwrap();
        settle().await;

        let session = sink.latest();
        assert!(!session.artwork_pending);
        assert_eq!(session.artwork, Some(artwork("a")));
    }

    #[tokio::test]
    async fn slow_artwork_for_previous_item_is_discarded() {
        let (mirror, resolver, sink) = mirror();
        let gate_a = resolver.gate("a");
        let gate_b = resolver.gate("b");

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(0),
                parent: None,
            })
            .unwrap();
        mirror.on_event(&navigate(1)).unwrap();

        gate_b.send(artwork("b")).unwrap();
        settle().await;
        let _ = gate_a.send(artwork("a"));
        settle().await;

        let session = sink.latest();
        assert_eq!(session.metadata.unwrap().title, "B");
        assert_eq!(session.artwork, Some(artwork("b")));
        assert!(
            sink.0
                .lock()
                .unwrap()
                .iter()
                .all(|session| session.artwork != Some(artwork("a")))
        );
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let (mirror, _, sink) = mirror();

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(0),
                parent: None,
            })
            .unwrap();
        mirror.on_event(&navigate(2)).unwrap();
        let latest = mirror.session().generation;
        let published = sink.0.lock().unwrap().len();

        mirror.complete_artwork(latest - 1, Some(artwork("a")));
        assert_eq!(sink.0.lock().unwrap().len(), published);
        assert!(mirror.session().artwork.is_none());

        mirror.complete_artwork(latest, Some(artwork("c")));
        assert_eq!(mirror.session().artwork, Some(artwork("c")));
    }

    #[tokio::test]
    async fn artwork_lands_on_latest_state() {
        let (mirror, resolver, sink) = mirror();
        let gate = resolver.gate("a");

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(0),
                parent: Some(Parent::new("p", ParentKind::Playlist, "Road trip")),
            })
            .unwrap();
        mirror
            .on_event(&Event::StateChanged {
                state: PlaybackState {
                    status: Status::Playing,
                    position_ms: 1_000,
                    repeat_mode: RepeatMode::All,
                },
            })
            .unwrap();
        mirror
            .on_event(&Event::RepeatChanged {
                mode: RepeatMode::Track,
            })
            .unwrap();

        gate.send(artwork("a")).unwrap();
        settle().await;

        let session = sink.latest();
        assert_eq!(session.artwork, Some(artwork("a")));
        assert_eq!(session.playback.status, Status::Playing);
        assert_eq!(session.repeat, RepeatMode::Track);
        assert_eq!(
            session.metadata.unwrap().display_description,
            "Road trip"
        );
    }

    #[tokio::test]
    async fn same_item_does_not_reload_artwork() {
        let (mirror, resolver, sink) = mirror();
        let gate = resolver.gate("a");

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(0),
                parent: None,
            })
            .unwrap();
        gate.send(artwork("a")).unwrap();
        settle().await;
        let generation = mirror.session().generation;

        mirror
            .on_event(&Event::QueueChanged {
                queue: QueueSnapshot {
                    items: vec![item("a"), item("c")].into(),
                    index: Some(0),
                    shuffled: false,
                },
                change: crate::queue::Change::new(
                    crate::queue::ChangeKind::Mapping,
                    crate::queue::UpdateInstructions::Remove { at: 1, size: 1 },
                ),
            })
            .unwrap();

        let session = sink.latest();
        assert_eq!(session.generation, generation);
        assert_eq!(session.artwork, Some(artwork("a")));
        assert_eq!(session.queue.len(), 2);
    }

    #[tokio::test]
    async fn empty_queue_clears_session() {
        let (mirror, _, sink) = mirror();

        mirror
            .on_event(&Event::NewPlayback {
                queue: snapshot(1),
                parent: None,
            })
            .unwrap();
        mirror
            .on_event(&Event::QueueChanged {
                queue: QueueSnapshot::default(),
                change: crate::queue::Change::navigation(),
            })
            .unwrap();

        let session = sink.latest();
        assert!(session.metadata.is_none());
        assert!(!session.artwork_pending);
        assert!(session.queue.is_empty());
        assert_eq!(session.active_queue_id, None);
    }

    #[test]
    fn secondary_action_names() {
        assert_eq!(
            SecondaryActionMode::parse(SecondaryActionMode::Shuffle.as_str()),
            Some(SecondaryActionMode::Shuffle)
        );
        assert_eq!(SecondaryActionMode::parse("sideways"), None);
    }
}
