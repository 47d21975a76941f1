use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use snafu::ensure;
use tempo_models::{Item, Parent};
use tracing::{debug, info, instrument, warn};

use crate::{
    Result,
    dispatch::{Event, ListenerRegistry},
    engine::{Engine, EngineStatus},
    error::InvalidQueueSnafu,
    library::Library,
    persistence::Restored,
    queue::{Change, ChangeKind, Queue, UpdateInstructions},
};

/// Going to the previous item only happens within this many milliseconds
/// of the start of the current item. Later presses restart the item.
pub const DEFAULT_REWIND_THRESHOLD_MS: u64 = 3_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum RepeatMode {
    #[default]
    None,
    Track,
    All,
}

impl RepeatMode {
    /// Cycles None -> All -> Track -> None.
    pub fn increment(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Loaded,
    Playing,
    Paused,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub status: Status,
    pub position_ms: u64,
    pub repeat_mode: RepeatMode,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == Status::Playing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSettings {
    pub rewind_threshold_ms: u64,
    pub shuffle_by_default: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            rewind_threshold_ms: DEFAULT_REWIND_THRESHOLD_MS,
            shuffle_by_default: false,
        }
    }
}

/// The playback state machine. Sole owner of the queue and transport state;
/// every mutation is dispatched to the registered listeners before the
/// method returns.
pub struct Player {
    queue: Queue,
    parent: Option<Parent>,
    state: PlaybackState,
    engine: Box<dyn Engine>,
    listeners: Arc<ListenerRegistry>,
    settings: PlayerSettings,
    rng: StdRng,
}

impl Player {
    pub fn new(engine: Box<dyn Engine>, settings: PlayerSettings) -> Self {
        Self {
            queue: Queue::new(),
            parent: None,
            state: Default::default(),
            engine,
            listeners: Arc::new(ListenerRegistry::new()),
            settings,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn listeners(&self) -> Arc<ListenerRegistry> {
        self.listeners.clone()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn parent(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn settings(&self) -> PlayerSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: PlayerSettings) {
        self.settings = settings;
    }

    /// Starts a new playback session. `shuffle` falls back to the configured
    /// default.
    #[instrument(skip(self, items, parent))]
    pub fn play_items(
        &mut self,
        items: Vec<Item>,
        parent: Option<Parent>,
        start: usize,
        shuffle: Option<bool>,
    ) -> Result<()> {
        let shuffled = shuffle.unwrap_or(self.settings.shuffle_by_default);
        self.queue.replace(items, start, shuffled, &mut self.rng)?;
        self.parent = parent;
        self.load_current(true);

        debug!(len = self.queue.len(), shuffled, "new playback");
        self.dispatch(Event::NewPlayback {
            queue: self.queue.snapshot(),
            parent: self.parent.clone(),
        });
        self.notify_state();

        Ok(())
    }

    #[instrument(skip(self))]
    pub fn play(&mut self) -> bool {
        match self.state.status {
            Status::Loaded | Status::Paused => {
                self.engine.play();
                self.state.status = Status::Playing;
                self.notify_state();
                true
            }
            Status::Playing | Status::Idle => false,
        }
    }

    #[instrument(skip(self))]
    pub fn pause(&mut self) -> bool {
        if self.state.status != Status::Playing {
            return false;
        }

        self.engine.pause();
        self.state.status = Status::Paused;
        self.notify_state();
        true
    }

    pub fn play_pause(&mut self) -> bool {
        if self.state.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    #[instrument(skip(self))]
    pub fn seek_to(&mut self, position_ms: u64) -> bool {
        if self.state.status == Status::Idle {
            return false;
        }
        let Some(duration_ms) = self.queue.current().map(|item| item.duration_ms) else {
            return false;
        };

        let position_ms = position_ms.min(duration_ms);
        self.engine.seek_to(position_ms);
        self.state.position_ms = position_ms;
        self.notify_state();
        true
    }

    /// Skips forward. Repeat-all wraps at the end, otherwise playback stops
    /// on the last item. Track repeat does not affect explicit skips.
    #[instrument(skip(self))]
    pub fn next(&mut self) -> bool {
        let Some(index) = self.queue.index() else {
            return false;
        };

        if index + 1 < self.queue.len() {
            self.skip_to(index + 1).is_ok()
        } else if self.state.repeat_mode == RepeatMode::All {
            self.skip_to(0).is_ok()
        } else {
            debug!("end of queue, pausing");
            self.pause();
            false
        }
    }

    #[instrument(skip(self))]
    pub fn prev(&mut self) -> bool {
        let Some(index) = self.queue.index() else {
            return false;
        };

        if index > 0 && self.state.position_ms <= self.settings.rewind_threshold_ms {
            self.skip_to(index - 1).is_ok()
        } else {
            self.rewind()
        }
    }

    #[instrument(skip(self))]
    pub fn rewind(&mut self) -> bool {
        if self.state.status == Status::Idle {
            return false;
        }

        self.engine.seek_to(0);
        self.state.position_ms = 0;
        self.notify_state();
        true
    }

    #[instrument(skip(self))]
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.state.repeat_mode = mode;
        self.dispatch(Event::RepeatChanged { mode });
    }

    #[instrument(skip(self))]
    pub fn reorder(&mut self, shuffled: bool) {
        let change = self.queue.set_shuffled(shuffled, &mut self.rng);
        self.dispatch(self.queue_changed(change));
    }

    #[instrument(skip(self))]
    pub fn goto_queue_index(&mut self, index: usize) -> Result<()> {
        self.skip_to(index)
    }

    #[instrument(skip(self))]
    pub fn remove_queue_item(&mut self, index: usize) -> Result<()> {
        let playing = self.state.is_playing();
        let change = self.queue.remove(index)?;
        let song_changed = change.kind == ChangeKind::Song;

        if song_changed {
            self.load_current(playing);
        }

        self.dispatch(self.queue_changed(change));
        if song_changed {
            self.notify_state();
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub fn move_queue_item(&mut self, from: usize, to: usize) -> Result<()> {
        let change = self.queue.move_item(from, to)?;
        self.dispatch(self.queue_changed(change));
        Ok(())
    }

    /// Queues items directly after the current one. Starts a new playback
    /// when nothing is queued.
    #[instrument(skip(self, items))]
    pub fn play_next(&mut self, items: Vec<Item>) -> Result<()> {
        ensure!(!items.is_empty(), InvalidQueueSnafu);

        if self.queue.is_empty() {
            return self.play_items(items, None, 0, None);
        }

        let change = self.queue.insert_after_current(items);
        self.dispatch(self.queue_changed(change));
        Ok(())
    }

    /// Queues items at the end. Starts a new playback when nothing is queued.
    #[instrument(skip(self, items))]
    pub fn add_to_queue(&mut self, items: Vec<Item>) -> Result<()> {
        ensure!(!items.is_empty(), InvalidQueueSnafu);

        if self.queue.is_empty() {
            return self.play_items(items, None, 0, None);
        }

        let change = self.queue.append(items);
        self.dispatch(self.queue_changed(change));
        Ok(())
    }

    /// Applies an engine tick. The engine is authoritative for position and
    /// playing state.
    pub fn reconcile(&mut self, status: EngineStatus) {
        if self.state.status == Status::Idle {
            return;
        }

        self.state.position_ms = status.position_ms;

        if status.ended {
            self.track_finished();
            return;
        }

        if status.is_playing != self.state.is_playing() {
            self.state.status = if status.is_playing {
                Status::Playing
            } else {
                Status::Paused
            };
            self.notify_state();
        }
    }

    pub fn poll_engine(&mut self) {
        let status = self.engine.status();
        self.reconcile(status);
    }

    /// Advances after the current item played to its end.
    #[instrument(skip(self))]
    pub fn track_finished(&mut self) {
        let Some(index) = self.queue.index() else {
            return;
        };

        match self.state.repeat_mode {
            RepeatMode::Track => {
                self.engine.seek_to(0);
                self.engine.play();
                self.state.position_ms = 0;
                self.state.status = Status::Playing;
                self.notify_state();
            }
            _ if index + 1 < self.queue.len() => {
                if let Err(error) = self.skip_to(index + 1) {
                    warn!(%error, "unable to advance to next item");
                }
            }
            RepeatMode::All => {
                if let Err(error) = self.skip_to(0) {
                    warn!(%error, "unable to wrap to first item");
                }
            }
            RepeatMode::None => {
                debug!("queue finished");
                self.engine.pause();
                self.engine.seek_to(0);
                self.state.position_ms = 0;
                self.state.status = Status::Paused;
                self.notify_state();
            }
        }
    }

    /// Re-resolves every queued item against the library, dropping the ones
    /// that no longer exist. Returns whether anything changed.
    #[instrument(skip(self, library))]
    pub fn revalidate(&mut self, library: &dyn Library) -> bool {
        let heap: Vec<Option<Item>> = self
            .queue
            .heap()
            .iter()
            .map(|item| library.find_item(&item.uid))
            .collect();
        let parent = self
            .parent
            .as_ref()
            .and_then(|parent| library.find_parent(&parent.uid));

        let unchanged = parent == self.parent
            && heap
                .iter()
                .zip(self.queue.heap())
                .all(|(new, old)| new.as_ref() == Some(old));
        if unchanged {
            return false;
        }

        let before = self.queue.current().map(|item| item.uid.clone());
        let (queue, dropped) = match Queue::from_parts(
            heap,
            self.queue.order().to_vec(),
            self.queue.index().unwrap_or(0),
            self.queue.is_shuffled(),
        ) {
            Ok(rebuilt) => rebuilt,
            Err(error) => {
                warn!(%error, "unable to rebuild queue from library");
                return false;
            }
        };

        let playing = self.state.is_playing();
        self.queue = queue;
        self.parent = parent;

        let song_changed = self.queue.current().map(|item| item.uid.clone()) != before;
        if song_changed {
            self.load_current(playing);
        }

        info!(dropped, "queue revalidated against library");
        let kind = if song_changed {
            ChangeKind::Song
        } else {
            ChangeKind::Mapping
        };
        self.dispatch(self.queue_changed(Change::new(
            kind,
            UpdateInstructions::Replace { from: 0 },
        )));
        if song_changed {
            self.notify_state();
        }

        true
    }

    /// Installs a restored snapshot without starting playback.
    #[instrument(skip(self, restored))]
    pub fn restore(&mut self, restored: Restored) {
        self.queue = restored.queue;
        self.parent = restored.parent;
        self.state.repeat_mode = restored.repeat_mode;
        self.load_current(false);

        if let Some(duration_ms) = self.queue.current().map(|item| item.duration_ms) {
            let position_ms = restored.position_ms.min(duration_ms);
            self.engine.seek_to(position_ms);
            self.state.position_ms = position_ms;
        }

        info!(len = self.queue.len(), "restored playback");
        self.dispatch(Event::NewPlayback {
            queue: self.queue.snapshot(),
            parent: self.parent.clone(),
        });
        self.dispatch(Event::RepeatChanged {
            mode: self.state.repeat_mode,
        });
        self.notify_state();
    }

    fn skip_to(&mut self, index: usize) -> Result<()> {
        self.queue.goto(index)?;
        let playing = self.state.is_playing();
        self.load_current(playing);

        self.dispatch(self.queue_changed(Change::navigation()));
        self.notify_state();
        Ok(())
    }

    /// Loads the current item from the start. An empty queue goes idle.
    fn load_current(&mut self, play: bool) {
        self.state.position_ms = 0;

        match self.queue.current() {
            Some(item) => {
                self.engine.load(item);
                if play {
                    self.engine.play();
                    self.state.status = Status::Playing;
                } else {
                    self.engine.pause();
                    self.state.status = Status::Loaded;
                }
            }
            None => {
                self.engine.pause();
                self.state.status = Status::Idle;
            }
        }
    }

    fn queue_changed(&self, change: Change) -> Event {
        Event::QueueChanged {
            queue: self.queue.snapshot(),
            change,
        }
    }

    fn notify_state(&self) {
        self.dispatch(Event::StateChanged { state: self.state });
    }

    fn dispatch(&self, event: Event) {
        self.listeners.dispatch(&event);
    }
}
