use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use snafu::ensure;
use tempo_models::{Parent, Uid};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    error::{CorruptSnapshotSnafu, StaleReferenceSnafu},
    library::Library,
    player::{Player, RepeatMode},
    queue::Queue,
};

pub const SNAPSHOT_KEY: &str = "playback_snapshot";

const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of the playback session. Items are stored by identifier
/// only and resolved against the library on restore.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
struct Snapshot {
    version: u32,
    heap: Vec<Uid>,
    order: Vec<usize>,
    index: usize,
    shuffled: bool,
    repeat_mode: RepeatMode,
    position_ms: u64,
    parent: Option<Uid>,
}

/// Session state rebuilt from a snapshot, ready to be handed to
/// [`Player::restore`].
#[derive(Debug, Clone)]
pub struct Restored {
    pub queue: Queue,
    pub parent: Option<Parent>,
    pub repeat_mode: RepeatMode,
    pub position_ms: u64,
    /// Entries that no longer resolve in the library.
    pub dropped: usize,
}

pub fn snapshot(player: &Player) -> Result<Vec<u8>> {
    let queue = player.queue();
    let state = player.state();

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        heap: queue.heap().iter().map(|item| item.uid.clone()).collect(),
        order: queue.order().to_vec(),
        index: queue.index().unwrap_or(0),
        shuffled: queue.is_shuffled(),
        repeat_mode: state.repeat_mode,
        position_ms: state.position_ms,
        parent: player.parent().map(|parent| parent.uid.clone()),
    };

    Ok(serde_json::to_vec(&snapshot)?)
}

pub fn restore(bytes: &[u8], library: &dyn Library) -> Result<Restored> {
    let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(|error| {
        Error::CorruptSnapshot {
            reason: error.to_string(),
        }
    })?;

    ensure!(
        snapshot.version == SNAPSHOT_VERSION,
        CorruptSnapshotSnafu {
            reason: format!("unsupported snapshot version {}", snapshot.version),
        }
    );

    let heap: Vec<_> = snapshot
        .heap
        .iter()
        .map(|uid| library.find_item(uid))
        .collect();

    let missing = heap.iter().filter(|item| item.is_none()).count();
    ensure!(
        heap.is_empty() || missing < heap.len(),
        StaleReferenceSnafu { missing }
    );

    let saved_current = snapshot
        .order
        .get(snapshot.index)
        .and_then(|&entry| snapshot.heap.get(entry))
        .cloned();

    let (queue, dropped) =
        Queue::from_parts(heap, snapshot.order, snapshot.index, snapshot.shuffled)?;

    // A successor standing in for a missing item starts from the top.
    let current_survived = queue.current().map(|item| &item.uid) == saved_current.as_ref();
    let position_ms = if current_survived {
        snapshot.position_ms
    } else {
        0
    };
    let parent = snapshot
        .parent
        .as_ref()
        .and_then(|uid| library.find_parent(uid));

    Ok(Restored {
        queue,
        parent,
        repeat_mode: snapshot.repeat_mode,
        position_ms,
        dropped,
    })
}

/// Key value storage for snapshots.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Loads the last saved session. Any failure starts from an empty queue.
pub async fn load(store: &dyn Store, library: &dyn Library) -> Option<Restored> {
    let bytes = match store.get(SNAPSHOT_KEY).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(error) => {
            warn!(%error, "unable to read saved session");
            return None;
        }
    };

    match restore(&bytes, library) {
        Ok(restored) => {
            if restored.dropped > 0 {
                info!(dropped = restored.dropped, "saved session had missing items");
            }
            Some(restored)
        }
        Err(error) => {
            warn!(%error, "discarding saved session");
            None
        }
    }
}

/// Writes every new snapshot to the store until the sender is dropped.
pub async fn store_state_loop(
    store: Arc<dyn Store>,
    mut receiver: watch::Receiver<Option<Arc<Vec<u8>>>>,
) {
    while receiver.changed().await.is_ok() {
        let Some(bytes) = receiver.borrow_and_update().clone() else {
            continue;
        };

        match store.set(SNAPSHOT_KEY, bytes.to_vec()).await {
            Ok(()) => debug!(len = bytes.len(), "session saved"),
            Err(error) => warn!(%error, "unable to save session"),
        }
    }
}
