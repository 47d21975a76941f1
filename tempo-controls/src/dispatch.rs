use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tempo_models::Parent;
use tracing::warn;

use crate::{
    Error, PlaybackState, RepeatMode, Result,
    queue::{Change, QueueSnapshot},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    QueueChanged {
        queue: QueueSnapshot,
        change: Change,
    },
    NewPlayback {
        queue: QueueSnapshot,
        parent: Option<Parent>,
    },
    StateChanged {
        state: PlaybackState,
    },
    RepeatChanged {
        mode: RepeatMode,
    },
}

/// A consumer of coordinator events.
///
/// Callbacks run on the writer's thread of control, so they must return
/// quickly and hand long work off to a task.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Event) -> Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<(ListenerId, Arc<dyn Listener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(other, _)| *other != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delivers an event to every listener in registration order.
    ///
    /// The set is copied before delivery, so listeners may add or remove
    /// listeners from inside their callback. Changes apply from the next event.
    pub fn dispatch(&self, event: &Event) {
        let listeners: Vec<Arc<dyn Listener>> = self
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if let Err(error) = deliver(listener.as_ref(), event) {
                warn!(%error, "listener failed, continuing delivery");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<dyn Listener>)>> {
        match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn deliver(listener: &dyn Listener, event: &Event) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(Error::ListenerFailure {
            listener: listener.name().to_string(),
            message: error.to_string(),
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());

            Err(Error::ListenerFailure {
                listener: listener.name().to_string(),
                message,
            })
        }
    }
}
