use std::sync::{Arc, Mutex, MutexGuard};

use tempo_models::Item;
use tracing::debug;

use crate::{
    Result,
    controls::Controls,
    dispatch::{Event, Listener},
    queue::{ChangeKind, QueueSnapshot, UpdateInstructions},
};

#[derive(Default)]
struct ViewState {
    items: Arc<[Item]>,
    index: Option<usize>,
    instructions: Vec<UpdateInstructions>,
    scroll_to: Option<usize>,
}

/// List projection of the queue for a UI.
///
/// Keeps its own copy of the resolved items together with the splice
/// instructions and scroll requests that led to it. Index commands are
/// checked against this copy before they reach the coordinator.
pub struct QueueView {
    controls: Controls,
    state: Mutex<ViewState>,
}

impl QueueView {
    pub fn new(controls: Controls) -> Self {
        Self {
            controls,
            state: Default::default(),
        }
    }

    /// Starts from a queue that is already loaded, for views attached after
    /// playback began.
    pub fn with_queue(controls: Controls, queue: &QueueSnapshot) -> Self {
        let view = Self::new(controls);
        {
            let mut state = view.lock();
            state.items = queue.items.clone();
            state.index = queue.index;
        }
        view
    }

    pub fn items(&self) -> Arc<[Item]> {
        self.lock().items.clone()
    }

    pub fn index(&self) -> Option<usize> {
        self.lock().index
    }

    /// Pending splice instructions, oldest first.
    pub fn take_instructions(&self) -> Vec<UpdateInstructions> {
        std::mem::take(&mut self.lock().instructions)
    }

    pub fn take_scroll_to(&self) -> Option<usize> {
        self.lock().scroll_to.take()
    }

    pub async fn goto(&self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.controls.goto_queue_index(index).await
    }

    pub async fn remove(&self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.controls.remove_queue_item(index).await
    }

    pub async fn move_item(&self, from: usize, to: usize) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        self.controls.move_queue_item(from, to).await
    }

    fn contains(&self, index: usize) -> bool {
        index < self.lock().items.len()
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn replace(state: &mut ViewState, queue: &QueueSnapshot) {
    state.instructions.push(UpdateInstructions::Replace { from: 0 });
    state.items = queue.items.clone();
    state.index = queue.index;
    state.scroll_to = queue.index;
}

impl Listener for QueueView {
    fn on_event(&self, event: &Event) -> Result<()> {
        let mut state = self.lock();

        match event {
            Event::NewPlayback { queue, .. } => {
                debug!("new playback, replacing queue view");
                replace(&mut state, queue);
            }
            Event::QueueChanged { queue, change } => match (change.kind, change.instructions) {
                (ChangeKind::Reordered, _) => replace(&mut state, queue),
                (_, None) => {
                    state.index = queue.index;
                    state.scroll_to = queue.index;
                }
                (_, Some(instructions)) => {
                    state.instructions.push(instructions);
                    state.items = queue.items.clone();
                    state.index = queue.index;
                }
            },
            Event::StateChanged { .. } | Event::RepeatChanged { .. } => {}
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "queue-view"
    }
}
