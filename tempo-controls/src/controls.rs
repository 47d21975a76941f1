use std::sync::Arc;

use tempo_models::{Item, Parent};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::warn;

use crate::{
    Result,
    library::Library,
    player::{PlayerSettings, RepeatMode},
};

pub enum ControlCommand {
    PlayItems {
        items: Vec<Item>,
        parent: Option<Parent>,
        start: usize,
        shuffle: Option<bool>,
        reply: oneshot::Sender<Result<()>>,
    },
    PlayNext {
        items: Vec<Item>,
    },
    AddToQueue {
        items: Vec<Item>,
    },
    Play,
    Pause,
    PlayPause,
    Next,
    Previous,
    Rewind,
    Seek {
        position_ms: u64,
    },
    SetRepeatMode {
        mode: RepeatMode,
    },
    CycleRepeatMode,
    SetShuffled {
        shuffled: bool,
    },
    ToggleShuffle,
    GotoIndex {
        index: usize,
        reply: oneshot::Sender<bool>,
    },
    RemoveIndex {
        index: usize,
        reply: oneshot::Sender<bool>,
    },
    MoveIndex {
        from: usize,
        to: usize,
        reply: oneshot::Sender<bool>,
    },
    SetSettings {
        settings: PlayerSettings,
    },
    LibraryChanged {
        library: Arc<dyn Library>,
    },
    Quit,
}

/// Cloneable handle for sending commands to the coordinator.
///
/// Transport commands are fire and forget. Index commands report whether
/// the index was still valid when the command ran.
#[derive(Debug, Clone)]
pub struct Controls {
    tx: UnboundedSender<ControlCommand>,
}

impl Controls {
    pub fn new(tx: UnboundedSender<ControlCommand>) -> Self {
        Self { tx }
    }

    pub async fn play_items(
        &self,
        items: Vec<Item>,
        parent: Option<Parent>,
        start: usize,
        shuffle: Option<bool>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ControlCommand::PlayItems {
            items,
            parent,
            start,
            shuffle,
            reply,
        })?;
        rx.await?
    }

    pub fn play_next(&self, items: Vec<Item>) {
        self.send(ControlCommand::PlayNext { items });
    }

    pub fn add_to_queue(&self, items: Vec<Item>) {
        self.send(ControlCommand::AddToQueue { items });
    }

    pub fn play(&self) {
        self.send(ControlCommand::Play);
    }

    pub fn pause(&self) {
        self.send(ControlCommand::Pause);
    }

    pub fn play_pause(&self) {
        self.send(ControlCommand::PlayPause);
    }

    pub fn next(&self) {
        self.send(ControlCommand::Next);
    }

    pub fn previous(&self) {
        self.send(ControlCommand::Previous);
    }

    pub fn rewind(&self) {
        self.send(ControlCommand::Rewind);
    }

    pub fn seek(&self, position_ms: u64) {
        self.send(ControlCommand::Seek { position_ms });
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.send(ControlCommand::SetRepeatMode { mode });
    }

    pub fn cycle_repeat_mode(&self) {
        self.send(ControlCommand::CycleRepeatMode);
    }

    pub fn set_shuffled(&self, shuffled: bool) {
        self.send(ControlCommand::SetShuffled { shuffled });
    }

    pub fn toggle_shuffle(&self) {
        self.send(ControlCommand::ToggleShuffle);
    }

    pub async fn goto_queue_index(&self, index: usize) -> bool {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::GotoIndex { index, reply }, rx)
            .await
    }

    pub async fn remove_queue_item(&self, index: usize) -> bool {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::RemoveIndex { index, reply }, rx)
            .await
    }

    pub async fn move_queue_item(&self, from: usize, to: usize) -> bool {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::MoveIndex { from, to, reply }, rx)
            .await
    }

    pub fn set_settings(&self, settings: PlayerSettings) {
        self.send(ControlCommand::SetSettings { settings });
    }

    pub fn library_changed(&self, library: Arc<dyn Library>) {
        self.send(ControlCommand::LibraryChanged { library });
    }

    pub fn quit(&self) {
        self.send(ControlCommand::Quit);
    }

    async fn request(&self, command: ControlCommand, rx: oneshot::Receiver<bool>) -> bool {
        if self.tx.send(command).is_err() {
            warn!("coordinator has stopped");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    fn send(&self, command: ControlCommand) {
        if self.tx.send(command).is_err() {
            warn!("coordinator has stopped");
        }
    }
}
