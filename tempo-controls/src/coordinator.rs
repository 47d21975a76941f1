use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{
        mpsc::{self, UnboundedReceiver},
        watch,
    },
    time::MissedTickBehavior,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    Result,
    controls::{ControlCommand, Controls},
    persistence,
    player::{PlaybackState, Player},
    queue::QueueSnapshot,
};

pub type QueueReceiver = watch::Receiver<QueueSnapshot>;
pub type StateReceiver = watch::Receiver<PlaybackState>;
pub type SnapshotReceiver = watch::Receiver<Option<Arc<Vec<u8>>>>;

const TICK: Duration = Duration::from_millis(500);

/// Runs the player on a single task. Commands execute one at a time and
/// the watch channels are refreshed once each command has finished.
pub struct Coordinator {
    player: Player,
    rx: UnboundedReceiver<ControlCommand>,
    queue_tx: watch::Sender<QueueSnapshot>,
    state_tx: watch::Sender<PlaybackState>,
    snapshot_tx: watch::Sender<Option<Arc<Vec<u8>>>>,
    tick: Duration,
}

impl Coordinator {
    pub fn new(player: Player) -> (Self, Controls) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (queue_tx, _) = watch::channel(player.queue().snapshot());
        let (state_tx, _) = watch::channel(player.state());
        let (snapshot_tx, _) = watch::channel(None);

        let coordinator = Self {
            player,
            rx,
            queue_tx,
            state_tx,
            snapshot_tx,
            tick: TICK,
        };

        (coordinator, Controls::new(tx))
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn queue_receiver(&self) -> QueueReceiver {
        self.queue_tx.subscribe()
    }

    pub fn state_receiver(&self) -> StateReceiver {
        self.state_tx.subscribe()
    }

    pub fn snapshot_receiver(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            select! {
                command = self.rx.recv() => match command {
                    Some(ControlCommand::Quit) | None => break,
                    Some(command) => {
                        self.handle(command);
                        self.publish(true);
                    }
                },
                _ = interval.tick() => {
                    self.player.poll_engine();
                    self.publish(false);
                }
            }
        }

        info!("coordinator stopped");
        self.publish(true);
        Ok(())
    }

    fn handle(&mut self, command: ControlCommand) {
        let player = &mut self.player;

        match command {
            ControlCommand::PlayItems {
                items,
                parent,
                start,
                shuffle,
                reply,
            } => {
                let result = player.play_items(items, parent, start, shuffle);
                if let Err(error) = &result {
                    warn!(%error, "unable to start playback");
                }
                let _ = reply.send(result);
            }
            ControlCommand::PlayNext { items } => {
                if let Err(error) = player.play_next(items) {
                    warn!(%error, "unable to queue items");
                }
            }
            ControlCommand::AddToQueue { items } => {
                if let Err(error) = player.add_to_queue(items) {
                    warn!(%error, "unable to queue items");
                }
            }
            ControlCommand::Play => {
                player.play();
            }
            ControlCommand::Pause => {
                player.pause();
            }
            ControlCommand::PlayPause => {
                player.play_pause();
            }
            ControlCommand::Next => {
                player.next();
            }
            ControlCommand::Previous => {
                player.prev();
            }
            ControlCommand::Rewind => {
                player.rewind();
            }
            ControlCommand::Seek { position_ms } => {
                player.seek_to(position_ms);
            }
            ControlCommand::SetRepeatMode { mode } => player.set_repeat_mode(mode),
            ControlCommand::CycleRepeatMode => {
                let mode = player.state().repeat_mode.increment();
                player.set_repeat_mode(mode);
            }
            ControlCommand::SetShuffled { shuffled } => player.reorder(shuffled),
            ControlCommand::ToggleShuffle => {
                let shuffled = !player.queue().is_shuffled();
                player.reorder(shuffled);
            }
            ControlCommand::GotoIndex { index, reply } => {
                let _ = reply.send(report(player.goto_queue_index(index)));
            }
            ControlCommand::RemoveIndex { index, reply } => {
                let _ = reply.send(report(player.remove_queue_item(index)));
            }
            ControlCommand::MoveIndex { from, to, reply } => {
                let _ = reply.send(report(player.move_queue_item(from, to)));
            }
            ControlCommand::SetSettings { settings } => player.set_settings(settings),
            ControlCommand::LibraryChanged { library } => {
                player.revalidate(library.as_ref());
            }
            ControlCommand::Quit => {}
        }
    }

    /// Refreshes the watch channels. A tick that only moved the position
    /// does not produce a new snapshot.
    fn publish(&self, command: bool) {
        let queue = self.player.queue().snapshot();
        let queue_changed = self.queue_tx.send_if_modified(|current| {
            if *current == queue {
                false
            } else {
                *current = queue;
                true
            }
        });

        let state = self.player.state();
        let previous = *self.state_tx.borrow();
        self.state_tx.send_replace(state);
        let status_changed = previous.status != state.status;

        if command || queue_changed || status_changed {
            match persistence::snapshot(&self.player) {
                Ok(bytes) => {
                    self.snapshot_tx.send_replace(Some(Arc::new(bytes)));
                }
                Err(error) => warn!(%error, "unable to snapshot session"),
            }
        }
    }
}

fn report(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            debug!(%error, "ignoring queue command");
            false
        }
    }
}
