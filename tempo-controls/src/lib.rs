pub mod controls;
pub mod coordinator;
pub mod database;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod library;
pub mod persistence;
pub mod player;
pub mod queue;
pub mod queue_view;
pub mod session;
mod timer;

pub use controls::Controls;
pub use coordinator::{Coordinator, QueueReceiver, SnapshotReceiver, StateReceiver};
pub use dispatch::{Event, Listener, ListenerId, ListenerRegistry};
pub use error::Error;
pub use player::{PlaybackState, Player, PlayerSettings, RepeatMode, Status};
pub use queue::{Change, ChangeKind, Queue, QueueSnapshot, UpdateInstructions};

pub type Result<T, E = Error> = std::result::Result<T, E>;
