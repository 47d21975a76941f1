use std::time::Duration;

use tempo_models::Item;
use tracing::debug;

use crate::timer::Timer;

/// Latest status reported by the player engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub position_ms: u64,
    pub is_playing: bool,
    /// Set once when the loaded item played to its end.
    pub ended: bool,
}

/// Command sink and status source of the audio engine. The coordinator never
/// decodes audio itself.
pub trait Engine: Send {
    fn load(&mut self, item: &Item);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: u64);
    fn status(&mut self) -> EngineStatus;
}

/// Engine that only keeps time. Used when no audio backend is attached.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    timer: Timer,
    ended_reported: bool,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Engine for SimulatedEngine {
    fn load(&mut self, item: &Item) {
        debug!(uid = %item.uid, "loading");
        self.timer.reset(Duration::from_millis(item.duration_ms));
        self.ended_reported = false;
    }

    fn play(&mut self) {
        self.timer.start();
    }

    fn pause(&mut self) {
        self.timer.pause();
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.timer.set_time(Duration::from_millis(position_ms));
        self.ended_reported = false;
    }

    fn status(&mut self) -> EngineStatus {
        let ended = self.timer.finished() && !self.ended_reported;
        if ended {
            self.timer.pause();
            self.ended_reported = true;
        }

        EngineStatus {
            position_ms: self.timer.elapsed().as_millis() as u64,
            is_playing: self.timer.is_running(),
            ended,
        }
    }
}
