use std::time::{Duration, Instant};

/// Pausable stopwatch bounded by the length of the loaded track.
#[derive(Debug)]
pub(crate) struct Timer {
    start_time: Option<Instant>,
    elapsed: Duration,
    limit: Duration,
}

impl Timer {
    pub(crate) fn new(limit: Duration) -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
            limit,
        }
    }

    pub(crate) fn reset(&mut self, limit: Duration) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
        self.limit = limit;
    }

    pub(crate) fn start(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        let elapsed = match self.start_time {
            Some(start) => self.elapsed + start.elapsed(),
            None => self.elapsed,
        };

        elapsed.min(self.limit)
    }

    pub(crate) fn finished(&self) -> bool {
        !self.limit.is_zero() && self.elapsed() >= self.limit
    }

    pub(crate) fn set_time(&mut self, time: Duration) {
        self.elapsed = time.min(self.limit);

        if self.start_time.is_some() {
            self.start_time = Some(Instant::now());
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}
