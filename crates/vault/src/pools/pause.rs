use crate::error::Error;

/// Emergency pause state of a pool.
///
/// A pool can be paused until `pause_window_end`. A paused pool unpauses
/// itself once `buffer_period_end` has passed, and from then on it can
/// never be paused again.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PauseState {
    pub pause_window_end: u64,
    pub buffer_period_end: u64,
    paused: bool,
}

impl PauseState {
    pub fn new(now: u64, pause_window_duration: u64, buffer_period_duration: u64) -> Self {
        let pause_window_end = now.saturating_add(pause_window_duration);
        Self {
            pause_window_end,
            buffer_period_end: pause_window_end.saturating_add(buffer_period_duration),
            paused: false,
        }
    }

    pub fn is_paused(&self, now: u64) -> bool {
        self.paused && now <= self.buffer_period_end
    }

    pub fn set_paused(&mut self, paused: bool, now: u64) -> Result<(), Error> {
        if paused && now >= self.pause_window_end {
            return Err(Error::PauseWindowExpired);
        }
        if !paused && now >= self.buffer_period_end {
            return Err(Error::BufferPeriodExpired);
        }
        self.paused = paused;
        Ok(())
    }
}
