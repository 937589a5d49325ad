//! Sample counted timers driving the sequencer

use super::DeviceBank;

/// Which of the two timers fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// Sustain, portamento, modulation and envelope stepping
    Automation = 0,
    /// Channel program interpretation
    Sequencer = 1,
}

impl TimerId {
    /// Firing order when both expire on the same frame
    pub const ALL: [TimerId; 2] = [TimerId::Automation, TimerId::Sequencer];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Period counter measured in stereo frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    pub enabled: bool,
    pub period: u32,
    pub remaining: u32,
}

impl Timer {
    /// Re-arm with a new period; 0 disables the timer
    pub fn set_period(&mut self, period: u32) {
        self.enabled = period > 0;
        self.period = period;
        self.remaining = period;
    }

    /// Count down `frames`, returning true when the timer expires.
    /// An expired timer is reloaded before its callback runs.
    pub fn advance(&mut self, frames: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(frames);
        if self.remaining != 0 {
            return false;
        }
        self.remaining = self.period;
        true
    }
}

/// Receives timer callbacks between generated sub-blocks
pub trait TimerHandler {
    fn on_timer(&mut self, id: TimerId, bank: &mut DeviceBank);
}
