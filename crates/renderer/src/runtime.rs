use std::time::{Duration, Instant};

/// Snapshot of the time state supplied to uniform writers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed wall-clock or simulated time in seconds.
    pub seconds: f32,
}

/// Abstraction over where loop time originates from.
pub trait TimeSource {
    /// Produces a time sample for the next tick.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the origin.
    pub fn peek(&self) -> f32 {
        self.origin.elapsed().as_secs_f32()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn sample(&mut self) -> TimeSample {
        TimeSample {
            seconds: self.peek(),
        }
    }
}

/// Pausable media clock.
///
/// Media time only advances while running. Methods take an explicit `now` so
/// callers on the render thread share one timestamp per tick.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl PlaybackClock {
    /// Creates a stopped clock at position zero.
    pub fn stopped() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn resume_at(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn pause_at(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn position_at(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }

}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::stopped()
    }
}

/// Lifecycle of the render loop as seen by the event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LoopPhase {
    #[default]
    Running,
    Paused,
    TornDown,
}

/// Decides whether a tick should run.
///
/// Pausing stops redraw requests; tearing down is terminal and every later
/// tick becomes a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopControl {
    phase: LoopPhase,
}

impl LoopControl {
    pub fn pause(&mut self) {
        if self.phase == LoopPhase::Running {
            self.phase = LoopPhase::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.phase == LoopPhase::Paused {
            self.phase = LoopPhase::Running;
        }
    }

    pub fn teardown(&mut self) {
        self.phase = LoopPhase::TornDown;
    }

    pub fn should_tick(&self) -> bool {
        self.phase == LoopPhase::Running
    }

    pub fn is_torn_down(&self) -> bool {
        self.phase == LoopPhase::TornDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_only_advances_while_running() {
        let start = Instant::now();
        let mut clock = PlaybackClock::stopped();
        assert_eq!(clock.position_at(start + Duration::from_secs(5)), Duration::ZERO);

        clock.resume_at(start);
        clock.pause_at(start + Duration::from_secs(2));
        assert_eq!(clock.position_at(start + Duration::from_secs(10)), Duration::from_secs(2));

        clock.resume_at(start + Duration::from_secs(10));
        assert_eq!(clock.position_at(start + Duration::from_secs(11)), Duration::from_secs(3));
    }

    #[test]
    fn teardown_is_terminal() {
        let mut control = LoopControl::default();
        assert!(control.should_tick());
        control.pause();
        assert!(!control.should_tick());
        control.resume();
        assert!(control.should_tick());
        control.teardown();
        control.resume();
        assert!(!control.should_tick());
        assert!(control.is_torn_down());
    }

    #[test]
    fn system_source_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.sample().seconds;
        let second = source.sample().seconds;
        assert!(first >= 0.0);
        assert!(second >= first);
    }
}
