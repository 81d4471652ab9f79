use std::fmt;
use std::time::{Duration, Instant};

use crate::grid::GridDimensions;

/// Observational render statistics. Never feed these back into rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub columns: u32,
    pub rows: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} FPS | {:.2}ms | {}×{}",
            self.fps.round() as u32,
            self.frame_time_ms,
            self.columns,
            self.rows
        )
    }
}

/// Accumulates tick-to-tick timings and publishes [`Stats`] once per interval.
#[derive(Debug, Clone)]
pub struct FrameStats {
    interval: Duration,
    last_tick: Option<Instant>,
    ticks: u32,
    elapsed: Duration,
}

impl FrameStats {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
            ticks: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Records a tick that started at `now`.
    ///
    /// Returns fresh stats when the deltas collected since the last
    /// publication cover at least one interval.
    pub fn record(&mut self, now: Instant, grid: GridDimensions) -> Option<Stats> {
        let previous = self.last_tick.replace(now)?;
        self.ticks += 1;
        self.elapsed += now.saturating_duration_since(previous);

        if self.elapsed < self.interval {
            return None;
        }
        let seconds = self.elapsed.as_secs_f32();
        let stats = Stats {
            fps: self.ticks as f32 / seconds,
            frame_time_ms: seconds * 1000.0 / self.ticks as f32,
            columns: grid.columns,
            rows: grid.rows,
        };
        self.ticks = 0;
        self.elapsed = Duration::ZERO;
        Some(stats)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: GridDimensions = GridDimensions {
        columns: 120,
        rows: 45,
    };

    #[test]
    fn publishes_once_per_interval() {
        let start = Instant::now();
        let mut stats = FrameStats::default();
        let frame = Duration::from_millis(16);

        let mut published = Vec::new();
        for i in 0..=125u32 {
            if let Some(s) = stats.record(start + frame * i, GRID) {
                published.push(s);
            }
        }
        assert_eq!(published.len(), 1);
        let s = published[0];
        assert!((s.frame_time_ms - 16.0).abs() < 1e-3);
        assert!((s.fps - 62.5).abs() < 1e-2);
        assert_eq!((s.columns, s.rows), (120, 45));
    }

    #[test]
    fn first_tick_only_sets_the_reference() {
        let start = Instant::now();
        let mut stats = FrameStats::new(Duration::from_millis(100));
        assert_eq!(stats.record(start, GRID), None);
        let s = stats
            .record(start + Duration::from_millis(250), GRID)
            .expect("one long interval publishes");
        assert!((s.frame_time_ms - 250.0).abs() < 1e-3);
        assert!((s.fps - 4.0).abs() < 1e-3);
    }

    #[test]
    fn formats_like_an_overlay() {
        let stats = Stats {
            fps: 59.6,
            frame_time_ms: 3.14159,
            columns: 120,
            rows: 45,
        };
        assert_eq!(stats.to_string(), "60 FPS | 3.14ms | 120×45");
    }
}
