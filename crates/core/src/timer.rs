use std::time::{Duration, Instant};

/// Elapsed time reported by entry logs, before anything has been measured.
pub const ZERO_ELAPSED: &str = "0ms";

/// Wall-clock stopwatch for one execution.
///
/// `end` consumes the timer, so a measurement can only be finished once.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimer {
    started_at: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop and format the elapsed time, e.g. `"10.42ms"`.
    pub fn end(self) -> String {
        format_elapsed(self.elapsed())
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0)
}
