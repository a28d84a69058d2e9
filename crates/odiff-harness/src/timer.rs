//! Wall-clock timing of scoped activations

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// Accumulates elapsed time under a label
#[derive(Debug, Clone)]
pub struct Timer {
    label: String,
    total: Duration,
    activations: u32,
}

impl Timer {
    /// Timer with nothing accumulated yet
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total: Duration::ZERO,
            activations: 0,
        }
    }

    /// Label used in reports
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Time accumulated over all finished activations
    #[inline]
    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Number of finished activations
    #[inline]
    #[must_use]
    pub fn activations(&self) -> u32 {
        self.activations
    }

    /// Start an activation; it ends when the guard drops
    pub fn start(&mut self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: Instant::now(),
        }
    }

    /// Time a closure
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        f()
    }

    /// Time a future until it resolves
    pub async fn time_async<F: Future>(&mut self, fut: F) -> F::Output {
        let _guard = self.start();
        fut.await
    }

    /// Snapshot for printing
    #[must_use]
    pub fn report(&self) -> TimingReport {
        TimingReport {
            label: self.label.clone(),
            total: self.total,
        }
    }
}

/// Open activation of a [`Timer`]
///
/// Elapsed time is added on drop, so the timer closes on every exit path,
/// including `?` and panics unwinding through the timed code.
#[derive(Debug)]
pub struct TimerGuard<'a> {
    timer: &'a mut Timer,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.total += self.started.elapsed();
        self.timer.activations += 1;
    }
}

/// Printed form of a timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    /// Timer label
    pub label: String,
    /// Accumulated time
    pub total: Duration,
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {:.3}s", self.label, self.total.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activations_accumulate() {
        let mut timer = Timer::new("new diffuse_tracers");
        timer.time(|| std::thread::sleep(Duration::from_millis(5)));
        let first = timer.total();
        timer.time(|| std::thread::sleep(Duration::from_millis(5)));
        assert!(first >= Duration::from_millis(5));
        assert!(timer.total() >= first + Duration::from_millis(5));
        assert_eq!(timer.activations(), 2);
    }

    #[test]
    fn timer_closes_when_the_timed_work_fails() {
        let mut timer = Timer::new("legacy step");
        let result: Result<(), &str> = timer.time(|| Err("routine raised"));
        assert_eq!(result, Err("routine raised"));
        assert_eq!(timer.activations(), 1);
    }

    #[test]
    fn timer_closes_on_unwind() {
        let mut timer = Timer::new("panicky");
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            timer.time(|| panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert_eq!(timer.activations(), 1);
    }

    #[tokio::test]
    async fn async_activations_are_timed() {
        let mut timer = Timer::new("legacy run");
        let value = timer
            .time_async(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                7
            })
            .await;
        assert_eq!(value, 7);
        assert!(timer.total() >= Duration::from_millis(5));
    }

    #[test]
    fn report_shows_label_and_seconds() {
        let mut timer = Timer::new("new step");
        timer.total = Duration::from_millis(1500);
        assert_eq!(timer.report().to_string(), "[new step]: 1.500s");
    }
}
