use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a running build and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}

/// Phases of a build and the slice of 0..100 each one reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Vertices,
    Edges,
    Polygons,
    Costs,
}

impl Phase {
    fn range(&self) -> (f64, f64) {
        match self {
            Phase::Vertices => (0.0, 10.0),
            Phase::Edges => (10.0, 40.0),
            Phase::Polygons => (40.0, 50.0),
            Phase::Costs => (50.0, 99.0),
        }
    }
}

/// Monotonic progress in percent. Only `finish` reaches 100.
pub struct ProgressReporter {
    current: f64,
    callback: Option<Box<dyn FnMut(f64) + Send>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl ProgressReporter {
    pub fn silent() -> Self {
        Self {
            current: 0.0,
            callback: None,
        }
    }

    pub fn with_callback(callback: impl FnMut(f64) + Send + 'static) -> Self {
        Self {
            current: 0.0,
            callback: Some(Box::new(callback)),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    fn set(&mut self, value: f64) {
        let value = value.min(99.0);
        if value > self.current {
            self.current = value;
            if let Some(cb) = self.callback.as_mut() {
                cb(value);
            }
        }
    }

    /// Reports `done` out of `total` units of work within `phase`.
    pub fn step(&mut self, phase: Phase, done: usize, total: usize) {
        let (lo, hi) = phase.range();
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        self.set(lo + (hi - lo) * fraction);
    }

    pub fn complete_phase(&mut self, phase: Phase) {
        self.set(phase.range().1);
    }

    pub fn finish(&mut self) {
        if self.current < 100.0 {
            self.current = 100.0;
            if let Some(cb) = self.callback.as_mut() {
                cb(100.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_never_decreases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut progress = ProgressReporter::with_callback(move |p| sink.lock().unwrap().push(p));

        progress.step(Phase::Edges, 1, 2);
        progress.step(Phase::Vertices, 1, 1);
        progress.step(Phase::Costs, 10, 10);
        assert_eq!(progress.current(), 99.0);
        progress.finish();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![25.0, 99.0, 100.0]);
    }

    #[test]
    fn test_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_canceled());
        clone.cancel();
        assert!(token.is_canceled());
    }
}
