//! Diagnostic sinks.
//!
//! Every stage reports through [`Monitors`], a cheap-to-clone fan-out over any number of
//! [`Monitor`] implementations. An empty `Monitors` is a valid null sink.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// A receiver of log lines, errors and progress updates.
pub trait Monitor: Send + Sync + Debug {
    fn log(&self, message: &str);
    fn error(&self, message: &str);
    /// `percent` is in `[0, 100]`.
    fn progress(&self, message: &str, percent: f32);
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn log(&self, message: &str) {
        log::info!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }

    fn progress(&self, message: &str, percent: f32) {
        log::debug!("{message} ({percent:.1} %)");
    }
}

/// Publishes the latest progress fraction into a shared lock, for a UI thread to poll.
///
/// The lock holds `Some(fraction)` in `[0, 1]` while work is running; call
/// [`ProgressMonitor::finish`] to reset it to `None`.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    progress_lock: Arc<RwLock<Option<f32>>>,
}

impl ProgressMonitor {
    pub fn new(progress_lock: Arc<RwLock<Option<f32>>>) -> Self {
        ProgressMonitor { progress_lock }
    }

    pub fn finish(&self) {
        if let Ok(mut p) = self.progress_lock.write() {
            *p = None;
        }
    }
}

impl Monitor for ProgressMonitor {
    fn log(&self, _message: &str) {}

    fn error(&self, _message: &str) {}

    fn progress(&self, _message: &str, percent: f32) {
        if let Ok(mut p) = self.progress_lock.write() {
            *p = Some((percent / 100.0).clamp(0.0, 1.0));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Monitors {
    sinks: Vec<Arc<dyn Monitor>>,
}

impl Monitors {
    /// The null sink.
    pub fn none() -> Self {
        Monitors::default()
    }

    /// A single [`LogMonitor`].
    pub fn logging() -> Self {
        Monitors::none().with(LogMonitor)
    }

    pub fn with<M: Monitor + 'static>(mut self, monitor: M) -> Self {
        self.sinks.push(Arc::new(monitor));
        self
    }

    pub fn add(&mut self, monitor: Arc<dyn Monitor>) {
        self.sinks.push(monitor);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn log(&self, message: &str) {
        for sink in &self.sinks {
            sink.log(message);
        }
    }

    pub fn error(&self, message: &str) {
        for sink in &self.sinks {
            sink.error(message);
        }
    }

    pub fn progress(&self, message: &str, percent: f32) {
        for sink in &self.sinks {
            sink.progress(message, percent);
        }
    }
}
