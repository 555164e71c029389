//! Display/save-only remappings of sample values.
//!
//! A processor never touches its input; it returns a new volume. Processors are
//! idempotent only when re-applied with freshly computed statistics of their own
//! output, see the tests below.

use crate::monitor::Monitors;
use crate::signal::{RealSignal, SignalStats};
use std::fmt::Debug;

pub trait RangeProcessor: Debug + Send + Sync {
    /// Maps `signal` to a new volume. `stats` may carry reference statistics to use in
    /// place of the signal's own; processors that need none ignore it.
    fn process(
        &self,
        monitors: &Monitors,
        signal: &RealSignal,
        stats: Option<&SignalStats>,
    ) -> RealSignal;
}

/// Linear map of `[input min, input max]` onto `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescaler {
    pub min: f32,
    pub max: f32,
}

impl Rescaler {
    pub fn new(min: f32, max: f32) -> Self {
        Rescaler { min, max }
    }
}

impl RangeProcessor for Rescaler {
    fn process(
        &self,
        monitors: &Monitors,
        signal: &RealSignal,
        stats: Option<&SignalStats>,
    ) -> RealSignal {
        let name = format!("rescale({})", signal.name);
        let stats = stats.copied().unwrap_or_else(|| signal.stats());
        let (lo, hi) = (stats.min as f64, stats.max as f64);
        if hi <= lo {
            monitors.log(&format!("{} is constant, rescale skipped", signal.name));
            return signal.duplicate(name);
        }
        let (a, b) = (self.min as f64, self.max as f64);
        let mut output = signal.duplicate(name);
        output.data_mut().par_mapv_inplace(|v| {
            let t = (v as f64 - lo) / (hi - lo);
            (a * (1.0 - t) + b * t) as f32
        });
        output
    }
}

/// Hard clamp to `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clipper {
    pub lo: f32,
    pub hi: f32,
}

impl Clipper {
    pub fn new(lo: f32, hi: f32) -> Self {
        Clipper { lo, hi }
    }
}

impl RangeProcessor for Clipper {
    fn process(
        &self,
        _monitors: &Monitors,
        signal: &RealSignal,
        _stats: Option<&SignalStats>,
    ) -> RealSignal {
        let (lo, hi) = (self.lo.min(self.hi), self.hi.max(self.lo));
        let mut output = signal.duplicate(format!("clip({})", signal.name));
        output.data_mut().par_mapv_inplace(|v| v.clamp(lo, hi));
        output
    }
}

/// Z-score with the input's own statistics, then mapped to `mean` and `stdev`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub mean: f32,
    pub stdev: f32,
}

impl Normalizer {
    pub fn new(mean: f32, stdev: f32) -> Self {
        Normalizer { mean, stdev }
    }
}

impl RangeProcessor for Normalizer {
    fn process(
        &self,
        monitors: &Monitors,
        signal: &RealSignal,
        _stats: Option<&SignalStats>,
    ) -> RealSignal {
        let own = signal.stats();
        let (mu, sigma) = (own.mean as f64, own.stdev as f64);
        let (mean, stdev) = (self.mean as f64, self.stdev as f64);
        let mut output = signal.duplicate(format!("norm({})", signal.name));
        if sigma == 0.0 {
            monitors.log(&format!("{} has zero deviation", signal.name));
            output.data_mut().fill(self.mean);
            return output;
        }
        output
            .data_mut()
            .par_mapv_inplace(|v| ((v as f64 - mu) / sigma * stdev + mean) as f32);
        output
    }
}
