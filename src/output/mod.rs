//! Output descriptors and their dispatch.
//!
//! An [`Output`] says what to emit (view, dynamic-range mapping, sample type), how
//! (show, save or both) and when (every `snapshot` iterations, or only at the end). The
//! [`OutputDispatcher`] evaluates every descriptor at the dispatch points of a run. It
//! always works on a mapped copy of the estimate, never on the estimate itself.

use crate::error::{DeconvolutionError, Result};
use crate::monitor::Monitors;
use crate::range::{Clipper, Normalizer, RangeProcessor, Rescaler};
use crate::signal::{RealSignal, SignalStats};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rendering of a volume into what is shown or saved.
pub mod render;

/// PNG and `.npy` writers.
pub mod save;

/// The image-provider seam and its implementations.
pub mod viewer;

pub use viewer::{ChannelViewer, ImageProvider, NullViewer, ViewerCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    /// All slices as one stack.
    Stack,
    /// One item per slice.
    Series,
    /// XY, YZ and XZ sections through a keypoint.
    Ortho,
    /// Maximum-intensity projection along z.
    Mip,
    /// XY and YZ sections side by side.
    Figure,
    /// All slices tiled in a near-square grid.
    Planar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Show,
    Save,
    ShowSave,
}

impl Action {
    pub fn shows(&self) -> bool {
        matches!(self, Action::Show | Action::ShowSave)
    }

    pub fn saves(&self) -> bool {
        matches!(self, Action::Save | Action::ShowSave)
    }
}

/// Value mapping applied to the copy that is shown or saved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Dynamic {
    Intact,
    /// Onto the full range of the sample type.
    Rescaled,
    Normalized { mean: f32, stdev: f32 },
    /// Into the min/max of the input image.
    Clipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    Byte,
    Short,
    Float,
}

impl SampleType {
    pub fn range(&self) -> (f32, f32) {
        match self {
            SampleType::Byte => (0.0, u8::MAX as f32),
            SampleType::Short => (0.0, u16::MAX as f32),
            SampleType::Float => (0.0, 1.0),
        }
    }
}

/// One requested output. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    name: String,
    view: View,
    action: Action,
    dynamic: Dynamic,
    sample_type: SampleType,
    snapshot: usize,
    keypoint: Option<[usize; 3]>,
}

impl Output {
    /// A final-only, saved, float output without range mapping.
    pub fn new(view: View, name: impl Into<String>) -> Self {
        Output {
            name: name.into(),
            view,
            action: Action::Save,
            dynamic: Dynamic::Intact,
            sample_type: SampleType::Float,
            snapshot: 0,
            keypoint: None,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_dynamic(mut self, dynamic: Dynamic) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// Emit every `n` iterations; 0 means at the end only.
    pub fn with_snapshot(mut self, n: usize) -> Self {
        self.snapshot = n;
        self
    }

    /// Section position for ortho and figure views; the volume center otherwise.
    pub fn with_keypoint(mut self, x: usize, y: usize, z: usize) -> Self {
        self.keypoint = Some([x, y, z]);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn dynamic(&self) -> Dynamic {
        self.dynamic
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn snapshot(&self) -> usize {
        self.snapshot
    }

    pub fn keypoint(&self) -> Option<[usize; 3]> {
        self.keypoint
    }

    pub fn is_snapshot_due(&self, iteration: usize) -> bool {
        self.snapshot > 0 && iteration % self.snapshot == 0
    }

    /// A mapped copy of `signal`. `image_stats` are the statistics of the input image.
    pub fn map_range(
        &self,
        monitors: &Monitors,
        signal: &RealSignal,
        image_stats: &SignalStats,
    ) -> RealSignal {
        match self.dynamic {
            Dynamic::Intact => signal.duplicate(signal.name.clone()),
            Dynamic::Rescaled => {
                let (min, max) = self.sample_type.range();
                Rescaler::new(min, max).process(monitors, signal, None)
            }
            Dynamic::Normalized { mean, stdev } => {
                Normalizer::new(mean, stdev).process(monitors, signal, None)
            }
            Dynamic::Clipped => Clipper::new(image_stats.min, image_stats.max).process(
                monitors,
                signal,
                Some(image_stats),
            ),
        }
    }
}

/// Keeps the first error of a pass and reports the later ones.
fn keep_first(
    first: &mut Option<DeconvolutionError>,
    monitors: &Monitors,
    result: Result<()>,
) {
    if let Err(err) = result {
        match first {
            None => *first = Some(err),
            Some(_) => monitors.error(&format!("output dispatch failed: {err}")),
        }
    }
}

/// What one dispatch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub output: String,
    pub iteration: Option<usize>,
    pub files: Vec<PathBuf>,
}

/// Evaluates a run's outputs at its dispatch points.
#[derive(Debug)]
pub struct OutputDispatcher {
    outputs: Vec<Output>,
    directory: PathBuf,
    provider: Arc<dyn ImageProvider>,
    shown: HashSet<usize>,
    last_snapshot: HashMap<usize, usize>,
    history: Vec<Dispatch>,
}

impl OutputDispatcher {
    pub fn new(outputs: Vec<Output>, directory: &Path, provider: Arc<dyn ImageProvider>) -> Self {
        OutputDispatcher {
            outputs,
            directory: directory.to_path_buf(),
            provider,
            shown: HashSet::new(),
            last_snapshot: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Every dispatch so far, in order.
    pub fn history(&self) -> &[Dispatch] {
        &self.history
    }

    pub fn has_snapshots_due(&self, iteration: usize) -> bool {
        self.outputs.iter().any(|o| o.is_snapshot_due(iteration))
    }

    fn emit(
        &mut self,
        index: usize,
        monitors: &Monitors,
        estimate: &RealSignal,
        image_stats: &SignalStats,
        iteration: Option<usize>,
    ) -> Result<()> {
        let output = &self.outputs[index];
        let mapped = output.map_range(monitors, estimate, image_stats);
        let rendered = render::render(mapped, output.view, output.keypoint);

        let mut files = Vec::new();
        if output.action.saves() {
            let stem = save::file_stem(&self.directory, &output.name, iteration);
            files = save::save(&rendered, &stem, output.sample_type)?;
            for file in &files {
                monitors.log(&format!("saved {}", file.display()));
            }
        }
        if output.action.shows() {
            let title = match iteration {
                Some(i) => format!("{}-{i}", output.name),
                None => output.name.clone(),
            };
            if self.shown.insert(index) {
                self.provider.open(&output.name, &title, &rendered);
            } else {
                self.provider.append(&output.name, &title, &rendered);
            }
        }
        self.history.push(Dispatch {
            output: output.name.clone(),
            iteration,
            files,
        });
        Ok(())
    }

    /// Dispatches every snapshot output due at `iteration` with that iteration's
    /// (cropped) estimate. A failing output does not stop the others; the first error
    /// is returned once all have been tried.
    pub fn snapshot(
        &mut self,
        monitors: &Monitors,
        iteration: usize,
        estimate: &RealSignal,
        image_stats: &SignalStats,
    ) -> Result<()> {
        let mut first_error = None;
        for index in 0..self.outputs.len() {
            if self.outputs[index].is_snapshot_due(iteration) {
                let result = self.emit(index, monitors, estimate, image_stats, Some(iteration));
                self.last_snapshot.insert(index, iteration);
                keep_first(&mut first_error, monitors, result);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The closing pass: final-only outputs once, and snapshot outputs once more unless
    /// they were already dispatched at `iteration`. Like [`snapshot`](Self::snapshot),
    /// every output is tried before the first error is returned.
    pub fn finish(
        &mut self,
        monitors: &Monitors,
        iteration: usize,
        estimate: &RealSignal,
        image_stats: &SignalStats,
    ) -> Result<()> {
        let mut first_error = None;
        for index in 0..self.outputs.len() {
            let result = if self.outputs[index].snapshot == 0 {
                self.emit(index, monitors, estimate, image_stats, None)
            } else if self.last_snapshot.get(&index) != Some(&iteration) {
                self.last_snapshot.insert(index, iteration);
                self.emit(index, monitors, estimate, image_stats, Some(iteration))
            } else {
                Ok(())
            };
            keep_first(&mut first_error, monitors, result);
        }
        first_error.map_or(Ok(()), Err)
    }
}
