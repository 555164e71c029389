//! The iteration state machine every algorithm runs under.
//!
//! ```text
//! Initialized ──> Running ──> Converged
//!                         ├─> IterationLimitReached
//!                         ├─> Cancelled
//!                         └─> Failed
//! ```
//!
//! While `Initialized`, the inputs and configuration are checked; problems found here
//! are returned as `Err` and nothing runs. Once `Running`, the image is padded and
//! apodized, the PSF prepared and the backend initialized for the working size. Each
//! iteration then computes a new estimate, applies the constraint, measures it, and
//! dispatches the snapshot outputs due at that iteration. Cancellation is checked at the
//! top of every iteration only. Every terminal state ends with a final crop and a
//! closing dispatch pass. A failure after setup does not return `Err`: the report
//! carries the `Failed` state, the stage that failed and a reason.

use crate::algorithms::{Algorithm, AlgorithmKind, Workspace};
use crate::apodization::Apodization;
use crate::error::{DeconvolutionError, Result};
use crate::fft::registry::{self, BackendSelection};
use crate::fft::{BackendKind, FftBackend};
use crate::monitor::Monitors;
use crate::output::{Dispatch, ImageProvider, NullViewer, Output, OutputDispatcher};
use crate::padding::Padding;
use crate::signal::{Dims, RealSignal, SignalStats};
use cancellable_loops::{for_each_cancellable, CancelFlag, LoopExit};
use chrono::{DateTime, Utc};
use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initialized,
    Running,
    Converged,
    IterationLimitReached,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Initialized | RunState::Running)
    }

    /// `Converged` and `IterationLimitReached`.
    pub fn is_success(&self) -> bool {
        matches!(self, RunState::Converged | RunState::IterationLimitReached)
    }
}

/// Where in a run something happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Psf,
    Transform,
    Initialization,
    Iteration(usize),
    Crop,
    Output,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Psf => write!(f, "PSF preparation"),
            Stage::Transform => write!(f, "transform initialization"),
            Stage::Initialization => write!(f, "algorithm initialization"),
            Stage::Iteration(i) => write!(f, "iteration {i}"),
            Stage::Crop => write!(f, "crop"),
            Stage::Output => write!(f, "output dispatch"),
        }
    }
}

/// Applied to every new estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Constraint {
    #[default]
    None,
    NonNegative,
    Clipped { min: f32, max: f32 },
}

impl Constraint {
    pub fn apply(&self, mut signal: RealSignal) -> RealSignal {
        match *self {
            Constraint::None => {}
            Constraint::NonNegative => signal.data_mut().par_mapv_inplace(|v| v.max(0.0)),
            Constraint::Clipped { min, max } => {
                signal.data_mut().par_mapv_inplace(|v| v.clamp(min, max))
            }
        }
        signal
    }
}

/// Measurements of one iteration's (cropped) estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    pub elapsed_ms: f64,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub stdev: f32,
    /// `‖xₖ − xₖ₋₁‖₂ / ‖xₖ₋₁‖₂` on the working volume.
    pub residu: f64,
    pub rmse: Option<f64>,
    /// dB
    pub snr: Option<f64>,
    /// dB
    pub psnr: Option<f64>,
}

impl IterationStats {
    fn measure(
        iteration: usize,
        elapsed: Duration,
        estimate: &RealSignal,
        residu: f64,
        reference: Option<(&RealSignal, &SignalStats)>,
    ) -> Self {
        let stats = estimate.stats();
        let (rmse, snr, psnr) = match reference {
            Some((reference, ref_stats)) => {
                let d = estimate.distance(reference);
                let mse = d * d / estimate.dims().len() as f64;
                let peak = ref_stats.max.abs().max(ref_stats.min.abs()) as f64;
                (
                    Some(mse.sqrt()),
                    Some(decibels(ref_stats.norm2 * ref_stats.norm2, d * d)),
                    Some(decibels(peak * peak, mse)),
                )
            }
            None => (None, None, None),
        };
        IterationStats {
            iteration,
            elapsed_ms: elapsed.as_secs_f64() * 1e3,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            stdev: stats.stdev,
            residu,
            rmse,
            snr,
            psnr,
        }
    }
}

fn decibels(signal: f64, noise: f64) -> f64 {
    if noise == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (signal / noise).log10()
    }
}

fn relative_residu(previous: &RealSignal, next: &RealSignal) -> f64 {
    let norm = previous.stats().norm2;
    let d = next.distance(previous);
    if norm > 0.0 {
        d / norm
    } else if d == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// The outcome of [`Controller::run`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    /// The failing stage, or where a cancelled run stopped.
    pub stage: Option<Stage>,
    /// Display-ready explanation for any state but `Converged`.
    pub reason: Option<String>,
    /// The final estimate, cropped to the image size.
    pub output: Option<RealSignal>,
    pub stats: Vec<IterationStats>,
    pub iterations: usize,
    pub dispatches: Vec<Dispatch>,
    pub backend: BackendKind,
    pub started: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Embeds `psf` centered in a zero volume of `working` size, normalizes it to unit sum
/// and moves its center voxel `⌊n/2⌋` to the origin.
pub fn prepare_psf(monitors: &Monitors, psf: &RealSignal, working: Dims) -> Result<RealSignal> {
    let dims = psf.dims();
    if !dims.fits_in(&working) {
        return Err(DeconvolutionError::IncompatibleSize {
            what: "PSF",
            actual: dims,
            limit: working,
        });
    }
    let offset = [
        (working.nx - dims.nx) / 2,
        (working.ny - dims.ny) / 2,
        (working.nz - dims.nz) / 2,
    ];
    let mut embedded = Array3::<f32>::zeros(working.shape());
    embedded
        .slice_mut(s![
            offset[2]..offset[2] + dims.nz,
            offset[1]..offset[1] + dims.ny,
            offset[0]..offset[0] + dims.nx
        ])
        .assign(psf.data());

    let sum = psf.sum();
    if sum == 0.0 {
        log::warn!("PSF {} sums to zero, not normalized", psf.name);
        monitors.error(&format!("PSF {} sums to zero", psf.name));
    } else {
        let scale = (1.0 / sum) as f32;
        embedded.par_mapv_inplace(|v| v * scale);
    }

    let [cx, cy, cz] = dims.center();
    let (cx, cy, cz) = (offset[0] + cx, offset[1] + cy, offset[2] + cz);
    let shifted = Array3::from_shape_fn(working.shape(), |(z, y, x)| {
        embedded[[
            (z + cz) % working.nz,
            (y + cy) % working.ny,
            (x + cx) % working.nx,
        ]]
    });
    RealSignal::from_array(format!("psf({})", psf.name), shifted)
}

type Staged<T> = std::result::Result<T, (Stage, DeconvolutionError)>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> Staged<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> Staged<T> {
        self.map_err(|e| (stage, e))
    }
}

enum Stop {
    Converged,
    TimeLimit,
    Failed(Stage, DeconvolutionError),
}

/// Owns the configuration of runs and drives them one at a time.
///
/// Each call to [`run`](Self::run) creates its own backend instance, so controllers can
/// be used from different threads independently.
#[derive(Debug)]
pub struct Controller {
    backend: BackendSelection,
    padding: Padding,
    apodization: Apodization,
    iterations: usize,
    residu: Option<f64>,
    time_limit: Option<Duration>,
    constraint: Constraint,
    outputs: Vec<Output>,
    directory: PathBuf,
    provider: Arc<dyn ImageProvider>,
    monitors: Monitors,
    cancel: CancelFlag,
    state: RunState,
}

impl Default for Controller {
    fn default() -> Self {
        Controller {
            backend: BackendSelection::Fastest,
            padding: Padding::default(),
            apodization: Apodization::default(),
            iterations: 10,
            residu: None,
            time_limit: None,
            constraint: Constraint::None,
            outputs: Vec::new(),
            directory: PathBuf::from("."),
            provider: Arc::new(NullViewer),
            monitors: Monitors::logging(),
            cancel: CancelFlag::new(),
            state: RunState::Initialized,
        }
    }
}

impl Controller {
    pub fn new() -> Self {
        Controller::default()
    }

    pub fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_apodization(mut self, apodization: Apodization) -> Self {
        self.apodization = apodization;
        self
    }

    /// Iteration budget of iterative algorithms; direct ones always run once.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Stop as `Converged` once the relative residu drops below `threshold`.
    pub fn with_residu(mut self, threshold: f64) -> Self {
        self.residu = Some(threshold);
        self
    }

    /// Stop as `IterationLimitReached` once `limit` has elapsed.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Directory saved outputs are written to.
    pub fn with_directory(mut self, directory: &Path) -> Self {
        self.directory = directory.to_path_buf();
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_monitors(mut self, monitors: Monitors) -> Self {
        self.monitors = monitors;
        self
    }

    /// A handle that cancels the current (or next) run at its next iteration boundary.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn padding(&self) -> &Padding {
        &self.padding
    }

    /// Pads and apodizes the image, prepares the PSF and binds the backend.
    fn prepare(
        &mut self,
        monitors: &Monitors,
        fft: &mut dyn FftBackend,
        image: &RealSignal,
        psf: &RealSignal,
        working: Dims,
    ) -> Staged<(RealSignal, RealSignal)> {
        let padded = self.padding.pad(monitors, image);
        let apodized = self.apodization.apply(monitors, padded);
        let prepared = prepare_psf(monitors, psf, working).at(Stage::Psf)?;
        fft.initialize(monitors, working).at(Stage::Transform)?;
        Ok((apodized, prepared))
    }

    /// Runs `algorithm` on `image` blurred by `psf`. `reference`, if given, must have
    /// the image's size and is used for error metrics only.
    pub fn run(
        &mut self,
        algorithm: &mut dyn Algorithm,
        image: &RealSignal,
        psf: &RealSignal,
        reference: Option<&RealSignal>,
    ) -> Result<RunReport> {
        let started = Utc::now();
        let clock = Instant::now();
        let monitors = self.monitors.clone();
        self.state = RunState::Initialized;

        // configuration
        let config = algorithm.config();
        algorithm.validate()?;
        self.apodization.validate()?;
        let budget = match config.kind {
            AlgorithmKind::Direct => 1,
            AlgorithmKind::Iterative => self.iterations,
        };
        if budget == 0 {
            return Err(DeconvolutionError::InvalidParameter {
                name: "iterations",
                detail: format!("{} needs at least one iteration", config.name),
            });
        }
        for signal in [Some(image), Some(psf), reference].into_iter().flatten() {
            if signal.dims().is_empty() {
                return Err(DeconvolutionError::EmptySignal(signal.name.clone()));
            }
        }
        if let Some(r) = reference {
            if r.dims() != image.dims() {
                return Err(DeconvolutionError::IncompatibleSize {
                    what: "reference",
                    actual: r.dims(),
                    limit: image.dims(),
                });
            }
        }
        let working = self.padding.padded_dims(image.dims());
        if !psf.dims().fits_in(&working) {
            return Err(DeconvolutionError::IncompatibleSize {
                what: "PSF",
                actual: psf.dims(),
                limit: working,
            });
        }
        let mut fft = registry::create(&self.backend, &monitors)?;
        let backend = fft.kind();

        self.state = RunState::Running;
        monitors.log(&format!(
            "{} on {} ({}), working size {working}, {backend}",
            config.name,
            image.name,
            image.dims()
        ));
        let image_stats = image.stats();
        let reference_stats = reference.map(|r| r.stats());
        let reference = reference.zip(reference_stats.as_ref());
        let mut dispatcher =
            OutputDispatcher::new(self.outputs.clone(), &self.directory, self.provider.clone());
        let mut stats: Vec<IterationStats> = Vec::new();

        let mut report = RunReport {
            state: RunState::Failed,
            stage: None,
            reason: None,
            output: None,
            stats: Vec::new(),
            iterations: 0,
            dispatches: Vec::new(),
            backend,
            started,
            elapsed: Duration::ZERO,
        };

        let (work_image, work_psf) =
            match self.prepare(&monitors, fft.as_mut(), image, psf, working) {
                Ok(prepared) => prepared,
                Err((stage, err)) => return Ok(self.conclude(report, stage, err, clock)),
            };
        let mut workspace = Workspace {
            fft: fft.as_mut(),
            image: &work_image,
            psf: &work_psf,
            monitors: &monitors,
        };
        let mut estimate = match algorithm.initialize(&mut workspace) {
            Ok(estimate) => estimate,
            Err(err) => return Ok(self.conclude(report, Stage::Initialization, err, clock)),
        };

        let padding = &self.padding;
        let constraint = self.constraint;
        let residu_threshold = self.residu;
        let time_limit = self.time_limit;
        let mut cropped: Option<RealSignal> = None;

        let exit = for_each_cancellable(1..=budget, self.cancel.as_atomic(), |iteration| {
            let next = match algorithm.iterate(&mut workspace, &estimate, iteration) {
                Ok(next) => constraint.apply(next),
                Err(err) => return ControlFlow::Break(Stop::Failed(Stage::Iteration(iteration), err)),
            };
            let residu = relative_residu(&estimate, &next);
            let current = match padding.crop(&monitors, &next) {
                Ok(current) => current,
                Err(err) => return ControlFlow::Break(Stop::Failed(Stage::Crop, err)),
            };
            let measured =
                IterationStats::measure(iteration, clock.elapsed(), &current, residu, reference);
            monitors.progress(
                &format!("{} iteration {iteration}/{budget}", config.name),
                100.0 * iteration as f32 / budget as f32,
            );
            if let Err(err) = dispatcher.snapshot(&monitors, iteration, &current, &image_stats) {
                return ControlFlow::Break(Stop::Failed(Stage::Output, err));
            }
            let converged = algorithm.has_converged(&measured)
                || residu_threshold.is_some_and(|threshold| residu < threshold);
            stats.push(measured);
            std::mem::replace(&mut estimate, next).release();
            if let Some(previous) = cropped.replace(current) {
                previous.release();
            }

            if config.kind == AlgorithmKind::Direct || converged {
                ControlFlow::Break(Stop::Converged)
            } else if time_limit.is_some_and(|limit| clock.elapsed() >= limit) {
                ControlFlow::Break(Stop::TimeLimit)
            } else {
                ControlFlow::Continue(())
            }
        });

        report.iterations = stats.len();
        let (mut state, mut stage, mut reason) = match exit {
            LoopExit::Completed => (RunState::IterationLimitReached, None, None),
            LoopExit::Stopped(Stop::Converged) => (RunState::Converged, None, None),
            LoopExit::Stopped(Stop::TimeLimit) => (
                RunState::IterationLimitReached,
                None,
                Some(format!("time limit reached after {} iterations", report.iterations)),
            ),
            LoopExit::Stopped(Stop::Failed(stage, err)) => {
                (RunState::Failed, Some(stage), Some(format!("{stage} failed: {err}")))
            }
            LoopExit::Cancelled { pending } => (
                RunState::Cancelled,
                Some(Stage::Iteration(pending)),
                Some(format!("cancelled before iteration {pending}")),
            ),
        };

        // closing pass
        let final_estimate = match cropped {
            Some(current) => Ok(current),
            None => self.padding.crop(&monitors, &estimate),
        };
        estimate.release();
        match final_estimate {
            Ok(output) => {
                if let Err(err) =
                    dispatcher.finish(&monitors, report.iterations, &output, &image_stats)
                {
                    if state != RunState::Failed {
                        state = RunState::Failed;
                        stage = Some(Stage::Output);
                        reason = Some(format!("{} failed: {err}", Stage::Output));
                    }
                }
                report.output = Some(output);
            }
            Err(err) => {
                if state != RunState::Failed {
                    state = RunState::Failed;
                    stage = Some(Stage::Crop);
                    reason = Some(format!("{} failed: {err}", Stage::Crop));
                }
            }
        }
        work_image.release();
        work_psf.release();

        report.state = state;
        report.stage = stage;
        report.reason = reason;
        report.stats = stats;
        report.dispatches = dispatcher.history().to_vec();
        report.elapsed = clock.elapsed();
        Ok(self.close(report))
    }

    /// Ends a run that failed before its first iteration.
    fn conclude(
        &mut self,
        mut report: RunReport,
        stage: Stage,
        err: DeconvolutionError,
        clock: Instant,
    ) -> RunReport {
        report.state = RunState::Failed;
        report.stage = Some(stage);
        report.reason = Some(format!("{stage} failed: {err}"));
        report.elapsed = clock.elapsed();
        self.close(report)
    }

    fn close(&mut self, report: RunReport) -> RunReport {
        self.state = report.state;
        match (report.state, &report.reason) {
            (RunState::Failed, Some(reason)) => self.monitors.error(reason),
            (state, Some(reason)) => self.monitors.log(&format!("{state:?}: {reason}")),
            (state, None) => self.monitors.log(&format!(
                "{state:?} after {} iterations in {:.2} s",
                report.iterations,
                report.elapsed.as_secs_f64()
            )),
        }
        if report.state == RunState::Cancelled {
            self.cancel.clear();
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{AlgorithmConfig, Identity};
    use crate::output::{Action, View};
    use crate::padding::PadStrategy;
    use crate::synthetic;
    use approx::assert_abs_diff_eq;

    /// Iterative algorithm that returns its estimate, optionally cancelling or failing
    /// at a given iteration.
    #[derive(Debug, Default)]
    struct Scripted {
        cancel_at: Option<(CancelFlag, usize)>,
        fail_at: Option<usize>,
        seen: Vec<usize>,
    }

    impl Algorithm for Scripted {
        fn config(&self) -> AlgorithmConfig {
            AlgorithmConfig {
                name: "Scripted".to_string(),
                description: String::new(),
                hyperlink: None,
                kind: AlgorithmKind::Iterative,
            }
        }

        fn iterate(
            &mut self,
            _workspace: &mut Workspace,
            estimate: &RealSignal,
            iteration: usize,
        ) -> Result<RealSignal> {
            self.seen.push(iteration);
            if self.fail_at == Some(iteration) {
                return Err(DeconvolutionError::Backend {
                    backend: "test",
                    detail: "boom".to_string(),
                });
            }
            if let Some((flag, at)) = &self.cancel_at {
                if *at == iteration {
                    flag.request();
                }
            }
            let mut next = estimate.duplicate("next");
            next.data_mut().mapv_inplace(|v| v + 1.0);
            Ok(next)
        }
    }

    fn quiet() -> Controller {
        Controller::new()
            .with_monitors(Monitors::none())
            .with_backend(BackendSelection::Named("RustFFT".into()))
    }

    fn small() -> (RealSignal, RealSignal) {
        let dims = Dims::new(8, 8, 4);
        (synthetic::ramp(dims), synthetic::gaussian_psf(dims, 1.0, 1.0))
    }

    fn snapshot_iterations(report: &RunReport, name: &str) -> Vec<Option<usize>> {
        report
            .dispatches
            .iter()
            .filter(|d| d.output == name)
            .map(|d| d.iteration)
            .collect()
    }

    #[test]
    fn test_identity_end_to_end_preserves_statistics() {
        let image = synthetic::beads(Dims::new(96, 80, 64), 16, 4.0, 10.0);
        let psf = synthetic::gaussian_psf(Dims::new(64, 64, 64), 2.0, 3.0);
        let mut controller = Controller::new()
            .with_monitors(Monitors::none())
            .with_padding(Padding::uniform(PadStrategy::Multiple2))
            .with_apodization(Apodization::default());
        let report = controller
            .run(&mut Identity::direct(), &image, &psf, None)
            .unwrap();

        assert_eq!(report.state, RunState::Converged);
        assert_eq!(report.iterations, 1);
        assert!(report.reason.is_none());
        let output = report.output.unwrap();
        assert_eq!(output.dims(), image.dims());
        let (a, b) = (output.stats(), image.stats());
        assert_abs_diff_eq!(a.mean, b.mean, epsilon = 1e-3);
        assert_abs_diff_eq!(a.min, b.min, epsilon = 5e-2);
        assert_abs_diff_eq!(a.max, b.max, epsilon = 5e-2);
    }

    #[test]
    fn test_identity_through_real_padding() {
        let image = synthetic::ramp(Dims::new(9, 7, 5));
        let psf = synthetic::gaussian_psf(Dims::new(5, 5, 5), 1.0, 1.0);
        let mut controller = quiet().with_padding(Padding::uniform(PadStrategy::Power2));
        let report = controller
            .run(&mut Identity::direct(), &image, &psf, Some(&image))
            .unwrap();
        let output = report.output.unwrap();
        assert_eq!(output.dims(), image.dims());
        assert!(output.distance(&image) / image.stats().norm2 < 1e-4);
        assert!(report.stats[0].rmse.unwrap() < 1e-3);
        assert!(report.stats[0].psnr.unwrap() > 60.0);
        assert_eq!(controller.padding().last_sizes().unwrap().1, Dims::new(16, 8, 8));
    }

    #[test]
    fn test_snapshots_follow_cadence_and_close_once() {
        let (image, psf) = small();
        let mut controller = quiet()
            .with_iterations(10)
            .with_output(Output::new(View::Mip, "every3").with_action(Action::Show).with_snapshot(3))
            .with_output(Output::new(View::Mip, "every5").with_action(Action::Show).with_snapshot(5))
            .with_output(Output::new(View::Mip, "final").with_action(Action::Show));
        let report = controller
            .run(&mut Scripted::default(), &image, &psf, None)
            .unwrap();

        assert_eq!(report.state, RunState::IterationLimitReached);
        assert_eq!(report.iterations, 10);
        assert_eq!(
            snapshot_iterations(&report, "every3"),
            vec![Some(3), Some(6), Some(9), Some(10)]
        );
        assert_eq!(snapshot_iterations(&report, "every5"), vec![Some(5), Some(10)]);
        assert_eq!(snapshot_iterations(&report, "final"), vec![None]);
        let order: Vec<usize> = report.stats.iter().map(|s| s.iteration).collect();
        assert_eq!(order, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_snapshot_observes_its_own_iteration() {
        let (image, psf) = small();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = quiet()
            .with_iterations(4)
            .with_directory(dir.path())
            .with_output(Output::new(View::Stack, "x").with_snapshot(2));
        let report = controller
            .run(&mut Scripted::default(), &image, &psf, None)
            .unwrap();
        assert_eq!(report.iterations, 4);
        let at2: Array3<f32> = ndarray_npy::read_npy(dir.path().join("x-2.npy")).unwrap();
        // each scripted iteration adds one
        assert_abs_diff_eq!(at2[[0, 0, 0]], image.get(0, 0, 0) + 2.0, epsilon = 1e-5);
        let at4: Array3<f32> = ndarray_npy::read_npy(dir.path().join("x-4.npy")).unwrap();
        assert_abs_diff_eq!(at4[[0, 0, 0]], image.get(0, 0, 0) + 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_cancellation_stops_at_next_boundary() {
        let (image, psf) = small();
        let mut controller = quiet()
            .with_iterations(10)
            .with_output(Output::new(View::Mip, "live").with_action(Action::Show).with_snapshot(1));
        let mut algorithm = Scripted {
            cancel_at: Some((controller.cancel_handle(), 4)),
            ..Default::default()
        };
        let report = controller.run(&mut algorithm, &image, &psf, None).unwrap();

        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(algorithm.seen, vec![1, 2, 3, 4]);
        assert_eq!(report.iterations, 4);
        assert_eq!(report.stage, Some(Stage::Iteration(5)));
        assert!(report.reason.is_some());
        assert_eq!(
            snapshot_iterations(&report, "live"),
            vec![Some(1), Some(2), Some(3), Some(4)]
        );
        assert!(report.output.is_some());
        assert!(!controller.cancel_handle().is_requested());
        assert_eq!(controller.state(), RunState::Cancelled);
    }

    #[test]
    fn test_failure_reports_stage_and_keeps_outputs() {
        let (image, psf) = small();
        let mut controller = quiet()
            .with_iterations(10)
            .with_output(Output::new(View::Mip, "live").with_action(Action::Show).with_snapshot(1));
        let mut algorithm = Scripted {
            fail_at: Some(3),
            ..Default::default()
        };
        let report = controller.run(&mut algorithm, &image, &psf, None).unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.stage, Some(Stage::Iteration(3)));
        let reason = report.reason.as_deref().unwrap();
        assert!(reason.contains("iteration 3"), "{reason}");
        assert!(reason.contains("boom"), "{reason}");
        assert_eq!(report.iterations, 2);
        assert_eq!(
            snapshot_iterations(&report, "live"),
            vec![Some(1), Some(2)]
        );
        let output = report.output.unwrap();
        assert_abs_diff_eq!(output.get(0, 0, 0), image.get(0, 0, 0) + 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_configuration_errors_fail_before_running() {
        let (image, _) = small();
        let big_psf = synthetic::gaussian_psf(Dims::new(16, 8, 4), 1.0, 1.0);
        let mut controller = quiet();
        let err = controller
            .run(&mut Identity::direct(), &image, &big_psf, None)
            .unwrap_err();
        assert!(matches!(err, DeconvolutionError::IncompatibleSize { .. }));
        assert_eq!(controller.state(), RunState::Initialized);

        let psf = synthetic::gaussian_psf(Dims::new(4, 4, 4), 1.0, 1.0);
        let mut controller = quiet().with_backend(BackendSelection::Named("cuFFT".into()));
        let err = controller
            .run(&mut Identity::direct(), &image, &psf, None)
            .unwrap_err();
        assert!(err.is_configuration());

        let wrong_reference = synthetic::ramp(Dims::new(4, 4, 4));
        let err = quiet()
            .run(&mut Identity::direct(), &image, &psf, Some(&wrong_reference))
            .unwrap_err();
        assert!(err.is_configuration());

        let err = quiet()
            .with_iterations(0)
            .run(&mut Scripted::default(), &image, &psf, None)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_volumes_are_rejected() {
        let (image, psf) = small();
        let empty = RealSignal::zeros("empty", Dims::new(0, 8, 4));
        let err = quiet()
            .run(&mut Identity::direct(), &empty, &psf, None)
            .unwrap_err();
        assert!(matches!(&err, DeconvolutionError::EmptySignal(name) if name == "empty"));

        let flat_psf = RealSignal::zeros("flat", Dims::new(4, 4, 0));
        let err = quiet()
            .run(&mut Identity::direct(), &image, &flat_psf, None)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_closing_pass_dispatches_past_a_failing_output() {
        let (image, psf) = small();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let mut controller = quiet()
            .with_directory(&blocker.join("out"))
            .with_output(Output::new(View::Stack, "saved"))
            .with_output(Output::new(View::Mip, "shown").with_action(Action::Show));
        let report = controller
            .run(&mut Identity::direct(), &image, &psf, None)
            .unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.stage, Some(Stage::Output));
        assert_eq!(snapshot_iterations(&report, "shown"), vec![None]);
        assert!(snapshot_iterations(&report, "saved").is_empty());
        assert!(report.output.is_some());
    }

    #[test]
    fn test_residu_threshold_converges() {
        let (image, psf) = small();
        let mut controller = quiet().with_iterations(10).with_residu(1e-3);
        let report = controller
            .run(&mut Identity::iterative(), &image, &psf, None)
            .unwrap();
        assert_eq!(report.state, RunState::Converged);
        assert_eq!(report.iterations, 1);
        assert!(report.stats[0].residu < 1e-3);
    }

    #[test]
    fn test_time_limit_ends_as_limit_reached() {
        let (image, psf) = small();
        let mut controller = quiet()
            .with_iterations(10)
            .with_time_limit(Duration::ZERO);
        let report = controller
            .run(&mut Scripted::default(), &image, &psf, None)
            .unwrap();
        assert_eq!(report.state, RunState::IterationLimitReached);
        assert_eq!(report.iterations, 1);
        assert!(report.reason.is_some());
    }

    #[test]
    fn test_non_negative_constraint() {
        let image = RealSignal::from_fn("signed", Dims::new(4, 4, 2), |x, _, _| x as f32 - 2.0);
        let psf = synthetic::gaussian_psf(Dims::new(4, 4, 2), 0.0, 0.0);
        let mut controller = quiet().with_constraint(Constraint::NonNegative);
        let report = controller
            .run(&mut Identity::direct(), &image, &psf, None)
            .unwrap();
        assert!(report.output.unwrap().stats().min >= 0.0);
    }

    #[test]
    fn test_prepared_psf_is_centered_on_origin() {
        let mut psf = RealSignal::zeros("delta", Dims::new(5, 5, 3));
        psf.set(2, 2, 1, 4.0);
        let prepared = prepare_psf(&Monitors::none(), &psf, Dims::new(8, 8, 4)).unwrap();
        assert_eq!(prepared.dims(), Dims::new(8, 8, 4));
        assert_abs_diff_eq!(prepared.get(0, 0, 0), 1.0);
        assert_abs_diff_eq!(prepared.sum(), 1.0, epsilon = 1e-6);

        let zero = RealSignal::zeros("zero", Dims::new(2, 2, 2));
        let prepared = prepare_psf(&Monitors::none(), &zero, Dims::new(4, 4, 4)).unwrap();
        assert_eq!(prepared.sum(), 0.0);
    }
}
