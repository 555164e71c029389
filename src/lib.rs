//! Frequency-domain restoration of 3D volumes degraded by a known point-spread function.
//!
//! A [`Controller`] runs an [`Algorithm`] on an observed image and a PSF. It pads and
//! apodizes the image, prepares the PSF, drives the iterations on a pluggable FFT
//! backend and dispatches the requested [`Output`]s along the way.
//!
//! ```rust
//! use psf_deconvolution::{synthetic, Controller, Dims, Identity, Monitors, RunState};
//!
//! let image = synthetic::beads(Dims::new(32, 32, 16), 8, 2.0, 1.0);
//! let psf = synthetic::gaussian_psf(Dims::new(9, 9, 9), 1.0, 1.5);
//! let mut controller = Controller::new().with_monitors(Monitors::none());
//! let report = controller.run(&mut Identity::direct(), &image, &psf, None).unwrap();
//! assert_eq!(report.state, RunState::Converged);
//! ```

pub mod algorithms;
pub mod apodization;
pub mod config;
pub mod controller;
pub mod error;
pub mod fft;
pub mod monitor;
pub mod output;
pub mod padding;
pub mod range;
pub mod signal;
pub mod synthetic;

pub use algorithms::{Algorithm, AlgorithmConfig, AlgorithmKind, Convolution, Identity};
pub use controller::{Constraint, Controller, IterationStats, RunReport, RunState, Stage};
pub use error::{DeconvolutionError, Result};
pub use fft::registry::{BackendSelection, FFT_REGISTRY};
pub use fft::{BackendKind, FftBackend};
pub use monitor::{Monitor, Monitors};
pub use output::{Action, Dynamic, Output, SampleType, View};
pub use padding::{PadStrategy, Padding};
pub use signal::{ComplexSignal, Dims, RealSignal, SignalStats};
