//! The contract restoration algorithms implement to run under the
//! [`Controller`](crate::controller::Controller).
//!
//! An algorithm only supplies the per-iteration update. The controller owns padding,
//! apodization, the transform backend, statistics, cancellation and output dispatch,
//! and hands the algorithm a [`Workspace`] holding the prepared volumes.
//!
//! # Algorithm kinds
//!
//! * **Direct**: one closed-form step. The controller calls [`Algorithm::iterate`] exactly
//!   once and the run ends as `Converged`.
//! * **Iterative**: [`Algorithm::iterate`] is called until the budget is spent, a stopping
//!   criterion holds, or [`Algorithm::has_converged`] returns `true`.
//!
//! **Example**:
//! ```rust
//! use psf_deconvolution::algorithms::{Algorithm, AlgorithmConfig, AlgorithmKind, Workspace};
//! use psf_deconvolution::error::Result;
//! use psf_deconvolution::signal::RealSignal;
//!
//! #[derive(Debug)]
//! struct Passthrough;
//!
//! impl Algorithm for Passthrough {
//!     fn config(&self) -> AlgorithmConfig {
//!         AlgorithmConfig {
//!             name: "Passthrough".to_string(),
//!             description: "Returns the observed image.".to_string(),
//!             hyperlink: None,
//!             kind: AlgorithmKind::Direct,
//!         }
//!     }
//!
//!     fn iterate(
//!         &mut self,
//!         workspace: &mut Workspace,
//!         _estimate: &RealSignal,
//!         _iteration: usize,
//!     ) -> Result<RealSignal> {
//!         Ok(workspace.image.duplicate("passthrough"))
//!     }
//! }
//! ```

use crate::error::Result;
use crate::fft::FftBackend;
use crate::monitor::Monitors;
use crate::signal::{ComplexSignal, RealSignal};
use std::fmt::Debug;

/// Transfer-function product of the image with the PSF.
pub mod convolution;

/// Forward then inverse transform of the image.
pub mod identity;

pub use convolution::Convolution;
pub use identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Direct,
    Iterative,
}

/// Metadata of an algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmConfig {
    pub name: String,
    pub description: String,
    /// An optional DOI or reference link, with an optional label.
    pub hyperlink: Option<(Option<String>, String)>,
    pub kind: AlgorithmKind,
}

/// Everything an algorithm may use during one run.
///
/// `image` is the padded and apodized observation, `psf` the prepared PSF of the same
/// size (centered on the origin, unit sum). `fft` is initialized for that size.
#[derive(Debug)]
pub struct Workspace<'a> {
    pub fft: &'a mut dyn FftBackend,
    pub image: &'a RealSignal,
    pub psf: &'a RealSignal,
    pub monitors: &'a Monitors,
}

impl Workspace<'_> {
    /// Optical transfer function: the spectrum of the prepared PSF.
    pub fn otf(&mut self) -> Result<ComplexSignal> {
        let mut otf = self.fft.transform(self.psf)?;
        otf.name = format!("otf({})", self.psf.name);
        Ok(otf)
    }
}

pub trait Algorithm: Send + Debug {
    fn config(&self) -> AlgorithmConfig;

    /// Rejects invalid parameters before any work is done.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// The first estimate. Defaults to a copy of the observed image.
    fn initialize(&mut self, workspace: &mut Workspace) -> Result<RealSignal> {
        Ok(workspace.image.duplicate(format!("x0({})", workspace.image.name)))
    }

    /// Computes the next estimate from `estimate`. `iteration` starts at 1.
    fn iterate(
        &mut self,
        workspace: &mut Workspace,
        estimate: &RealSignal,
        iteration: usize,
    ) -> Result<RealSignal>;

    /// Algorithm-specific convergence test, evaluated after every iteration.
    fn has_converged(&self, _stats: &crate::controller::IterationStats) -> bool {
        false
    }
}
