//! Fourier transforms of 3D volumes.
//!
//! All backends implement [`FftBackend`] with the same numeric convention: the forward
//! transform is unnormalized and returns the full `nx * ny * nz` complex spectrum, the
//! inverse scales by `1 / (nx * ny * nz)` and keeps the real part. A backend must be
//! bound to a size with [`FftBackend::initialize`] before use; transforming a signal of
//! any other size is rejected.
//!
//! # Backends
//!
//! * **RealFFT**: real-to-complex along x with Hermitian completion, complex along y and
//!   z. Highest priority, only present when built with the `realfft` feature.
//! * **RustFFT**: complex transforms per line, parallelized over lines.
//! * **DFT**: dependency-free fallback, always installed.
//!
//! Use the [`registry`] to list installed backends or pick the fastest one.

use crate::error::{DeconvolutionError, Result};
use crate::monitor::Monitors;
use crate::signal::{ComplexSignal, Dims, RealSignal};
use std::fmt::{Debug, Display, Formatter};

/// Pure radix-2 / direct DFT fallback.
pub mod dft;

/// Hermitian real-to-complex backend built on `realfft`.
#[cfg(feature = "realfft")]
pub mod real_fft;

/// Backend registry and selection policy.
pub mod registry;

/// Line-parallel complex backend built on `rustfft`.
pub mod rust_fft;

/// How a backend walks the axes of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separability {
    /// One routine transforms all three axes of the whole volume.
    Joint3D,
    /// Each xy-plane is transformed on its own, then every z-line.
    XYThenZ,
}

/// The closed set of transform backends, in decreasing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    RealFft,
    RustFft,
    Dft,
}

impl BackendKind {
    /// Every backend known to this build, fastest first.
    pub const PRIORITY: [BackendKind; 3] =
        [BackendKind::RealFft, BackendKind::RustFft, BackendKind::Dft];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::RealFft => "RealFFT",
            BackendKind::RustFft => "RustFFT",
            BackendKind::Dft => "DFT",
        }
    }

    pub fn installed(&self) -> bool {
        match self {
            BackendKind::RealFft => cfg!(feature = "realfft"),
            BackendKind::RustFft | BackendKind::Dft => true,
        }
    }

    pub fn is_multithreaded(&self) -> bool {
        !matches!(self, BackendKind::Dft)
    }

    pub fn separability(&self) -> Separability {
        match self {
            BackendKind::Dft => Separability::Joint3D,
            BackendKind::RealFft | BackendKind::RustFft => Separability::XYThenZ,
        }
    }

    /// A fresh, uninitialized instance.
    pub fn create(&self) -> Result<Box<dyn FftBackend>> {
        match self {
            #[cfg(feature = "realfft")]
            BackendKind::RealFft => Ok(Box::new(real_fft::RealFftBackend::new())),
            #[cfg(not(feature = "realfft"))]
            BackendKind::RealFft => Err(DeconvolutionError::BackendNotInstalled(self.name())),
            BackendKind::RustFft => Ok(Box::new(rust_fft::RustFftBackend::new())),
            BackendKind::Dft => Ok(Box::new(dft::DftBackend::new())),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A forward/inverse transform bound to one volume size.
pub trait FftBackend: Send + Debug {
    fn kind(&self) -> BackendKind;

    /// The size this instance is bound to, if any.
    fn dims(&self) -> Option<Dims>;

    /// Binds the backend to `dims`, replacing any previous binding.
    fn initialize(&mut self, monitors: &Monitors, dims: Dims) -> Result<()>;

    /// Forward transform into a caller-provided buffer of the bound size.
    fn transform_into(&mut self, input: &RealSignal, output: &mut ComplexSignal) -> Result<()>;

    /// Inverse transform into a caller-provided buffer of the bound size.
    fn inverse_into(&mut self, input: &ComplexSignal, output: &mut RealSignal) -> Result<()>;

    /// Forward transform into a newly allocated spectrum.
    fn transform(&mut self, input: &RealSignal) -> Result<ComplexSignal> {
        let dims = check_bound(self.kind(), self.dims(), input.dims())?;
        let mut output = ComplexSignal::zeros(format!("fft({})", input.name), dims);
        self.transform_into(input, &mut output)?;
        Ok(output)
    }

    /// Inverse transform into a newly allocated volume.
    fn inverse(&mut self, input: &ComplexSignal) -> Result<RealSignal> {
        let dims = check_bound(self.kind(), self.dims(), input.dims())?;
        let mut output = RealSignal::zeros(format!("ifft({})", input.name), dims);
        self.inverse_into(input, &mut output)?;
        Ok(output)
    }
}

/// Verifies that a backend is initialized and that `actual` matches its binding.
pub(crate) fn check_bound(kind: BackendKind, bound: Option<Dims>, actual: Dims) -> Result<Dims> {
    match bound {
        None => Err(DeconvolutionError::NotInitialized(kind.name())),
        Some(expected) if expected != actual => Err(DeconvolutionError::SizeMismatch {
            backend: kind.name(),
            expected,
            actual,
        }),
        Some(expected) => Ok(expected),
    }
}

/// Checks both sides of a transform call against the binding.
pub(crate) fn check_pair(
    kind: BackendKind,
    bound: Option<Dims>,
    input: Dims,
    output: Dims,
) -> Result<Dims> {
    let dims = check_bound(kind, bound, input)?;
    check_bound(kind, bound, output)?;
    Ok(dims)
}

pub(crate) fn announce(monitors: &Monitors, kind: BackendKind, dims: Dims) {
    monitors.log(&format!(
        "{} initialized for {} ({:?}, {})",
        kind.name(),
        dims,
        kind.separability(),
        if kind.is_multithreaded() {
            "multi-threaded"
        } else {
            "single-threaded"
        }
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use approx::assert_abs_diff_eq;

    fn relative_error(a: &RealSignal, b: &RealSignal) -> f64 {
        let scale = b.stats().norm2.max(1e-12);
        a.distance(b) / scale
    }

    fn installed() -> Vec<BackendKind> {
        registry::installed()
    }

    #[test]
    fn test_round_trip_every_backend_and_size() {
        // 16^3 conforms to every strategy, 9x6x5 needs padding, 12x10x3 mixes radices
        for dims in [
            Dims::new(16, 16, 16),
            Dims::new(9, 6, 5),
            Dims::new(12, 10, 3),
            Dims::new(1, 1, 1),
        ] {
            let signal = synthetic::ramp(dims);
            for kind in installed() {
                let mut fft = kind.create().unwrap();
                fft.initialize(&Monitors::none(), dims).unwrap();
                let spectrum = fft.transform(&signal).unwrap();
                let back = fft.inverse(&spectrum).unwrap();
                let err = relative_error(&back, &signal);
                assert!(err < 1e-4, "{kind} on {dims}: relative error {err}");
            }
        }
    }

    #[test]
    fn test_backends_agree_on_spectrum_magnitude() {
        let dims = Dims::new(16, 16, 16);
        let signal = synthetic::ramp(dims);
        let reference = {
            let mut fft = BackendKind::Dft.create().unwrap();
            fft.initialize(&Monitors::none(), dims).unwrap();
            fft.transform(&signal).unwrap().magnitude()
        };
        let peak = reference.stats().max;
        for kind in installed() {
            let mut fft = kind.create().unwrap();
            fft.initialize(&Monitors::none(), dims).unwrap();
            let magnitude = fft.transform(&signal).unwrap().magnitude();
            for (a, b) in magnitude.data().iter().zip(reference.data().iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = peak * 1e-4);
            }
        }
    }

    #[test]
    fn test_known_analytic_spectrum() {
        // a single cosine along x has two spectral peaks of height N/2
        let dims = Dims::new(16, 16, 16);
        let k = 3;
        let signal = RealSignal::from_fn("cos", dims, |x, _, _| {
            (2.0 * std::f32::consts::PI * (k * x) as f32 / 16.0).cos()
        });
        let expected = dims.len() as f32 / 2.0;
        for kind in installed() {
            let mut fft = kind.create().unwrap();
            fft.initialize(&Monitors::none(), dims).unwrap();
            let spectrum = fft.transform(&signal).unwrap();
            assert_abs_diff_eq!(spectrum.get(k, 0, 0).re, expected, epsilon = 1e-2);
            assert_abs_diff_eq!(spectrum.get(16 - k, 0, 0).re, expected, epsilon = 1e-2);
            assert_abs_diff_eq!(spectrum.get(0, 0, 0).norm(), 0.0, epsilon = 1e-2);
            assert_abs_diff_eq!(spectrum.get(k, 1, 0).norm(), 0.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_use_before_initialize_fails_fast() {
        for kind in installed() {
            let mut fft = kind.create().unwrap();
            let signal = synthetic::ramp(Dims::new(4, 4, 4));
            let err = fft.transform(&signal).unwrap_err();
            assert!(matches!(err, DeconvolutionError::NotInitialized(_)));
        }
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        for kind in installed() {
            let mut fft = kind.create().unwrap();
            fft.initialize(&Monitors::none(), Dims::new(8, 8, 8)).unwrap();
            let signal = synthetic::ramp(Dims::new(8, 8, 4));
            assert!(matches!(
                fft.transform(&signal),
                Err(DeconvolutionError::SizeMismatch { .. })
            ));
            let mut wrong = RealSignal::zeros("out", Dims::new(4, 8, 8));
            let spectrum = ComplexSignal::zeros("s", Dims::new(8, 8, 8));
            assert!(fft.inverse_into(&spectrum, &mut wrong).is_err());
        }
    }

    #[test]
    fn test_reinitialize_replaces_binding() {
        let mut fft = BackendKind::RustFft.create().unwrap();
        fft.initialize(&Monitors::none(), Dims::new(8, 8, 8)).unwrap();
        fft.initialize(&Monitors::none(), Dims::new(6, 4, 2)).unwrap();
        assert_eq!(fft.dims(), Some(Dims::new(6, 4, 2)));
        let signal = synthetic::ramp(Dims::new(6, 4, 2));
        assert!(fft.transform(&signal).is_ok());
    }

    #[test]
    fn test_preallocated_buffers_are_reused() {
        let dims = Dims::new(8, 6, 4);
        let signal = synthetic::ramp(dims);
        for kind in installed() {
            let mut fft = kind.create().unwrap();
            fft.initialize(&Monitors::none(), dims).unwrap();
            let mut spectrum = ComplexSignal::zeros("buffer", dims);
            let mut back = RealSignal::zeros("buffer", dims);
            for _ in 0..2 {
                fft.transform_into(&signal, &mut spectrum).unwrap();
                fft.inverse_into(&spectrum, &mut back).unwrap();
            }
            assert_eq!(spectrum.name, "buffer");
            assert!(relative_error(&back, &signal) < 1e-4);
        }
    }
}
