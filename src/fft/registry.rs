//! Process-wide list of transform backends.
//!
//! The registry is built on first use and never torn down. It only describes backends;
//! every run creates its own instance through [`create`] so that no instance is shared
//! between runs bound to different sizes.
//!
//! ```rust
//! use psf_deconvolution::fft::registry::{self, BackendSelection};
//! use psf_deconvolution::monitor::Monitors;
//!
//! let fastest = registry::fastest();
//! let fft = registry::create(&BackendSelection::Fastest, &Monitors::none()).unwrap();
//! assert_eq!(fft.kind(), fastest);
//! ```

use crate::error::{DeconvolutionError, Result};
use crate::fft::{BackendKind, FftBackend};
use crate::monitor::Monitors;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// What the registry knows about one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub name: &'static str,
    pub installed: bool,
    pub multithreaded: bool,
}

#[derive(Debug)]
pub struct FftRegistry {
    backends: Vec<BackendInfo>,
}

impl FftRegistry {
    fn discover() -> Self {
        let backends: Vec<BackendInfo> = BackendKind::PRIORITY
            .iter()
            .map(|&kind| BackendInfo {
                kind,
                name: kind.name(),
                installed: kind.installed(),
                multithreaded: kind.is_multithreaded(),
            })
            .collect();
        for b in &backends {
            log::debug!(
                "FFT backend {}: {}",
                b.name,
                if b.installed {
                    "installed"
                } else {
                    "not installed"
                }
            );
        }
        FftRegistry { backends }
    }

    /// Every known backend in priority order, installed or not.
    pub fn backends(&self) -> &[BackendInfo] {
        &self.backends
    }
}

impl<'a> IntoIterator for &'a FftRegistry {
    type Item = &'a BackendInfo;
    type IntoIter = std::slice::Iter<'a, BackendInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.backends.iter()
    }
}

pub static FFT_REGISTRY: Lazy<FftRegistry> = Lazy::new(FftRegistry::discover);

/// How a run picks its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendSelection {
    /// The highest-priority installed backend.
    Fastest,
    /// Exactly this backend, or a configuration error.
    Named(String),
    /// This backend if installed, else the pure DFT fallback.
    NamedOrFallback(String),
}

impl Default for BackendSelection {
    fn default() -> Self {
        BackendSelection::Fastest
    }
}

/// Installed backends, fastest first.
pub fn installed() -> Vec<BackendKind> {
    FFT_REGISTRY
        .into_iter()
        .filter(|b| b.installed)
        .map(|b| b.kind)
        .collect()
}

/// The highest-priority installed backend. The DFT is always installed.
pub fn fastest() -> BackendKind {
    installed().first().copied().unwrap_or(BackendKind::Dft)
}

/// Looks a backend up by name, ignoring case. Does not check installation.
pub fn by_name(name: &str) -> Result<BackendKind> {
    FFT_REGISTRY
        .into_iter()
        .find(|b| b.name.eq_ignore_ascii_case(name.trim()))
        .map(|b| b.kind)
        .ok_or_else(|| DeconvolutionError::UnknownBackend(name.to_string()))
}

fn create_named(name: &str) -> Result<Box<dyn FftBackend>> {
    let kind = by_name(name)?;
    if !kind.installed() {
        return Err(DeconvolutionError::BackendNotInstalled(kind.name()));
    }
    kind.create()
}

/// Creates a fresh, uninitialized backend instance.
pub fn create(selection: &BackendSelection, monitors: &Monitors) -> Result<Box<dyn FftBackend>> {
    match selection {
        BackendSelection::Fastest => fastest().create(),
        BackendSelection::Named(name) => create_named(name),
        BackendSelection::NamedOrFallback(name) => match create_named(name) {
            Ok(fft) => Ok(fft),
            Err(err) => {
                monitors.error(&format!("{err}; falling back to {}", BackendKind::Dft));
                BackendKind::Dft.create()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_always_installed() {
        let kinds = installed();
        assert_eq!(kinds.last(), Some(&BackendKind::Dft));
        assert!(kinds.contains(&BackendKind::RustFft));
        assert_eq!(FFT_REGISTRY.backends().len(), 3);
    }

    #[test]
    fn test_fastest_follows_priority() {
        let expected = if cfg!(feature = "realfft") {
            BackendKind::RealFft
        } else {
            BackendKind::RustFft
        };
        assert_eq!(fastest(), expected);
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        assert_eq!(by_name("rustfft").unwrap(), BackendKind::RustFft);
        assert_eq!(by_name("DFT").unwrap(), BackendKind::Dft);
        assert!(matches!(
            by_name("FFTW3"),
            Err(DeconvolutionError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_unknown_name_is_a_configuration_error() {
        let err = create(&BackendSelection::Named("nope".into()), &Monitors::none()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_explicit_fallback_request() {
        let fft = create(
            &BackendSelection::NamedOrFallback("nope".into()),
            &Monitors::none(),
        )
        .unwrap();
        assert_eq!(fft.kind(), BackendKind::Dft);
        assert!(fft.dims().is_none());
    }
}
