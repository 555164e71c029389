//! Error type shared by every stage of the restoration pipeline.
//!
//! Variants are grouped the way callers react to them: configuration problems are
//! reported before any iteration runs, numeric/backend problems end a run in the
//! `Failed` state, and output problems surface from the dispatch stage.

use crate::signal::Dims;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeconvolutionError {
    // configuration
    #[error("unknown FFT backend \"{0}\"")]
    UnknownBackend(String),
    #[error("FFT backend {0} is not installed")]
    BackendNotInstalled(&'static str),
    #[error("incompatible sizes: {what} is {actual} but must fit in {limit}")]
    IncompatibleSize {
        what: &'static str,
        actual: Dims,
        limit: Dims,
    },
    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: &'static str, detail: String },
    #[error("signal {0} is empty")]
    EmptySignal(String),

    // numeric / backend
    #[error("FFT backend {0} used before initialization")]
    NotInitialized(&'static str),
    #[error("{backend} is bound to {expected}, got a signal of {actual}")]
    SizeMismatch {
        backend: &'static str,
        expected: Dims,
        actual: Dims,
    },
    #[error("FFT backend {backend} failed: {detail}")]
    Backend {
        backend: &'static str,
        detail: String,
    },

    // padding
    #[error("cannot crop: {0}")]
    PaddingState(String),

    // outputs
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("npy encoding failed: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

impl DeconvolutionError {
    /// `true` for errors that must be reported while a run is still being set up.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeconvolutionError::UnknownBackend(_)
                | DeconvolutionError::BackendNotInstalled(_)
                | DeconvolutionError::IncompatibleSize { .. }
                | DeconvolutionError::InvalidParameter { .. }
                | DeconvolutionError::EmptySignal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeconvolutionError>;
