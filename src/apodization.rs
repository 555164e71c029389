//! Separable edge tapering applied before the forward transform.
//!
//! Each axis has its own [`Window`]; a voxel `(x, y, z)` is multiplied by
//! `wx(x, nx) * wy(y, ny) * wz(z, nz)`. When all three windows are
//! [`Window::Uniform`] the stage is skipped and the input is handed back untouched.

use crate::error::{DeconvolutionError, Result};
use crate::monitor::Monitors;
use crate::signal::RealSignal;
use ndarray::Zip;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A symmetric window over positions `0..n`, with weights in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Window {
    #[default]
    Uniform,
    Hann,
    Hamming,
    /// Flat top with cosine tapers over a fraction `alpha` of the axis.
    Tukey { alpha: f64 },
    Welch,
    /// Flat over `1 - beta` of the axis, cosine roll-off over the rest.
    RaisedCosine { beta: f64 },
}

impl Window {
    pub fn is_uniform(&self) -> bool {
        matches!(self, Window::Uniform)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Window::Tukey { alpha } if !(0.0..=1.0).contains(&alpha) => {
                Err(DeconvolutionError::InvalidParameter {
                    name: "tukey alpha",
                    detail: format!("{alpha} is outside [0, 1]"),
                })
            }
            Window::RaisedCosine { beta } if !(0.0..=1.0).contains(&beta) => {
                Err(DeconvolutionError::InvalidParameter {
                    name: "raised-cosine beta",
                    detail: format!("{beta} is outside [0, 1]"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Weight at position `x` of an axis of length `n`.
    pub fn weight(&self, x: usize, n: usize) -> f64 {
        if n <= 1 {
            return 1.0;
        }
        let last = (n - 1) as f64;
        let x = x as f64;
        match *self {
            Window::Uniform => 1.0,
            Window::Hann => 0.5 * (1.0 - (2.0 * PI * x / last).cos()),
            Window::Hamming => 0.54 - 0.46 * (2.0 * PI * x / last).cos(),
            Window::Tukey { alpha } => {
                if alpha <= 0.0 {
                    return 1.0;
                }
                let edge = alpha * last / 2.0;
                let d = x.min(last - x);
                if d >= edge {
                    1.0
                } else {
                    0.5 * (1.0 + (PI * (d / edge - 1.0)).cos())
                }
            }
            Window::Welch => {
                let u = (x - last / 2.0) / (last / 2.0);
                1.0 - u * u
            }
            Window::RaisedCosine { beta } => {
                if beta <= 0.0 {
                    return 1.0;
                }
                let v = ((x - last / 2.0) / last).abs() * (1.0 + beta);
                let flat = (1.0 - beta) / 2.0;
                if v <= flat {
                    1.0
                } else {
                    0.5 * (1.0 + (PI / beta * (v - flat)).cos())
                }
            }
        }
    }

    fn weights(&self, n: usize) -> Vec<f32> {
        (0..n).map(|i| self.weight(i, n) as f32).collect()
    }
}

/// One window per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Apodization {
    pub x: Window,
    pub y: Window,
    pub z: Window,
}

impl Apodization {
    /// The same window for x and y, another for z.
    pub fn new(xy: Window, z: Window) -> Self {
        Apodization { x: xy, y: xy, z }
    }

    pub fn is_uniform(&self) -> bool {
        self.x.is_uniform() && self.y.is_uniform() && self.z.is_uniform()
    }

    pub fn validate(&self) -> Result<()> {
        self.x.validate()?;
        self.y.validate()?;
        self.z.validate()
    }

    /// Tapers `signal` in place and returns it. A uniform configuration returns the
    /// signal as it came in.
    pub fn apply(&self, monitors: &Monitors, mut signal: RealSignal) -> RealSignal {
        if self.is_uniform() {
            return signal;
        }
        let dims = signal.dims();
        let wx = self.x.weights(dims.nx);
        let wy = self.y.weights(dims.ny);
        let wz = self.z.weights(dims.nz);
        Zip::indexed(signal.data_mut()).par_for_each(|(z, y, x), v| {
            *v *= wz[z] * wy[y] * wx[x];
        });
        monitors.log(&format!("apodized {} ({:?})", signal.name, self));
        signal.name = format!("apo({})", signal.name);
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Dims;
    use crate::synthetic;
    use approx::assert_abs_diff_eq;

    const ALL: [Window; 6] = [
        Window::Uniform,
        Window::Hann,
        Window::Hamming,
        Window::Tukey { alpha: 0.5 },
        Window::Welch,
        Window::RaisedCosine { beta: 0.4 },
    ];

    #[test]
    fn test_uniform_is_exact_identity() {
        let input = synthetic::ramp(Dims::new(9, 7, 5));
        let output = Apodization::default().apply(&Monitors::none(), input.clone());
        assert_eq!(output, input);
    }

    #[test]
    fn test_windows_are_symmetric_and_bounded() {
        for window in ALL {
            for n in [2, 7, 16] {
                for i in 0..n {
                    let w = window.weight(i, n);
                    assert!((0.0..=1.0 + 1e-12).contains(&w), "{window:?} {i}/{n}: {w}");
                    assert_abs_diff_eq!(w, window.weight(n - 1 - i, n), epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_single_voxel_axis_is_untouched() {
        for window in ALL {
            assert_eq!(window.weight(0, 1), 1.0);
        }
    }

    #[test]
    fn test_known_weights() {
        assert_abs_diff_eq!(Window::Hann.weight(0, 9), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Window::Hann.weight(4, 9), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Window::Hamming.weight(0, 9), 0.08, epsilon = 1e-12);
        assert_abs_diff_eq!(Window::Welch.weight(4, 9), 1.0, epsilon = 1e-12);
        let tukey = Window::Tukey { alpha: 0.5 };
        assert_abs_diff_eq!(tukey.weight(0, 9), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tukey.weight(3, 9), 1.0, epsilon = 1e-12);
        // alpha = 1 is a Hann window
        let full = Window::Tukey { alpha: 1.0 };
        for i in 0..9 {
            assert_abs_diff_eq!(full.weight(i, 9), Window::Hann.weight(i, 9), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_separable_product() {
        let apodization = Apodization::new(Window::Hann, Window::Welch);
        let dims = Dims::new(6, 5, 4);
        let ones = RealSignal::from_fn("ones", dims, |_, _, _| 1.0);
        let out = apodization.apply(&Monitors::none(), ones);
        assert_eq!(out.name, "apo(ones)");
        let expected = Window::Hann.weight(2, 6) * Window::Hann.weight(1, 5) * Window::Welch.weight(1, 4);
        assert_abs_diff_eq!(out.get(2, 1, 1) as f64, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_tukey_alpha_is_validated() {
        assert!(Window::Tukey { alpha: 1.5 }.validate().is_err());
        assert!(Apodization::new(Window::Tukey { alpha: -0.1 }, Window::Uniform)
            .validate()
            .is_err());
        assert!(Apodization::new(Window::Tukey { alpha: 0.3 }, Window::Hann)
            .validate()
            .is_ok());
    }
}
