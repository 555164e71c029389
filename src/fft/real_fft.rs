//! Real-to-complex transforms built on `realfft`.
//!
//! The forward transform computes only the `nx/2 + 1` non-redundant columns along x,
//! transforms those along y and z with `rustfft`, and completes the remaining columns
//! from Hermitian symmetry `X[-k] = conj(X[k])`. The inverse first folds its input
//! onto its Hermitian part `(X[k] + conj(X[-k])) / 2`, whose inverse is exactly the real
//! part of the full inverse, so any spectrum gives the same result as the complex
//! backends.

use crate::error::{DeconvolutionError, Result};
use crate::fft::rust_fft::{transform_columns, transform_depth, AxisPlans};
use crate::fft::{announce, check_pair, BackendKind, FftBackend};
use crate::monitor::Monitors;
use crate::signal::{ComplexSignal, Dims, RealSignal};
use ndarray::{Array3, Axis, Zip};
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rayon::prelude::*;
use rustfft::FftPlanner;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

struct Bound {
    dims: Dims,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    forward: AxisPlans,
    inverse: AxisPlans,
    // (nz, ny, nx/2 + 1)
    half: Array3<Complex32>,
}

/// Highest-priority backend; exploits the Hermitian symmetry of real spectra.
#[derive(Default)]
pub struct RealFftBackend {
    bound: Option<Bound>,
}

impl RealFftBackend {
    pub fn new() -> Self {
        RealFftBackend::default()
    }
}

impl Debug for RealFftBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealFftBackend")
            .field("dims", &self.dims())
            .finish()
    }
}

fn backend_error(err: realfft::FftError) -> DeconvolutionError {
    DeconvolutionError::Backend {
        backend: BackendKind::RealFft.name(),
        detail: err.to_string(),
    }
}

impl FftBackend for RealFftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RealFft
    }

    fn dims(&self) -> Option<Dims> {
        self.bound.as_ref().map(|b| b.dims)
    }

    fn initialize(&mut self, monitors: &Monitors, dims: Dims) -> Result<()> {
        let mut real_planner = RealFftPlanner::<f32>::new();
        let mut planner = FftPlanner::<f32>::new();
        self.bound = Some(Bound {
            dims,
            r2c: real_planner.plan_fft_forward(dims.nx),
            c2r: real_planner.plan_fft_inverse(dims.nx),
            forward: AxisPlans::forward(&mut planner, dims),
            inverse: AxisPlans::inverse(&mut planner, dims),
            half: Array3::zeros((dims.nz, dims.ny, dims.nx / 2 + 1)),
        });
        announce(monitors, self.kind(), dims);
        Ok(())
    }

    fn transform_into(&mut self, input: &RealSignal, output: &mut ComplexSignal) -> Result<()> {
        let dims = check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        let Some(bound) = self.bound.as_mut() else {
            return Err(DeconvolutionError::NotInitialized(BackendKind::RealFft.name()));
        };
        let r2c = &bound.r2c;

        (
            bound.half.axis_iter_mut(Axis(0)),
            input.data().axis_iter(Axis(0)),
        )
            .into_par_iter()
            .try_for_each(|(mut half_plane, plane)| {
                let mut row_in = r2c.make_input_vec();
                let mut row_out = r2c.make_output_vec();
                let mut scratch = r2c.make_scratch_vec();
                for (mut half_row, row) in half_plane.rows_mut().into_iter().zip(plane.rows()) {
                    for (dst, src) in row_in.iter_mut().zip(row.iter()) {
                        *dst = *src;
                    }
                    r2c.process_with_scratch(&mut row_in, &mut row_out, &mut scratch)?;
                    for (dst, src) in half_row.iter_mut().zip(row_out.iter()) {
                        *dst = *src;
                    }
                }
                Ok(())
            })
            .map_err(backend_error)?;

        transform_columns(&mut bound.half, &bound.forward.y);
        transform_depth(&mut bound.half, &bound.forward.z);

        let half = &bound.half;
        let width = half.len_of(Axis(2));
        let Dims { nx, ny, nz } = dims;
        Zip::indexed(output.data_mut()).par_for_each(|(z, y, x), o| {
            *o = if x < width {
                half[[z, y, x]]
            } else {
                half[[(nz - z) % nz, (ny - y) % ny, nx - x]].conj()
            };
        });
        Ok(())
    }

    fn inverse_into(&mut self, input: &ComplexSignal, output: &mut RealSignal) -> Result<()> {
        let dims = check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        let Some(bound) = self.bound.as_mut() else {
            return Err(DeconvolutionError::NotInitialized(BackendKind::RealFft.name()));
        };
        let width = bound.half.len_of(Axis(2));
        let full = input.data();
        let Dims { nx, ny, nz } = dims;
        Zip::indexed(&mut bound.half).par_for_each(|(z, y, x), h| {
            let mirror = full[[(nz - z) % nz, (ny - y) % ny, (nx - x) % nx]].conj();
            *h = (full[[z, y, x]] + mirror) * 0.5;
        });
        transform_depth(&mut bound.half, &bound.inverse.z);
        transform_columns(&mut bound.half, &bound.inverse.y);

        let c2r = &bound.c2r;
        let even = dims.nx % 2 == 0;
        let scale = 1.0 / dims.len() as f32;
        (
            output.data_mut().axis_iter_mut(Axis(0)),
            bound.half.axis_iter(Axis(0)),
        )
            .into_par_iter()
            .try_for_each(|(mut plane, half_plane)| {
                let mut row_in = c2r.make_input_vec();
                let mut row_out = c2r.make_output_vec();
                let mut scratch = c2r.make_scratch_vec();
                for (mut row, half_row) in plane.rows_mut().into_iter().zip(half_plane.rows()) {
                    for (dst, src) in row_in.iter_mut().zip(half_row.iter()) {
                        *dst = *src;
                    }
                    // DC and Nyquist bins of a real line are real; drop rounding residue
                    row_in[0].im = 0.0;
                    if even {
                        row_in[width - 1].im = 0.0;
                    }
                    c2r.process_with_scratch(&mut row_in, &mut row_out, &mut scratch)?;
                    for (dst, src) in row.iter_mut().zip(row_out.iter()) {
                        *dst = *src * scale;
                    }
                }
                Ok(())
            })
            .map_err(backend_error)?;
        Ok(())
    }
}
