//! Line-parallel complex transforms built on `rustfft`.
//!
//! Every xy-plane is handled by one rayon task (rows, then columns), after which all
//! z-lines are transformed in parallel.

use crate::error::Result;
use crate::fft::{announce, check_pair, BackendKind, FftBackend};
use crate::monitor::Monitors;
use crate::signal::{ComplexSignal, Dims, RealSignal};
use ndarray::{Array3, Axis, Zip};
use num_complex::Complex32;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Forward or inverse plans for the x, y and z axes.
#[derive(Clone)]
pub(crate) struct AxisPlans {
    pub x: Arc<dyn Fft<f32>>,
    pub y: Arc<dyn Fft<f32>>,
    pub z: Arc<dyn Fft<f32>>,
}

impl AxisPlans {
    pub(crate) fn forward(planner: &mut FftPlanner<f32>, dims: Dims) -> Self {
        AxisPlans {
            x: planner.plan_fft_forward(dims.nx),
            y: planner.plan_fft_forward(dims.ny),
            z: planner.plan_fft_forward(dims.nz),
        }
    }

    pub(crate) fn inverse(planner: &mut FftPlanner<f32>, dims: Dims) -> Self {
        AxisPlans {
            x: planner.plan_fft_inverse(dims.nx),
            y: planner.plan_fft_inverse(dims.ny),
            z: planner.plan_fft_inverse(dims.nz),
        }
    }
}

/// Transforms the rows of every plane, in parallel over planes.
pub(crate) fn transform_rows(data: &mut Array3<Complex32>, fft: &Arc<dyn Fft<f32>>) {
    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut plane| {
            let mut buffer = Vec::new();
            for mut row in plane.rows_mut() {
                match row.as_slice_mut() {
                    Some(slice) => fft.process(slice),
                    None => {
                        buffer.clear();
                        buffer.extend(row.iter().copied());
                        fft.process(&mut buffer);
                        for (dst, src) in row.iter_mut().zip(buffer.iter()) {
                            *dst = *src;
                        }
                    }
                }
            }
        });
}

/// Transforms the columns (y-lines) of every plane, in parallel over planes.
pub(crate) fn transform_columns(data: &mut Array3<Complex32>, fft: &Arc<dyn Fft<f32>>) {
    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut plane| {
            let mut buffer = Vec::with_capacity(plane.nrows());
            for mut column in plane.columns_mut() {
                buffer.clear();
                buffer.extend(column.iter().copied());
                fft.process(&mut buffer);
                for (dst, src) in column.iter_mut().zip(buffer.iter()) {
                    *dst = *src;
                }
            }
        });
}

/// Transforms every z-line, in parallel over lines.
pub(crate) fn transform_depth(data: &mut Array3<Complex32>, fft: &Arc<dyn Fft<f32>>) {
    if data.len_of(Axis(0)) <= 1 {
        return;
    }
    Zip::from(data.lanes_mut(Axis(0))).par_for_each(|mut lane| {
        let mut buffer = lane.to_vec();
        fft.process(&mut buffer);
        for (dst, src) in lane.iter_mut().zip(buffer.iter()) {
            *dst = *src;
        }
    });
}

struct Bound {
    dims: Dims,
    forward: AxisPlans,
    inverse: AxisPlans,
    work: Array3<Complex32>,
}

/// Multi-threaded complex backend.
#[derive(Default)]
pub struct RustFftBackend {
    bound: Option<Bound>,
}

impl RustFftBackend {
    pub fn new() -> Self {
        RustFftBackend::default()
    }
}

impl Debug for RustFftBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustFftBackend")
            .field("dims", &self.dims())
            .finish()
    }
}

impl FftBackend for RustFftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RustFft
    }

    fn dims(&self) -> Option<Dims> {
        self.bound.as_ref().map(|b| b.dims)
    }

    fn initialize(&mut self, monitors: &Monitors, dims: Dims) -> Result<()> {
        let mut planner = FftPlanner::<f32>::new();
        self.bound = Some(Bound {
            dims,
            forward: AxisPlans::forward(&mut planner, dims),
            inverse: AxisPlans::inverse(&mut planner, dims),
            work: Array3::zeros(dims.shape()),
        });
        announce(monitors, self.kind(), dims);
        Ok(())
    }

    fn transform_into(&mut self, input: &RealSignal, output: &mut ComplexSignal) -> Result<()> {
        check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        if let Some(bound) = self.bound.as_ref() {
            let data = output.data_mut();
            Zip::from(&mut *data)
                .and(input.data())
                .par_for_each(|o, &v| *o = Complex32::new(v, 0.0));
            transform_rows(data, &bound.forward.x);
            transform_columns(data, &bound.forward.y);
            transform_depth(data, &bound.forward.z);
        }
        Ok(())
    }

    fn inverse_into(&mut self, input: &ComplexSignal, output: &mut RealSignal) -> Result<()> {
        let dims = check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        if let Some(bound) = self.bound.as_mut() {
            bound.work.assign(input.data());
            transform_rows(&mut bound.work, &bound.inverse.x);
            transform_columns(&mut bound.work, &bound.inverse.y);
            transform_depth(&mut bound.work, &bound.inverse.z);
            let scale = 1.0 / dims.len() as f32;
            Zip::from(output.data_mut())
                .and(&bound.work)
                .par_for_each(|o, c| *o = c.re * scale);
        }
        Ok(())
    }
}
