//! Dense 3D volumes.
//!
//! Both signal types store their samples in an `Array3` of shape `(nz, ny, nx)` in
//! standard (row-major) layout, so every z-plane is one contiguous run of `nx * ny`
//! samples. A complex sample is a `Complex32`, i.e. an interleaved `(re, im)` pair of
//! `f32`.

use crate::error::{DeconvolutionError, Result};
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis, Zip};
use num_complex::Complex32;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Size of a volume along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Dims {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Dims { nx, ny, nz }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Array shape in storage order.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nz, self.ny, self.nx)
    }

    /// Voxel `(⌊nx/2⌋, ⌊ny/2⌋, ⌊nz/2⌋)`.
    pub fn center(&self) -> [usize; 3] {
        [self.nx / 2, self.ny / 2, self.nz / 2]
    }

    /// `true` if `self` is no larger than `other` on every axis.
    pub fn fits_in(&self, other: &Dims) -> bool {
        self.nx <= other.nx && self.ny <= other.ny && self.nz <= other.nz
    }
}

impl Display for Dims {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

/// Summary statistics of a real volume, accumulated in `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub stdev: f32,
    pub sum: f64,
    pub norm1: f64,
    pub norm2: f64,
}

#[derive(Clone, Copy)]
struct Accumulator {
    min: f32,
    max: f32,
    sum: f64,
    sum_sq: f64,
    abs_sum: f64,
}

impl Accumulator {
    const EMPTY: Accumulator = Accumulator {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
        sum: 0.0,
        sum_sq: 0.0,
        abs_sum: 0.0,
    };

    fn push(mut self, v: f32) -> Self {
        let d = v as f64;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += d;
        self.sum_sq += d * d;
        self.abs_sum += d.abs();
        self
    }

    fn merge(self, other: Accumulator) -> Self {
        Accumulator {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
            abs_sum: self.abs_sum + other.abs_sum,
        }
    }
}

/// A named real volume.
#[derive(Debug, Clone, PartialEq)]
pub struct RealSignal {
    pub name: String,
    data: Array3<f32>,
}

impl RealSignal {
    /// Zero-filled volume.
    pub fn zeros(name: impl Into<String>, dims: Dims) -> Self {
        RealSignal {
            name: name.into(),
            data: Array3::zeros(dims.shape()),
        }
    }

    /// Wraps an `(nz, ny, nx)` array. Rejects arrays with an empty axis.
    pub fn from_array(name: impl Into<String>, data: Array3<f32>) -> Result<Self> {
        let name = name.into();
        if data.is_empty() {
            return Err(DeconvolutionError::EmptySignal(name));
        }
        Ok(RealSignal {
            name,
            data: data.as_standard_layout().into_owned(),
        })
    }

    /// Builds a volume from `f(x, y, z)`.
    pub fn from_fn<F>(name: impl Into<String>, dims: Dims, f: F) -> Self
    where
        F: Fn(usize, usize, usize) -> f32,
    {
        RealSignal {
            name: name.into(),
            data: Array3::from_shape_fn(dims.shape(), |(z, y, x)| f(x, y, z)),
        }
    }

    pub fn dims(&self) -> Dims {
        let (nz, ny, nx) = self.data.dim();
        Dims { nx, ny, nz }
    }

    /// A copy under a new name.
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        RealSignal {
            name: name.into(),
            data: self.data.clone(),
        }
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// The `nx * ny` plane at depth `z`, indexed `[y, x]`.
    pub fn plane(&self, z: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), z)
    }

    pub fn plane_mut(&mut self, z: usize) -> ArrayViewMut2<'_, f32> {
        self.data.index_axis_mut(Axis(0), z)
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[[z, y, x]]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        self.data[[z, y, x]] = value;
    }

    pub fn sum(&self) -> f64 {
        self.data.par_iter().map(|&v| v as f64).sum()
    }

    pub fn stats(&self) -> SignalStats {
        let acc = self
            .data
            .par_iter()
            .fold(|| Accumulator::EMPTY, |acc, &v| acc.push(v))
            .reduce(|| Accumulator::EMPTY, Accumulator::merge);
        let n = self.data.len() as f64;
        let mean = acc.sum / n;
        let variance = (acc.sum_sq / n - mean * mean).max(0.0);
        SignalStats {
            min: acc.min,
            max: acc.max,
            mean: mean as f32,
            stdev: variance.sqrt() as f32,
            sum: acc.sum,
            norm1: acc.abs_sum,
            norm2: acc.sum_sq.sqrt(),
        }
    }

    /// Euclidean distance to another volume of the same size.
    pub fn distance(&self, other: &RealSignal) -> f64 {
        Zip::from(&self.data)
            .and(&other.data)
            .par_fold(
                || 0.0f64,
                |acc, &a, &b| {
                    let d = (a - b) as f64;
                    acc + d * d
                },
                |a, b| a + b,
            )
            .sqrt()
    }

    /// Releases the volume. Stages call this on intermediates right after their last
    /// use so that peak memory stays bounded to the live buffers.
    pub fn release(self) {
        log::debug!("releasing {} ({})", self.name, self.dims());
    }
}

/// A named complex volume; produced by a forward transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSignal {
    pub name: String,
    data: Array3<Complex32>,
}

impl ComplexSignal {
    pub fn zeros(name: impl Into<String>, dims: Dims) -> Self {
        ComplexSignal {
            name: name.into(),
            data: Array3::zeros(dims.shape()),
        }
    }

    pub fn from_array(name: impl Into<String>, data: Array3<Complex32>) -> Result<Self> {
        let name = name.into();
        if data.is_empty() {
            return Err(DeconvolutionError::EmptySignal(name));
        }
        Ok(ComplexSignal {
            name,
            data: data.as_standard_layout().into_owned(),
        })
    }

    pub fn dims(&self) -> Dims {
        let (nz, ny, nx) = self.data.dim();
        Dims { nx, ny, nz }
    }

    pub fn data(&self) -> &Array3<Complex32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<Complex32> {
        &mut self.data
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Complex32 {
        self.data[[z, y, x]]
    }

    /// Modulus of every sample.
    pub fn magnitude(&self) -> RealSignal {
        RealSignal {
            name: format!("mag({})", self.name),
            data: self.data.mapv(|c| c.norm()),
        }
    }

    /// Point-wise product, e.g. applying a transfer function to a spectrum.
    pub fn multiply(&mut self, other: &ComplexSignal) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(DeconvolutionError::IncompatibleSize {
                what: "spectrum",
                actual: other.dims(),
                limit: self.dims(),
            });
        }
        Zip::from(&mut self.data)
            .and(&other.data)
            .par_for_each(|a, &b| *a *= b);
        Ok(())
    }

    pub fn conjugate(&mut self) {
        self.data.par_mapv_inplace(|c| c.conj());
    }

    pub fn release(self) {
        log::debug!("releasing {} ({})", self.name, self.dims());
    }
}
