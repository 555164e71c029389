//! Enlarging volumes to transform-friendly sizes, and the matching crop.
//!
//! [`Padding`] holds one [`PadStrategy`] per axis plus a minimum extension margin. A
//! call to [`Padding::pad`] records the original and padded sizes; [`Padding::crop`]
//! uses that record to cut the original region back out and refuses to guess when the
//! record is missing or does not match.

use crate::error::{DeconvolutionError, Result};
use crate::monitor::Monitors;
use crate::signal::{Dims, RealSignal};
use ndarray::s;
use serde::{Deserialize, Serialize};

/// Admissible sizes along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PadStrategy {
    /// Any size.
    #[default]
    None,
    /// Even sizes.
    Multiple2,
    /// Powers of two.
    Power2,
    /// Sizes whose only prime factors are 2 and 3.
    Multiple23,
    /// Sizes whose only prime factors are 2, 3 and 5.
    Multiple235,
}

fn is_smooth(mut n: usize, primes: &[usize]) -> bool {
    if n == 0 {
        return false;
    }
    for &p in primes {
        while n % p == 0 {
            n /= p;
        }
    }
    n == 1
}

impl PadStrategy {
    pub fn conforms(&self, n: usize) -> bool {
        match self {
            PadStrategy::None => n > 0,
            PadStrategy::Multiple2 => n > 0 && n % 2 == 0,
            PadStrategy::Power2 => n.is_power_of_two(),
            PadStrategy::Multiple23 => is_smooth(n, &[2, 3]),
            PadStrategy::Multiple235 => is_smooth(n, &[2, 3, 5]),
        }
    }

    /// Smallest conforming size `>= n + extension`.
    pub fn size_for(&self, n: usize, extension: usize) -> usize {
        let mut size = (n + extension).max(1);
        if *self == PadStrategy::Power2 {
            return size.next_power_of_two();
        }
        while !self.conforms(size) {
            size += 1;
        }
        size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PaddingState {
    original: Dims,
    padded: Dims,
}

impl PaddingState {
    fn offset(&self) -> [usize; 3] {
        [
            (self.padded.nx - self.original.nx) / 2,
            (self.padded.ny - self.original.ny) / 2,
            (self.padded.nz - self.original.nz) / 2,
        ]
    }
}

/// Per-axis padding configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Padding {
    pub x: PadStrategy,
    pub y: PadStrategy,
    pub z: PadStrategy,
    /// Minimum number of voxels added along x and y.
    pub extension_xy: usize,
    /// Minimum number of voxels added along z.
    pub extension_z: usize,
    #[serde(skip)]
    state: Option<PaddingState>,
}

impl Padding {
    /// The same strategy for x and y, another for z, no extension.
    pub fn new(xy: PadStrategy, z: PadStrategy) -> Self {
        Padding {
            x: xy,
            y: xy,
            z,
            ..Default::default()
        }
    }

    pub fn uniform(strategy: PadStrategy) -> Self {
        Padding::new(strategy, strategy)
    }

    pub fn with_extension(mut self, extension_xy: usize, extension_z: usize) -> Self {
        self.extension_xy = extension_xy;
        self.extension_z = extension_z;
        self
    }

    pub fn padded_dims(&self, dims: Dims) -> Dims {
        Dims::new(
            self.x.size_for(dims.nx, self.extension_xy),
            self.y.size_for(dims.ny, self.extension_xy),
            self.z.size_for(dims.nz, self.extension_z),
        )
    }

    /// `(original, padded)` sizes of the last [`pad`](Self::pad) call.
    pub fn last_sizes(&self) -> Option<(Dims, Dims)> {
        self.state.map(|s| (s.original, s.padded))
    }

    /// Copies `input` centered into a zero volume of the padded size.
    ///
    /// Returns a plain duplicate when no axis needs padding. Either way the sizes are
    /// remembered for [`crop`](Self::crop), replacing those of any earlier call.
    pub fn pad(&mut self, monitors: &Monitors, input: &RealSignal) -> RealSignal {
        let original = input.dims();
        let padded = self.padded_dims(original);
        let state = PaddingState { original, padded };
        self.state = Some(state);
        let name = format!("pad({})", input.name);

        if padded == original {
            return input.duplicate(name);
        }
        monitors.log(&format!("padding {} from {original} to {padded}", input.name));
        let [ox, oy, oz] = state.offset();
        let mut output = RealSignal::zeros(name, padded);
        output
            .data_mut()
            .slice_mut(s![
                oz..oz + original.nz,
                oy..oy + original.ny,
                ox..ox + original.nx
            ])
            .assign(input.data());
        output
    }

    /// Cuts the region recorded by the last [`pad`](Self::pad) back out of `input`.
    pub fn crop(&self, monitors: &Monitors, input: &RealSignal) -> Result<RealSignal> {
        let Some(state) = self.state else {
            return Err(DeconvolutionError::PaddingState(format!(
                "{} was never padded",
                input.name
            )));
        };
        if input.dims() != state.padded {
            return Err(DeconvolutionError::PaddingState(format!(
                "{} is {} but the last padding produced {}",
                input.name,
                input.dims(),
                state.padded
            )));
        }
        let name = format!("crop({})", input.name);
        if state.padded == state.original {
            return Ok(input.duplicate(name));
        }
        monitors.log(&format!(
            "cropping {} from {} to {}",
            input.name, state.padded, state.original
        ));
        let [ox, oy, oz] = state.offset();
        let o = state.original;
        let view = input
            .data()
            .slice(s![oz..oz + o.nz, oy..oy + o.ny, ox..ox + o.nx]);
        RealSignal::from_array(name, view.to_owned())
    }
}
