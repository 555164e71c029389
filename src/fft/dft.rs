//! Dependency-free transform used when nothing faster is installed.
//!
//! Power-of-two axes use an iterative radix-2 Cooley-Tukey FFT, every other length a
//! direct O(n²) DFT over a precomputed twiddle table. Arithmetic is done in `f64` so
//! that the fallback is also the most accurate backend.

use crate::error::Result;
use crate::fft::{announce, check_pair, BackendKind, FftBackend};
use crate::monitor::Monitors;
use crate::signal::{ComplexSignal, Dims, RealSignal};
use ndarray::{Array3, Axis, Zip};
use num_complex::{Complex32, Complex64};
use std::f64::consts::PI;

/// Twiddles and strategy for one axis length.
#[derive(Debug, Clone)]
struct LinePlan {
    n: usize,
    twiddles: Vec<Complex64>,
}

impl LinePlan {
    fn new(n: usize) -> Self {
        let twiddles = (0..n)
            .map(|j| Complex64::from_polar(1.0, -2.0 * PI * j as f64 / n as f64))
            .collect();
        LinePlan { n, twiddles }
    }

    #[inline]
    fn twiddle(&self, index: usize, inverse: bool) -> Complex64 {
        let w = self.twiddles[index];
        if inverse {
            w.conj()
        } else {
            w
        }
    }

    fn process(&self, line: &mut [Complex64], scratch: &mut Vec<Complex64>, inverse: bool) {
        if self.n <= 1 {
            return;
        }
        if self.n.is_power_of_two() {
            self.radix2(line, inverse);
        } else {
            self.direct(line, scratch, inverse);
        }
    }

    fn direct(&self, line: &mut [Complex64], scratch: &mut Vec<Complex64>, inverse: bool) {
        let n = self.n;
        scratch.clear();
        scratch.extend_from_slice(line);
        for (k, out) in line.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (t, v) in scratch.iter().enumerate() {
                acc += v * self.twiddle((k * t) % n, inverse);
            }
            *out = acc;
        }
    }

    fn radix2(&self, line: &mut [Complex64], inverse: bool) {
        let n = self.n;
        let bits = n.trailing_zeros();
        for i in 0..n {
            let j = i.reverse_bits() >> (usize::BITS - bits);
            if j > i {
                line.swap(i, j);
            }
        }
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for start in (0..n).step_by(len) {
                for j in 0..half {
                    let w = self.twiddle(j * step, inverse);
                    let u = line[start + j];
                    let v = line[start + j + half] * w;
                    line[start + j] = u + v;
                    line[start + j + half] = u - v;
                }
            }
            len <<= 1;
        }
    }
}

#[derive(Debug)]
struct Bound {
    dims: Dims,
    // storage order: z, y, x
    plans: [LinePlan; 3],
    work: Array3<Complex64>,
}

/// The always-installed fallback backend.
#[derive(Debug, Default)]
pub struct DftBackend {
    bound: Option<Bound>,
}

impl DftBackend {
    pub fn new() -> Self {
        DftBackend::default()
    }

    /// Transforms all three axes of the working buffer in place.
    fn joint(bound: &mut Bound, inverse: bool) {
        let mut line = Vec::new();
        let mut scratch = Vec::new();
        for (axis, plan) in bound.plans.iter().enumerate() {
            for mut lane in bound.work.lanes_mut(Axis(axis)) {
                line.clear();
                line.extend(lane.iter().copied());
                plan.process(&mut line, &mut scratch, inverse);
                for (dst, src) in lane.iter_mut().zip(line.iter()) {
                    *dst = *src;
                }
            }
        }
    }
}

impl FftBackend for DftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dft
    }

    fn dims(&self) -> Option<Dims> {
        self.bound.as_ref().map(|b| b.dims)
    }

    fn initialize(&mut self, monitors: &Monitors, dims: Dims) -> Result<()> {
        self.bound = Some(Bound {
            dims,
            plans: [
                LinePlan::new(dims.nz),
                LinePlan::new(dims.ny),
                LinePlan::new(dims.nx),
            ],
            work: Array3::zeros(dims.shape()),
        });
        announce(monitors, self.kind(), dims);
        Ok(())
    }

    fn transform_into(&mut self, input: &RealSignal, output: &mut ComplexSignal) -> Result<()> {
        check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        if let Some(bound) = self.bound.as_mut() {
            Zip::from(&mut bound.work)
                .and(input.data())
                .for_each(|w, &v| *w = Complex64::new(v as f64, 0.0));
            Self::joint(bound, false);
            Zip::from(output.data_mut())
                .and(&bound.work)
                .for_each(|o, w| *o = Complex32::new(w.re as f32, w.im as f32));
        }
        Ok(())
    }

    fn inverse_into(&mut self, input: &ComplexSignal, output: &mut RealSignal) -> Result<()> {
        let dims = check_pair(self.kind(), self.dims(), input.dims(), output.dims())?;
        if let Some(bound) = self.bound.as_mut() {
            Zip::from(&mut bound.work)
                .and(input.data())
                .for_each(|w, c| *w = Complex64::new(c.re as f64, c.im as f64));
            Self::joint(bound, true);
            let scale = 1.0 / dims.len() as f64;
            Zip::from(output.data_mut())
                .and(&bound.work)
                .for_each(|o, w| *o = (w.re * scale) as f32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_radix2_matches_direct() {
        let n = 8;
        let plan = LinePlan::new(n);
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new(i as f64, (i * i) as f64 * 0.1))
            .collect();
        let mut fast = input.clone();
        plan.radix2(&mut fast, false);
        let mut slow = input.clone();
        plan.direct(&mut slow, &mut Vec::new(), false);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let dims = Dims::new(5, 4, 3);
        let mut impulse = RealSignal::zeros("delta", dims);
        impulse.set(0, 0, 0, 1.0);
        let mut fft = DftBackend::new();
        fft.initialize(&Monitors::none(), dims).unwrap();
        let spectrum = fft.transform(&impulse).unwrap();
        for c in spectrum.data().iter() {
            assert_abs_diff_eq!(c.re, 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-6);
        }
    }
}
