//! Synthetic volumes for demos and tests.

use crate::signal::{Dims, RealSignal};

/// Separable 3D Gaussian centered on `dims.center()`, normalized to unit sum.
///
/// A non-positive sigma collapses that axis to a single voxel.
pub fn gaussian_psf(dims: Dims, sigma_xy: f32, sigma_z: f32) -> RealSignal {
    let [cx, cy, cz] = dims.center();
    let weight = |d: f32, sigma: f32| {
        if sigma > 0.0 {
            (-0.5 * d * d / (sigma * sigma)).exp()
        } else if d == 0.0 {
            1.0
        } else {
            0.0
        }
    };
    let mut psf = RealSignal::from_fn("psf", dims, |x, y, z| {
        let dx = x as f32 - cx as f32;
        let dy = y as f32 - cy as f32;
        let dz = z as f32 - cz as f32;
        weight(dx, sigma_xy) * weight(dy, sigma_xy) * weight(dz, sigma_z)
    });
    let sum = psf.sum() as f32;
    if sum > 0.0 {
        psf.data_mut().mapv_inplace(|v| v / sum);
    }
    psf
}

/// A centered cube of edge `side` filled with `value` on a zero background.
pub fn cube(dims: Dims, side: usize, value: f32) -> RealSignal {
    let [cx, cy, cz] = dims.center();
    let half = side / 2;
    let inside = |p: usize, c: usize| p + half >= c && p < c + side - half;
    RealSignal::from_fn("cube", dims, |x, y, z| {
        if inside(x, cx) && inside(y, cy) && inside(z, cz) {
            value
        } else {
            0.0
        }
    })
}

/// Spheres of `radius` on a regular lattice with the given `spacing`, over a constant
/// `background`.
pub fn beads(dims: Dims, spacing: usize, radius: f32, background: f32) -> RealSignal {
    let spacing = spacing.max(1);
    let offset = spacing / 2;
    let nearest = |p: usize| {
        let k = p.saturating_sub(offset) as f32 / spacing as f32;
        (k.round() * spacing as f32 + offset as f32) - p as f32
    };
    let r2 = radius * radius;
    RealSignal::from_fn("beads", dims, |x, y, z| {
        let (dx, dy, dz) = (nearest(x), nearest(y), nearest(z));
        let d2 = dx * dx + dy * dy + dz * dz;
        if d2 <= r2 {
            background + 100.0 * (1.0 - d2 / r2.max(1e-6)).max(0.1)
        } else {
            background
        }
    })
}

/// A strictly positive linear ramp, distinct along every axis.
pub fn ramp(dims: Dims) -> RealSignal {
    let scale = (dims.nx + 2 * dims.ny + 3 * dims.nz) as f32;
    RealSignal::from_fn("ramp", dims, |x, y, z| {
        1.0 + (x + 2 * y + 3 * z) as f32 / scale
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_psf_has_unit_sum_and_central_peak() {
        let dims = Dims::new(15, 12, 9);
        let psf = gaussian_psf(dims, 1.5, 2.0);
        assert_relative_eq!(psf.sum(), 1.0, epsilon = 1e-5);
        let [cx, cy, cz] = dims.center();
        assert_eq!(psf.get(cx, cy, cz), psf.stats().max);
    }

    #[test]
    fn test_zero_sigma_is_a_delta() {
        let psf = gaussian_psf(Dims::new(5, 5, 5), 0.0, 0.0);
        assert_relative_eq!(psf.get(2, 2, 2), 1.0);
        assert_eq!(psf.stats().min, 0.0);
    }

    #[test]
    fn test_cube_volume() {
        let c = cube(Dims::new(10, 10, 10), 4, 2.0);
        assert_relative_eq!(c.sum(), 4.0 * 4.0 * 4.0 * 2.0);
    }

    #[test]
    fn test_beads_sit_on_background() {
        let b = beads(Dims::new(32, 32, 16), 16, 3.0, 5.0);
        let stats = b.stats();
        assert_eq!(stats.min, 5.0);
        assert!(stats.max > 100.0);
        assert!(b.get(8, 8, 8) > 100.0);
    }

    #[test]
    fn test_ramp_is_positive() {
        let r = ramp(Dims::new(4, 3, 2));
        assert!(r.stats().min >= 1.0);
        assert!(r.get(1, 0, 0) != r.get(0, 1, 0));
    }
}
