//! Turning a volume into what a view shows.

use crate::output::View;
use crate::signal::{Dims, RealSignal};
use ndarray::{s, Array2, Axis};

/// A separator drawn over a 2D frame, at a pixel row or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridLine {
    Horizontal(usize),
    Vertical(usize),
}

/// A 2D image indexed `[row, column]`, plus overlay lines that are not part of the
/// pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Array2<f32>,
    pub grid: Vec<GridLine>,
}

impl Frame {
    fn new(pixels: Array2<f32>) -> Self {
        Frame {
            pixels,
            grid: Vec::new(),
        }
    }

    /// `(width, height)`
    pub fn size(&self) -> (usize, usize) {
        let (rows, cols) = self.pixels.dim();
        (cols, rows)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// The whole volume as one stack.
    Stack(RealSignal),
    /// The whole volume, one item per z-slice.
    Series(RealSignal),
    Plane(Frame),
}

fn clamp_keypoint(dims: Dims, keypoint: Option<[usize; 3]>) -> [usize; 3] {
    let [x, y, z] = keypoint.unwrap_or_else(|| dims.center());
    [x.min(dims.nx - 1), y.min(dims.ny - 1), z.min(dims.nz - 1)]
}

/// Maximum along z of every `(x, y)` column.
pub fn max_projection(signal: &RealSignal) -> Frame {
    let pixels = signal
        .data()
        .fold_axis(Axis(0), f32::NEG_INFINITY, |acc, &v| acc.max(v));
    Frame::new(pixels)
}

/// XY section at `kz` (top left), YZ section at `kx` (top right) and XZ section at
/// `ky` (bottom left) on a `(ny + nz) x (nx + nz)` canvas.
pub fn orthogonal(signal: &RealSignal, keypoint: Option<[usize; 3]>) -> Frame {
    let dims = signal.dims();
    let Dims { nx, ny, nz } = dims;
    let [kx, ky, kz] = clamp_keypoint(dims, keypoint);
    let data = signal.data();
    let mut pixels = Array2::zeros((ny + nz, nx + nz));
    pixels
        .slice_mut(s![..ny, ..nx])
        .assign(&data.index_axis(Axis(0), kz));
    // data[.., .., kx] is indexed [z, y]
    pixels
        .slice_mut(s![..ny, nx..])
        .assign(&data.slice(s![.., .., kx]).t());
    pixels
        .slice_mut(s![ny.., ..nx])
        .assign(&data.slice(s![.., ky, ..]));
    Frame {
        pixels,
        grid: vec![GridLine::Vertical(nx), GridLine::Horizontal(ny)],
    }
}

/// XY section at `kz` beside the YZ section at `kx`.
pub fn figure(signal: &RealSignal, keypoint: Option<[usize; 3]>) -> Frame {
    let dims = signal.dims();
    let Dims { nx, ny, nz } = dims;
    let [kx, _, kz] = clamp_keypoint(dims, keypoint);
    let data = signal.data();
    let mut pixels = Array2::zeros((ny, nx + nz));
    pixels
        .slice_mut(s![.., ..nx])
        .assign(&data.index_axis(Axis(0), kz));
    pixels
        .slice_mut(s![.., nx..])
        .assign(&data.slice(s![.., .., kx]).t());
    Frame {
        pixels,
        grid: vec![GridLine::Vertical(nx)],
    }
}

/// `(columns, rows)` of a near-square montage of `n` tiles.
pub fn montage_grid(n: usize) -> (usize, usize) {
    let mut cols = (n as f64).sqrt().ceil() as usize;
    while cols * cols < n {
        cols += 1;
    }
    let cols = cols.max(1);
    (cols, n.div_ceil(cols).max(1))
}

/// All z-slices tiled row by row.
pub fn planar(signal: &RealSignal) -> Frame {
    let Dims { nx, ny, nz } = signal.dims();
    let (cols, rows) = montage_grid(nz);
    let mut pixels = Array2::zeros((rows * ny, cols * nx));
    for (k, plane) in signal.data().axis_iter(Axis(0)).enumerate() {
        let (r, c) = (k / cols, k % cols);
        pixels
            .slice_mut(s![r * ny..(r + 1) * ny, c * nx..(c + 1) * nx])
            .assign(&plane);
    }
    let mut grid: Vec<GridLine> = (1..rows).map(|r| GridLine::Horizontal(r * ny)).collect();
    grid.extend((1..cols).map(|c| GridLine::Vertical(c * nx)));
    Frame { pixels, grid }
}

/// Consumes `signal`: volume views keep it as is, plane views release it once drawn.
pub fn render(signal: RealSignal, view: View, keypoint: Option<[usize; 3]>) -> Rendered {
    let frame = match view {
        View::Stack => return Rendered::Stack(signal),
        View::Series => return Rendered::Series(signal),
        View::Ortho => orthogonal(&signal, keypoint),
        View::Mip => max_projection(&signal),
        View::Figure => figure(&signal, keypoint),
        View::Planar => planar(&signal),
    };
    signal.release();
    Rendered::Plane(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coded() -> RealSignal {
        RealSignal::from_fn("v", Dims::new(4, 3, 5), |x, y, z| {
            (x + 10 * y + 100 * z) as f32
        })
    }

    #[test]
    fn test_max_projection() {
        let frame = max_projection(&coded());
        assert_eq!(frame.size(), (4, 3));
        assert_eq!(frame.pixels[[2, 1]], 421.0);
    }

    #[test]
    fn test_orthogonal_sections_at_keypoint() {
        let frame = orthogonal(&coded(), Some([1, 2, 3]));
        assert_eq!(frame.size(), (4 + 5, 3 + 5));
        // XY at z = 3
        assert_eq!(frame.pixels[[2, 3]], 323.0);
        // YZ at x = 1: row y, column nx + z
        assert_eq!(frame.pixels[[2, 4 + 4]], 421.0);
        // XZ at y = 2: row ny + z, column x
        assert_eq!(frame.pixels[[3 + 4, 3]], 423.0);
        assert_eq!(frame.pixels[[7, 8]], 0.0);
    }

    #[test]
    fn test_keypoint_defaults_to_center() {
        let frame = orthogonal(&coded(), None);
        // center (2, 1, 2)
        assert_eq!(frame.pixels[[0, 0]], 200.0);
    }

    #[test]
    fn test_figure_has_two_panels() {
        let frame = figure(&coded(), Some([0, 0, 0]));
        assert_eq!(frame.size(), (9, 3));
        assert_eq!(frame.grid, vec![GridLine::Vertical(4)]);
        assert_eq!(frame.pixels[[1, 4 + 2]], 210.0);
    }

    #[test]
    fn test_montage_grid_is_near_square() {
        assert_eq!(montage_grid(1), (1, 1));
        assert_eq!(montage_grid(5), (3, 2));
        assert_eq!(montage_grid(9), (3, 3));
        assert_eq!(montage_grid(10), (4, 3));
    }

    #[test]
    fn test_planar_tiles_and_grid_overlay() {
        let frame = planar(&coded());
        // 5 slices -> 3 columns, 2 rows
        assert_eq!(frame.size(), (12, 6));
        // slice 4 is tile (1, 1)
        assert_eq!(frame.pixels[[3 + 1, 4 + 2]], 412.0);
        assert_eq!(frame.pixels[[5, 11]], 0.0);
        assert_eq!(
            frame.grid,
            vec![
                GridLine::Horizontal(3),
                GridLine::Vertical(4),
                GridLine::Vertical(8)
            ]
        );
    }

    #[test]
    fn test_render_moves_volumes_instead_of_copying() {
        let signal = coded();
        let ptr = signal.data().as_ptr();
        match render(signal, View::Stack, None) {
            Rendered::Stack(kept) => assert_eq!(kept.data().as_ptr(), ptr),
            other => panic!("unexpected {other:?}"),
        }
        match render(coded(), View::Mip, None) {
            Rendered::Plane(frame) => assert_eq!(frame.size(), (4, 3)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
