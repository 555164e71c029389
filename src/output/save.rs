//! Writing rendered outputs to disk.
//!
//! 2D frames become 8-bit or 16-bit gray PNGs, or `.npy` arrays for float samples.
//! Stacks are written as one `.npy` volume in the requested sample type, series as one
//! file per slice with a `_z0000` suffix.

use crate::error::Result;
use crate::output::render::{Frame, Rendered};
use crate::output::SampleType;
use crate::signal::RealSignal;
use image::error::{ParameterError, ParameterErrorKind};
use image::{ImageBuffer, ImageError, Luma};
use ndarray::{ArrayView2, Axis};
use ndarray_npy::write_npy;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

fn with_extension(stem: &Path, extension: &str) -> PathBuf {
    // names may contain dots, so append rather than replace
    let mut path = OsString::from(stem.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, u8::MAX as f32) as u8
}

fn to_u16(v: f32) -> u16 {
    v.round().clamp(0.0, u16::MAX as f32) as u16
}

fn dimension_mismatch() -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    ))
}

fn save_plane(plane: ArrayView2<f32>, stem: &Path, sample_type: SampleType) -> Result<PathBuf> {
    let (height, width) = plane.dim();
    // iterating a standard-layout copy yields row-major order
    let plane = plane.as_standard_layout();
    match sample_type {
        SampleType::Byte => {
            let path = with_extension(stem, "png");
            let raw: Vec<u8> = plane.iter().map(|&v| to_u8(v)).collect();
            let img: ImageBuffer<Luma<u8>, Vec<u8>> =
                ImageBuffer::from_raw(width as u32, height as u32, raw)
                    .ok_or_else(dimension_mismatch)?;
            img.save(&path)?;
            Ok(path)
        }
        SampleType::Short => {
            let path = with_extension(stem, "png");
            let raw: Vec<u16> = plane.iter().map(|&v| to_u16(v)).collect();
            let img: ImageBuffer<Luma<u16>, Vec<u16>> =
                ImageBuffer::from_raw(width as u32, height as u32, raw)
                    .ok_or_else(dimension_mismatch)?;
            img.save(&path)?;
            Ok(path)
        }
        SampleType::Float => {
            let path = with_extension(stem, "npy");
            write_npy(&path, &plane)?;
            Ok(path)
        }
    }
}

fn save_stack(signal: &RealSignal, stem: &Path, sample_type: SampleType) -> Result<PathBuf> {
    let path = with_extension(stem, "npy");
    let data = signal.data();
    match sample_type {
        SampleType::Byte => write_npy(&path, &data.mapv(to_u8))?,
        SampleType::Short => write_npy(&path, &data.mapv(to_u16))?,
        SampleType::Float => write_npy(&path, data)?,
    }
    Ok(path)
}

fn save_frame(frame: &Frame, stem: &Path, sample_type: SampleType) -> Result<PathBuf> {
    save_plane(frame.pixels.view(), stem, sample_type)
}

/// `<directory>/<name>` or `<directory>/<name>-<iteration>`, without extension.
pub fn file_stem(directory: &Path, name: &str, iteration: Option<usize>) -> PathBuf {
    match iteration {
        Some(i) => directory.join(format!("{name}-{i}")),
        None => directory.join(name),
    }
}

/// Writes `rendered` and returns the created files.
pub fn save(rendered: &Rendered, stem: &Path, sample_type: SampleType) -> Result<Vec<PathBuf>> {
    if let Some(parent) = stem.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = stem
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match rendered {
        Rendered::Stack(signal) => Ok(vec![save_stack(signal, stem, sample_type)?]),
        Rendered::Series(signal) => signal
            .data()
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(z, plane)| {
                let slice_stem = stem.with_file_name(format!("{file_name}_z{z:04}"));
                save_plane(plane, &slice_stem, sample_type)
            })
            .collect(),
        Rendered::Plane(frame) => Ok(vec![save_frame(frame, stem, sample_type)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::render;
    use crate::signal::Dims;
    use ndarray::{Array2, Array3};
    use ndarray_npy::read_npy;

    fn coded() -> RealSignal {
        RealSignal::from_fn("v", Dims::new(4, 3, 2), |x, y, z| {
            (x + 10 * y + 100 * z) as f32
        })
    }

    #[test]
    fn test_snapshot_stem() {
        let dir = Path::new("/tmp/out");
        assert_eq!(file_stem(dir, "mip", None), dir.join("mip"));
        assert_eq!(file_stem(dir, "mip", Some(7)), dir.join("mip-7"));
    }

    #[test]
    fn test_byte_frame_is_gray_png() {
        let dir = tempfile::tempdir().unwrap();
        let frame = render::max_projection(&coded());
        let files = save(&Rendered::Plane(frame), &dir.path().join("mip"), SampleType::Byte).unwrap();
        assert_eq!(files, vec![dir.path().join("mip.png")]);
        let img = image::open(&files[0]).unwrap().into_luma8();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(3, 2).0[0], 123);
    }

    #[test]
    fn test_short_frame_keeps_16_bits() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = render::max_projection(&coded());
        frame.pixels[[0, 0]] = 40000.0;
        let files = save(&Rendered::Plane(frame), &dir.path().join("s"), SampleType::Short).unwrap();
        let img = image::open(&files[0]).unwrap().into_luma16();
        assert_eq!(img.get_pixel(0, 0).0[0], 40000);
    }

    #[test]
    fn test_stack_is_one_npy_volume() {
        let dir = tempfile::tempdir().unwrap();
        let signal = coded();
        let files = save(
            &Rendered::Stack(signal.clone()),
            &dir.path().join("stack"),
            SampleType::Float,
        )
        .unwrap();
        let back: Array3<f32> = read_npy(&files[0]).unwrap();
        assert_eq!(&back, signal.data());
    }

    #[test]
    fn test_series_has_one_file_per_slice() {
        let dir = tempfile::tempdir().unwrap();
        let files = save(
            &Rendered::Series(coded()),
            &dir.path().join("series-3"),
            SampleType::Float,
        )
        .unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("series-3_z0000.npy"),
                dir.path().join("series-3_z0001.npy")
            ]
        );
        let slice: Array2<f32> = read_npy(&files[1]).unwrap();
        assert_eq!(slice[[2, 3]], 123.0);
    }
}
