use crate::algorithms::{Algorithm, AlgorithmConfig, AlgorithmKind, Workspace};
use crate::error::Result;
use crate::signal::RealSignal;

/// Circular convolution of the image with the PSF, `F⁻¹(F(image) · OTF)`.
///
/// Degrades rather than restores; used to simulate an observation from a ground truth.
#[derive(Debug, Default, Clone, Copy)]
pub struct Convolution;

impl Algorithm for Convolution {
    fn config(&self) -> AlgorithmConfig {
        AlgorithmConfig {
            name: "Convolution".to_string(),
            description: "Blurs the image with the PSF in the frequency domain.".to_string(),
            hyperlink: Some((
                Some("Convolution theorem".to_string()),
                "https://en.wikipedia.org/wiki/Convolution_theorem".to_string(),
            )),
            kind: AlgorithmKind::Direct,
        }
    }

    fn iterate(
        &mut self,
        workspace: &mut Workspace,
        _estimate: &RealSignal,
        _iteration: usize,
    ) -> Result<RealSignal> {
        let otf = workspace.otf()?;
        let mut spectrum = workspace.fft.transform(workspace.image)?;
        spectrum.multiply(&otf)?;
        otf.release();
        let mut output = workspace.fft.inverse(&spectrum)?;
        spectrum.release();
        output.name = format!("conv({})", workspace.image.name);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::BackendKind;
    use crate::monitor::Monitors;
    use crate::signal::Dims;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_delta_psf_is_identity_and_shift_moves() {
        let dims = Dims::new(8, 6, 4);
        let image = RealSignal::from_fn("img", dims, |x, y, z| (x + 3 * y + 7 * z) as f32);
        // prepared PSFs are centered on the origin
        let mut delta = RealSignal::zeros("delta", dims);
        delta.set(0, 0, 0, 1.0);
        let mut shift = RealSignal::zeros("shift", dims);
        shift.set(1, 0, 0, 1.0);

        let mut fft = BackendKind::RustFft.create().unwrap();
        fft.initialize(&Monitors::none(), dims).unwrap();
        let monitors = Monitors::none();

        let mut workspace = Workspace {
            fft: fft.as_mut(),
            image: &image,
            psf: &delta,
            monitors: &monitors,
        };
        let same = Convolution.iterate(&mut workspace, &image, 1).unwrap();
        for (a, b) in same.data().iter().zip(image.data().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
        }

        workspace.psf = &shift;
        let moved = Convolution.iterate(&mut workspace, &image, 1).unwrap();
        assert_abs_diff_eq!(moved.get(3, 2, 1), image.get(2, 2, 1), epsilon = 1e-3);
        assert_abs_diff_eq!(moved.get(0, 2, 1), image.get(7, 2, 1), epsilon = 1e-3);
    }
}
