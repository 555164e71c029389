use crate::algorithms::{Algorithm, AlgorithmConfig, AlgorithmKind, Workspace};
use crate::error::Result;
use crate::signal::RealSignal;

/// Returns the observed image after a forward and an inverse transform.
///
/// Restores nothing; it exercises the whole pipeline (padding, backend, crop, dispatch)
/// with a known answer.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    kind: AlgorithmKind,
}

impl Identity {
    /// A single-step identity.
    pub fn direct() -> Self {
        Identity {
            kind: AlgorithmKind::Direct,
        }
    }

    /// An identity that keeps iterating until the budget is spent.
    pub fn iterative() -> Self {
        Identity {
            kind: AlgorithmKind::Iterative,
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::direct()
    }
}

impl Algorithm for Identity {
    fn config(&self) -> AlgorithmConfig {
        AlgorithmConfig {
            name: "Identity".to_string(),
            description: "Forward and inverse transform of the observed image.".to_string(),
            hyperlink: None,
            kind: self.kind,
        }
    }

    fn iterate(
        &mut self,
        workspace: &mut Workspace,
        _estimate: &RealSignal,
        _iteration: usize,
    ) -> Result<RealSignal> {
        let spectrum = workspace.fft.transform(workspace.image)?;
        let mut output = workspace.fft.inverse(&spectrum)?;
        spectrum.release();
        output.name = format!("id({})", workspace.image.name);
        Ok(output)
    }
}
