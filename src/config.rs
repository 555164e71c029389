//! Persisted run settings.
//!
//! Settings live in the platform preferences directory under [`PREFS_KEY`] and are
//! turned into a configured [`Controller`] with [`RunSettings::controller`].

use crate::algorithms::{Algorithm, Convolution, Identity};
use crate::apodization::Apodization;
use crate::controller::{Constraint, Controller};
use crate::fft::registry::BackendSelection;
use crate::output::{Output, View};
use crate::padding::Padding;
use crate::signal::Dims;
use preferences::{AppInfo, Preferences};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_INFO: AppInfo = AppInfo {
    name: "PSF Deconvolution",
    author: "Linus Leo Stöckli",
};

pub const PREFS_KEY: &str = "config/run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlgorithmChoice {
    #[default]
    Identity,
    IdentityIterative,
    Convolution,
}

impl AlgorithmChoice {
    pub fn create(&self) -> Box<dyn Algorithm> {
        match self {
            AlgorithmChoice::Identity => Box::new(Identity::direct()),
            AlgorithmChoice::IdentityIterative => Box::new(Identity::iterative()),
            AlgorithmChoice::Convolution => Box::new(Convolution),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub algorithm: AlgorithmChoice,
    pub backend: BackendSelection,
    pub padding: Padding,
    pub apodization: Apodization,
    pub iterations: usize,
    pub residu: Option<f64>,
    pub time_limit_secs: Option<f64>,
    pub constraint: Constraint,
    pub outputs: Vec<Output>,
    pub output_path: PathBuf,
    /// Size of the synthetic bead volume.
    pub image_size: [usize; 3],
    pub psf_size: [usize; 3],
    pub psf_sigma_xy: f32,
    pub psf_sigma_z: f32,
}

impl Default for RunSettings {
    fn default() -> Self {
        let output_path = home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deconvolution");
        RunSettings {
            algorithm: AlgorithmChoice::default(),
            backend: BackendSelection::Fastest,
            padding: Padding::default(),
            apodization: Apodization::default(),
            iterations: 10,
            residu: None,
            time_limit_secs: None,
            constraint: Constraint::None,
            outputs: vec![
                Output::new(View::Ortho, "ortho"),
                Output::new(View::Stack, "estimate"),
            ],
            output_path,
            image_size: [96, 80, 64],
            psf_size: [32, 32, 32],
            psf_sigma_xy: 2.0,
            psf_sigma_z: 3.0,
        }
    }
}

impl RunSettings {
    /// Loads the stored settings, or stores and returns the defaults if there are none.
    pub fn load_or_default() -> Self {
        match RunSettings::load(&APP_INFO, PREFS_KEY) {
            Ok(settings) => settings,
            Err(_) => {
                let settings = RunSettings::default();
                // save default settings
                if let Err(err) = settings.save(&APP_INFO, PREFS_KEY) {
                    log::error!("error in saving run settings: {err:?}");
                }
                settings
            }
        }
    }

    pub fn image_dims(&self) -> Dims {
        let [nx, ny, nz] = self.image_size;
        Dims::new(nx, ny, nz)
    }

    pub fn psf_dims(&self) -> Dims {
        let [nx, ny, nz] = self.psf_size;
        Dims::new(nx, ny, nz)
    }

    /// A controller carrying every setting. Non-finite or negative time limits are
    /// ignored.
    pub fn controller(&self) -> Controller {
        let mut controller = Controller::new()
            .with_backend(self.backend.clone())
            .with_padding(self.padding.clone())
            .with_apodization(self.apodization)
            .with_iterations(self.iterations)
            .with_constraint(self.constraint)
            .with_outputs(self.outputs.clone())
            .with_directory(&self.output_path);
        if let Some(residu) = self.residu {
            controller = controller.with_residu(residu);
        }
        if let Some(limit) = self.time_limit_secs.and_then(|s| Duration::try_from_secs_f64(s).ok())
        {
            controller = controller.with_time_limit(limit);
        }
        controller
    }
}
