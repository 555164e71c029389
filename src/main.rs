use psf_deconvolution::config::RunSettings;
use psf_deconvolution::output::{ChannelViewer, ViewerCommand};
use psf_deconvolution::{synthetic, Convolution, Monitors, RunState, FFT_REGISTRY};
use crossbeam_channel::{Receiver, Sender};
use std::io::IsTerminal;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());
    Registry::default().with(filter).with(fmt_layer).init();
}

fn main() {
    init_tracing();
    info!(
        "psf-deconvolution {} ({}@{})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("GIT_BRANCH")
    );
    for backend in &*FFT_REGISTRY {
        info!(
            "backend {:<8} installed: {:<5} multithreaded: {}",
            backend.name, backend.installed, backend.multithreaded
        );
    }

    let settings = RunSettings::load_or_default();

    // shown outputs are only logged here
    let (viewer_tx, viewer_rx): (Sender<ViewerCommand>, Receiver<ViewerCommand>) =
        crossbeam_channel::unbounded();
    let viewer_thread = thread::spawn(move || {
        for command in viewer_rx {
            match command {
                ViewerCommand::Open { key, title, .. } => info!("[{key}] open {title}"),
                ViewerCommand::Append { key, title, .. } => info!("[{key}] append {title}"),
            }
        }
    });

    let truth = synthetic::beads(settings.image_dims(), 16, 4.0, 10.0);
    let psf = synthetic::gaussian_psf(
        settings.psf_dims(),
        settings.psf_sigma_xy,
        settings.psf_sigma_z,
    );

    // simulate the observation
    let mut blur = settings
        .controller()
        .with_outputs(Vec::new())
        .with_monitors(Monitors::none());
    let observed = match blur.run(&mut Convolution, &truth, &psf, None) {
        Ok(report) => match report.output {
            Some(observed) if report.state == RunState::Converged => observed,
            _ => {
                error!("simulating the observation failed: {:?}", report.reason);
                return;
            }
        },
        Err(err) => {
            error!("simulating the observation failed: {err}");
            return;
        }
    };

    let mut controller = settings
        .controller()
        .with_provider(Arc::new(ChannelViewer::new(viewer_tx)));
    let mut algorithm = settings.algorithm.create();
    let report = match controller.run(algorithm.as_mut(), &observed, &psf, Some(&truth)) {
        Ok(report) => report,
        Err(err) => {
            error!("configuration error: {err}");
            return;
        }
    };
    // drops the provider and with it the last sender
    drop(controller);
    if viewer_thread.join().is_err() {
        warn!("viewer thread panicked");
    }

    info!(
        "{:?} after {} iterations on {} in {:.2} s (started {})",
        report.state,
        report.iterations,
        report.backend,
        report.elapsed.as_secs_f64(),
        report.started.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(reason) = &report.reason {
        warn!("{reason}");
    }
    if let Some(last) = report.stats.last() {
        info!(
            "residu {:.3e}, rmse {:?}, psnr {:?}",
            last.residu, last.rmse, last.psnr
        );
    }
    for dispatch in &report.dispatches {
        for file in &dispatch.files {
            info!("{} -> {}", dispatch.output, file.display());
        }
    }
}
