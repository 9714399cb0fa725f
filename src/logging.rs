use std::path::Path;

use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// File name of the run log inside the artifact directory.
pub const LOG_FILE: &str = "experiment.log";

/// Log to `<artifact_dir>/experiment.log` and to stdout, and log panics.
///
/// Does nothing when a global subscriber is already installed. Returns whether this
/// call installed it.
pub fn install_logger(artifact_dir: &Path) -> bool {
    let file_path = artifact_dir.join(LOG_FILE);
    let writer = tracing_appender::rolling::never(artifact_dir, LOG_FILE);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                // wgpu is very chatty at info level.
                if path.starts_with("wgpu") && *m.level() >= Level::INFO {
                    return false;
                }
            }
            true
        }));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                if path.starts_with("wgpu") && *m.level() >= Level::INFO {
                    return false;
                }
            }
            true
        }));

    let installed = registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .is_ok();
    if installed {
        update_panic_hook(&file_path);
    }
    installed
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the experiment logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
