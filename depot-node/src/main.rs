// Depot node: inventory, peer links over TCP and SIGHUP state reports.

mod args;
mod config;
mod report;
mod transport;

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use depot_core::Depot;
use tracing::{info, warn};

fn main() -> ExitCode {
    let startup = match args::parse(std::env::args_os()) {
        Ok(startup) => startup,
        Err(args::StartupError::Version(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let (cfg, config_problem) = config::load();
    setup_tracing(&cfg.log_level);
    if let Some(e) = config_problem {
        warn!("ignoring config file: {e}");
    }
    info!(name = %startup.name, goods = startup.seed.len(), "starting depot");

    let depot = Arc::new(Mutex::new(Depot::init(startup.name, startup.seed)));

    let reporter = match report::spawn(depot.clone(), std::io::stdout) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "state reports unavailable");
            None
        }
    };

    if let Err(e) = transport::listen(depot, &cfg, std::io::stdout()) {
        warn!(error = %e, "listener unavailable; depot is unreachable");
    }

    // Without a listener the depot stays up for reports only.
    if let Some(handle) = reporter {
        let _ = handle.join();
    }
    ExitCode::SUCCESS
}

/// Log to stderr; stdout carries the port announcement and reports.
/// Filter: DEPOT_LOG, then RUST_LOG, then the configured level.
fn setup_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("DEPOT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
