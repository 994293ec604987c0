//! State reports on SIGHUP.
//!
//! A dedicated thread owns a small single-threaded tokio runtime whose only job
//! is waiting for the signal. SIGPIPE needs no handling here: the Rust runtime
//! ignores it, so a write to a dead neighbour just returns an error that the
//! dispatcher discards.

use std::io::{self, Write};
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

use crate::transport::{lock, SharedDepot};

/// Print the depot's report under its lock.
pub fn write_report<W: Write>(depot: &SharedDepot, out: &mut W) -> io::Result<()> {
    let depot = lock(depot);
    write!(out, "{}", depot.report())?;
    out.flush()
}

/// Start the reporter thread; each report goes to a fresh `out()` writer.
/// Returns once the signal handler is installed, so a SIGHUP arriving after
/// this call can no longer terminate the process.
pub fn spawn<F, W>(depot: SharedDepot, out: F) -> io::Result<thread::JoinHandle<()>>
where
    F: FnMut() -> W + Send + 'static,
    W: Write,
{
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("reporter".into())
        .spawn(move || run(depot, out, ready_tx))?;
    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::Other,
            "reporter exited before installing its handler",
        )),
    }
}

#[cfg(unix)]
fn run<F, W>(depot: SharedDepot, mut out: F, ready: mpsc::Sender<io::Result<()>>)
where
    F: FnMut() -> W,
    W: Write,
{
    use tokio::signal::unix::{signal, SignalKind};

    let installed = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .and_then(|rt| {
            let hangup = {
                let _guard = rt.enter();
                signal(SignalKind::hangup())?
            };
            Ok((rt, hangup))
        });
    let (rt, mut hangup) = match installed {
        Ok(parts) => {
            let _ = ready.send(Ok(()));
            parts
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    info!("waiting for SIGHUP");
    rt.block_on(async {
        while hangup.recv().await.is_some() {
            if let Err(e) = write_report(&depot, &mut out()) {
                warn!(error = %e, "could not write report");
            }
        }
    });
}

#[cfg(not(unix))]
fn run<F, W>(_depot: SharedDepot, _out: F, ready: mpsc::Sender<io::Result<()>>)
where
    F: FnMut() -> W,
    W: Write,
{
    let _ = ready.send(Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SIGHUP reports need a unix platform",
    )));
}
