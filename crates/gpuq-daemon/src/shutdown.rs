//! OS signal handling

use gpuq_scheduler::ShutdownHandle;
use tracing::{info, warn};

/// Trigger `handle` on the first SIGINT or SIGTERM.
///
/// The supervisor only observes the signal between steps; a running job is
/// left to finish.
pub fn install(handle: ShutdownHandle) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!(signal = name, "Shutdown requested, finishing current step"),
            Err(e) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        }
        handle.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
