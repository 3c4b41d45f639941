use std::sync::LazyLock;

use remailer_common::{Signal, lifecycle};
use tokio::sync::broadcast;

use crate::{config::Config, service::Service};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for SIGINT or SIGTERM, then tell every subscriber to stop.
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            lifecycle!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            lifecycle!(level = INFO, "Terminate signal received, shutting down");
        }
    }

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

/// Run the supervisor until a termination signal arrives.
///
/// # Errors
///
/// Returns an error if the service cannot be initialised or fails while
/// running.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let service = Service::init(config).await?;
    let serve = service.serve(SHUTDOWN_BROADCAST.subscribe());
    tokio::pin!(serve);

    lifecycle!(level = INFO, "Controller running");

    let ret = tokio::select! {
        r = &mut serve => r,
        r = shutdown() => match r {
            // The service saw the signal too; let it join its tasks.
            Ok(()) => serve.await,
            Err(e) => Err(e),
        },
    };

    let _ = SHUTDOWN_BROADCAST.send(Signal::Finalised);
    lifecycle!(level = INFO, "Shut down");

    ret
}
