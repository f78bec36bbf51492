//! Purpose: Run the daemon that owns the stack and hosts the device socket.
//! Exports: `ServeConfig`, `serve`.
//! Role: Hotplug source for the controller: SIGUSR1 attaches, SIGUSR2 detaches.
//! Invariants: One `StackStore` lives for the whole process; hotplug never replaces it.
//! Invariants: The device socket is removed before the process exits.
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use intstack::api::{
    Error, ErrorKind, HotplugHandler, InterfaceController, SocketHost, StackStore,
};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub device: PathBuf,
    pub attached: bool,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    init_tracing();

    let store = Arc::new(StackStore::new());
    let host = SocketHost::new(&config.device, tokio::runtime::Handle::current());
    let controller = InterfaceController::new(Arc::clone(&store), host);

    let mut attach = install(SignalKind::user_defined1(), "SIGUSR1")?;
    let mut detach = install(SignalKind::user_defined2(), "SIGUSR2")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;

    if config.attached {
        controller.on_attach()?;
    }
    info!(
        device = %config.device.display(),
        pid = std::process::id(),
        attached = controller.is_present(),
        "intstack daemon ready"
    );

    loop {
        tokio::select! {
            _ = attach.recv() => {
                if let Err(err) = controller.on_attach() {
                    error!(error = %err, "attach failed");
                }
            }
            _ = detach.recv() => controller.on_detach(),
            _ = terminate.recv() => break,
            _ = interrupt.recv() => break,
        }
    }

    controller.on_detach();
    let snapshot = store.snapshot();
    info!(
        capacity = snapshot.capacity,
        height = snapshot.elements.len(),
        "intstack daemon stopped; stack discarded"
    );
    Ok(())
}

fn install(kind: SignalKind, name: &str) -> Result<tokio::signal::unix::Signal, Error> {
    signal(kind).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to install {name} handler"))
            .with_source(err)
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
