//! Wires the bridge together and runs it until Ctrl-C.

use crate::domain::models::ScreenSize;
use crate::domain::queue::CommandQueue;
use crate::domain::session::Session;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    BleConnector, ConnectionConfig, ConnectionSupervisor, LinkState,
};
use crate::infrastructure::input_simulator::UinputPointer;
use crate::presentation::overlay::TracingOverlay;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let screen: ScreenSize = settings.screen();
    info!(
        "Light gun {} on a {}x{} screen",
        settings.device_address, screen.width, screen.height
    );

    let pointer = UinputPointer::new(&settings.pointer_device_name)
        .context("Failed to create the virtual pointer (is /dev/uinput writable?)")?;
    let connector = BleConnector::new(ConnectionConfig::from_settings(settings)?)
        .await
        .context("Failed to initialize Bluetooth")?;

    let queue = Arc::new(CommandQueue::new());
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = ConnectionSupervisor::new(
        connector,
        settings.device_address.clone(),
        queue.clone(),
        ack_rx,
        shutdown_rx.clone(),
    );
    let link_state = supervisor.subscribe_state();
    let session = Session::new(
        screen,
        pointer,
        TracingOverlay::new(screen),
        ack_tx,
        shutdown_rx,
    );

    let supervisor_task = tokio::spawn(supervisor.run());
    let session_task = tokio::spawn(session.run(queue));
    let status_task = tokio::spawn(report_link_state(link_state));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}, shutting down", e),
    }
    shutdown_tx.send_replace(true);

    if let Err(e) = supervisor_task.await {
        error!("Connection supervisor task failed: {}", e);
    }
    // The pointer outlives both tasks and is destroyed last
    let pointer = match session_task.await {
        Ok(pointer) => Some(pointer),
        Err(e) => {
            error!("Session task failed: {}", e);
            None
        }
    };
    let _ = status_task.await;
    drop(pointer);

    info!("Light gun bridge stopped");
    Ok(())
}

async fn report_link_state(mut state: watch::Receiver<LinkState>) {
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        info!("Link {}", current);
    }
}
