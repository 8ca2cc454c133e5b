//! Connection Supervisor
//!
//! Owns the link to the gun. Connects, enables notifications, feeds every
//! notification through the [`FrameAssembler`] into the [`CommandQueue`] and
//! writes the session's acknowledgements back. A watchdog tears the link
//! down when no frame completes for [`WATCHDOG_TIMEOUT`]; any teardown is
//! followed by a reconnect after [`RETRY_INTERVAL`].

use crate::domain::frame::FrameAssembler;
use crate::domain::models::Ack;
use crate::domain::queue::CommandQueue;
use crate::infrastructure::bluetooth::link::{LinkConnector, NotificationStream, PeripheralLink};
use crate::infrastructure::bluetooth::protocol;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(15);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    SetupFailed,
    Watchdog,
    LinkLost,
    Shutdown,
}

impl fmt::Display for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Teardown::SetupFailed => "notification setup failed",
            Teardown::Watchdog => "watchdog expired",
            Teardown::LinkLost => "link lost",
            Teardown::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

pub struct ConnectionSupervisor<C: LinkConnector> {
    connector: C,
    address: String,
    queue: Arc<CommandQueue>,
    acks: mpsc::UnboundedReceiver<Ack>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<LinkState>,
    assembler: FrameAssembler,
}

impl<C: LinkConnector> ConnectionSupervisor<C> {
    pub fn new(
        connector: C,
        address: impl Into<String>,
        queue: Arc<CommandQueue>,
        acks: mpsc::UnboundedReceiver<Ack>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            connector,
            address: address.into(),
            queue,
            acks,
            shutdown,
            state,
            assembler: FrameAssembler::new(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Keep the gun connected until shutdown.
    pub async fn run(mut self) {
        info!("Connection supervisor started for {}", self.address);

        while !self.shutting_down() {
            self.state.send_replace(LinkState::Connecting);

            let attempt = tokio::select! {
                result = self.connector.connect(&self.address) => Some(result),
                _ = shutdown_requested(&mut self.shutdown) => None,
            };

            match attempt {
                None => break,
                Some(Ok(link)) => {
                    if self.serve(link).await == Teardown::Shutdown {
                        break;
                    }
                }
                Some(Err(e)) => warn!("Connection to {} failed: {}", self.address, e),
            }

            self.state.send_replace(LinkState::Disconnected);
            if self.shutting_down() {
                break;
            }

            info!("Reconnecting in {}s", RETRY_INTERVAL.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                _ = shutdown_requested(&mut self.shutdown) => break,
            }
        }

        self.state.send_replace(LinkState::Disconnected);
        info!("Connection supervisor stopped");
    }

    /// Run one connected session and close the link afterwards.
    async fn serve(&mut self, mut link: C::Link) -> Teardown {
        // Acks requested while disconnected answer frames from a previous link
        let mut stale = 0;
        while self.acks.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Dropped {} stale acks", stale);
        }

        let reason = match link.enable_notifications().await {
            Ok(stream) => {
                self.state.send_replace(LinkState::Connected);
                info!("Light gun connected");
                self.pump(&mut link, stream).await
            }
            Err(e) => {
                warn!("Failed to enable notifications: {}", e);
                Teardown::SetupFailed
            }
        };

        link.close().await;
        if self.assembler.buffered_len() > 0 {
            debug!("Dropping {} bytes of partial frame", self.assembler.buffered_len());
        }
        self.assembler.reset();
        info!(
            "Link down ({}): {} frames completed, {} overflows so far",
            reason,
            self.assembler.completed_frames(),
            self.assembler.discarded_frames()
        );
        reason
    }

    async fn pump(&mut self, link: &mut C::Link, mut stream: NotificationStream) -> Teardown {
        let watchdog = tokio::time::sleep(WATCHDOG_TIMEOUT);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                _ = &mut watchdog => {
                    warn!("No frame for {}s, tearing down link", WATCHDOG_TIMEOUT.as_secs());
                    return Teardown::Watchdog;
                }
                _ = shutdown_requested(&mut self.shutdown) => return Teardown::Shutdown,
                notification = stream.next() => {
                    let Some(bytes) = notification else {
                        warn!("Notification stream ended");
                        return Teardown::LinkLost;
                    };
                    trace!("Notification {:?}", String::from_utf8_lossy(&bytes));

                    let completed = self.assembler.completed_frames();
                    for command in self.assembler.feed(&bytes) {
                        debug!("Queued command {}", command.id());
                        self.queue.push(command);
                    }
                    if self.assembler.completed_frames() != completed {
                        watchdog.as_mut().reset(Instant::now() + WATCHDOG_TIMEOUT);
                        trace!("Watchdog rearmed, {} commands pending", self.queue.len());
                    }
                }
                Some(ack) = self.acks.recv() => {
                    debug!("Sending ack {}", char::from(ack.as_byte()));
                    if let Err(e) = link.write(&protocol::ack_payload(ack)).await {
                        warn!("Failed to send ack {:?}: {}", ack, e);
                    }
                }
            }
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
