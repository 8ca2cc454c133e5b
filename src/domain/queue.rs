//! Command Queue
//!
//! FIFO between the notification path (producer) and the session state
//! machine (single consumer). Pushing never blocks; the consumer waits on a
//! [`Notify`] and drains everything that accumulated since its last wake-up.

use crate::domain::models::Command;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{watch, Notify};

#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Mutex<VecDeque<Command>>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command and wake the consumer.
    pub fn push(&self, command: Command) {
        self.lock().push_back(command);
        self.notify.notify_one();
    }

    /// Wait until at least one command is queued, then take all of them in
    /// arrival order.
    ///
    /// Returns `None` once shutdown has been requested, even if commands are
    /// still pending.
    pub async fn drain(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Vec<Command>> {
        loop {
            if *shutdown.borrow() {
                return None;
            }

            let batch: Vec<Command> = self.lock().drain(..).collect();
            if !batch.is_empty() {
                return Some(batch);
            }

            // A push racing with the check above leaves a permit in `notify`,
            // so the wake-up is never lost.
            tokio::select! {
                _ = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        // A panicking producer cannot leave the deque half-updated
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
