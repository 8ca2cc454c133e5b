//! Virtual Pointer Emitter
//!
//! Turns a mapped position plus click intent into the event sequence an
//! absolute pointer device expects. The device itself is behind
//! [`PointerSink`] so the session never touches uinput directly.

use crate::domain::models::PointerPosition;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Pause between press and release so the host registers a distinct click
pub const CLICK_SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("pointer device I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Absolute pointer with a single button. Primitives are queued by the sink
/// and delivered on [`PointerSink::sync`].
pub trait PointerSink: Send {
    fn press(&mut self) -> Result<(), PointerError>;
    fn release(&mut self) -> Result<(), PointerError>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError>;
    fn sync(&mut self) -> Result<(), PointerError>;
}

pub struct PointerEmitter<S: PointerSink> {
    sink: S,
}

impl<S: PointerSink> PointerEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Click at `position`: press, move, sync, settle, release, move, sync.
    pub async fn fire(&mut self, position: PointerPosition) {
        trace!("Fire at ({}, {})", position.x, position.y);
        self.report(Some(true), position);
        tokio::time::sleep(CLICK_SETTLE).await;
        self.report(Some(false), position);
    }

    /// Move to `position` without touching the button.
    pub fn aim(&mut self, position: PointerPosition) {
        trace!("Aim at ({}, {})", position.x, position.y);
        self.report(None, position);
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Emit one report. Every primitive is attempted even if an earlier one
    /// failed; failures are dropped.
    fn report(&mut self, button: Option<bool>, position: PointerPosition) {
        let results = [
            match button {
                Some(true) => self.sink.press(),
                Some(false) => self.sink.release(),
                None => Ok(()),
            },
            self.sink.move_to(position.x, position.y),
            self.sink.sync(),
        ];

        for err in results.into_iter().filter_map(Result::err) {
            warn!("Pointer emission failed: {}", err);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PointerEvent {
        Press,
        Release,
        Move(i32, i32),
        Sync,
    }

    /// Sink that records every primitive; clones share the same log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        pub events: Arc<Mutex<Vec<PointerEvent>>>,
        pub fail_moves: bool,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<PointerEvent> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: PointerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl PointerSink for RecordingSink {
        fn press(&mut self) -> Result<(), PointerError> {
            self.record(PointerEvent::Press);
            Ok(())
        }

        fn release(&mut self) -> Result<(), PointerError> {
            self.record(PointerEvent::Release);
            Ok(())
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError> {
            if self.fail_moves {
                return Err(std::io::Error::other("device gone").into());
            }
            self.record(PointerEvent::Move(x, y));
            Ok(())
        }

        fn sync(&mut self) -> Result<(), PointerError> {
            self.record(PointerEvent::Sync);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_sequence() {
        let sink = RecordingSink::default();
        let mut emitter = PointerEmitter::new(sink.clone());

        let start = tokio::time::Instant::now();
        emitter.fire(PointerPosition::new(100, 200)).await;
        assert!(start.elapsed() >= CLICK_SETTLE);

        use PointerEvent::*;
        assert_eq!(
            sink.events(),
            vec![Press, Move(100, 200), Sync, Release, Move(100, 200), Sync]
        );
    }

    #[test]
    fn test_aim_sequence() {
        let sink = RecordingSink::default();
        let mut emitter = PointerEmitter::new(sink.clone());
        emitter.aim(PointerPosition::new(7, 9));

        use PointerEvent::*;
        assert_eq!(sink.events(), vec![Move(7, 9), Sync]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_primitive_does_not_stop_the_report() {
        let sink = RecordingSink {
            fail_moves: true,
            ..Default::default()
        };
        let mut emitter = PointerEmitter::new(sink.clone());
        emitter.fire(PointerPosition::new(1, 1)).await;

        use PointerEvent::*;
        assert_eq!(sink.events(), vec![Press, Sync, Release, Sync]);
    }
}
