//! Headless instructional overlay.
//!
//! Each stage renders from its own task until stopped. Captions go through
//! `tracing`: a new caption is logged at info, repeats of the same caption
//! only at trace.

use crate::domain::calibration::{target_position, GRID_POINTS};
use crate::domain::models::ScreenSize;
use crate::domain::overlay::{Overlay, OverlayStage};
use crate::domain::session::INIT_SETTLE;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Render tick
pub const FRAME_INTERVAL: Duration = Duration::from_millis(250);

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

pub struct TracingOverlay {
    screen: ScreenSize,
    running: Option<RunningOverlay>,
}

struct RunningOverlay {
    stage: OverlayStage,
    stop: oneshot::Sender<()>,
    point: watch::Sender<usize>,
    handle: JoinHandle<()>,
}

impl TracingOverlay {
    pub fn new(screen: ScreenSize) -> Self {
        Self {
            screen,
            running: None,
        }
    }
}

impl Overlay for TracingOverlay {
    fn start(&mut self, stage: OverlayStage) {
        if let Some(previous) = self.running.take() {
            warn!(
                "{} overlay still running when starting {}, aborting it",
                previous.stage, stage
            );
            previous.handle.abort();
        }

        let (stop, stop_rx) = oneshot::channel();
        let (point, point_rx) = watch::channel(0);
        let handle = tokio::spawn(render(stage, self.screen, stop_rx, point_rx));

        debug!("{} overlay started", stage);
        self.running = Some(RunningOverlay {
            stage,
            stop,
            point,
            handle,
        });
    }

    fn advance_point(&mut self, index: usize) {
        match &self.running {
            Some(running) if running.stage == OverlayStage::Calibrating => {
                running.point.send_replace(index);
            }
            _ => debug!("No calibration overlay to show target {}", index),
        }
    }

    async fn stop_and_join(&mut self) {
        let Some(RunningOverlay {
            stage, stop, handle, ..
        }) = self.running.take()
        else {
            return;
        };

        // The task may already be gone if it was aborted
        let _ = stop.send(());
        if let Err(e) = handle.await {
            warn!("{} overlay task failed: {}", stage, e);
        }
        debug!("{} overlay joined", stage);
    }
}

async fn render(
    stage: OverlayStage,
    screen: ScreenSize,
    mut stop: oneshot::Receiver<()>,
    mut point: watch::Receiver<usize>,
) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut tick: u32 = 0;
    let mut shown = String::new();

    loop {
        let ticked = tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => true,
            changed = point.changed() => {
                if changed.is_err() {
                    break;
                }
                false
            }
        };

        let text = caption(stage, tick, *point.borrow(), screen);
        if text != shown {
            info!("[{}] {}", stage, text);
            shown = text;
        } else {
            trace!("[{}] {} {}", stage, SPINNER[tick as usize % SPINNER.len()], shown);
        }

        if ticked {
            tick = tick.saturating_add(1);
        }
    }
}

/// Caption for `stage`, `tick` render frames after it started.
fn caption(stage: OverlayStage, tick: u32, point: usize, screen: ScreenSize) -> String {
    match stage {
        OverlayStage::Init => {
            let remaining = INIT_SETTLE.saturating_sub(FRAME_INTERVAL * tick);
            format!(
                "Put the gun down and keep it still ({}s)",
                remaining.as_secs_f64().ceil() as u64
            )
        }
        OverlayStage::Stabilizing => "Move the gun along the X, Y and Z axes".to_string(),
        OverlayStage::Calibrating => {
            let (x, y) = target_position(point, screen);
            format!(
                "Aim at target {}/{} at ({}, {}) and pull the trigger",
                point + 1,
                GRID_POINTS,
                x,
                y
            )
        }
    }
}
