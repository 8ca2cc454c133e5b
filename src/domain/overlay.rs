//! Instructional overlay capability.
//!
//! The session starts one overlay per UI-bearing stage and joins it before
//! moving on, so two overlays never render at the same time.

use crate::domain::models::SessionMode;
use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStage {
    /// "Put the gun down" with the settle countdown
    Init,
    /// "Move the gun along X, Y and Z" with a spinner
    Stabilizing,
    /// One of the nine calibration targets
    Calibrating,
}

impl fmt::Display for OverlayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayStage::Init => "init",
            OverlayStage::Stabilizing => "stabilizing",
            OverlayStage::Calibrating => "calibrating",
        };
        f.write_str(name)
    }
}

impl SessionMode {
    /// Overlay shown while in this mode, if any
    pub fn overlay_stage(&self) -> Option<OverlayStage> {
        match self {
            SessionMode::Init => Some(OverlayStage::Init),
            SessionMode::Stabilizing => Some(OverlayStage::Stabilizing),
            SessionMode::Calibrating => Some(OverlayStage::Calibrating),
            SessionMode::Idle | SessionMode::Playing => None,
        }
    }
}

pub trait Overlay: Send {
    /// Begin rendering `stage`. The previous overlay must have been stopped.
    fn start(&mut self, stage: OverlayStage);

    /// Show calibration target `index` (0..9). Ignored outside calibration.
    fn advance_point(&mut self, index: usize);

    /// Ask the running overlay to exit and wait until it has.
    fn stop_and_join(&mut self) -> impl Future<Output = ()> + Send;
}
