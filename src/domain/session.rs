//! Session State Machine
//!
//! Single consumer of the command queue. Owns the session mode, the
//! calibration samples and model, the pointer emitter and the overlay; nothing
//! else mutates them.
//!
//! ```text
//!  Idle --A--> Init --(5 s)--> Stabilizing --B--> Calibrating --9 x C--> Playing
//!               ^                                      |  ^                 |
//!               |                                      +--+ retake on       |
//!               +----------------- A from any mode ----   degenerate grid --+
//! ```

use crate::domain::calibration::{CalibrationModel, CalibrationSampleSet, GRID_POINTS};
use crate::domain::models::{Ack, Command, Orientation, ScreenSize, SessionMode};
use crate::domain::overlay::Overlay;
use crate::domain::pointer::{PointerEmitter, PointerSink};
use crate::domain::queue::CommandQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Time the init overlay stays up before stabilization starts
pub const INIT_SETTLE: Duration = Duration::from_secs(5);

pub struct Session<S: PointerSink, O: Overlay> {
    mode: SessionMode,
    samples: CalibrationSampleSet,
    model: Option<CalibrationModel>,
    screen: ScreenSize,
    emitter: PointerEmitter<S>,
    overlay: O,
    acks: mpsc::UnboundedSender<Ack>,
    shutdown: watch::Receiver<bool>,
}

impl<S: PointerSink, O: Overlay> Session<S, O> {
    pub fn new(
        screen: ScreenSize,
        sink: S,
        overlay: O,
        acks: mpsc::UnboundedSender<Ack>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            mode: SessionMode::Idle,
            samples: CalibrationSampleSet::new(),
            model: None,
            screen,
            emitter: PointerEmitter::new(sink),
            overlay,
            acks,
            shutdown,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Process commands until shutdown, then close any running overlay and
    /// hand the pointer sink back to the caller.
    pub async fn run(mut self, queue: Arc<CommandQueue>) -> S {
        info!("Session started");
        let mut shutdown = self.shutdown.clone();

        while let Some(batch) = queue.drain(&mut shutdown).await {
            for command in batch {
                self.handle(command).await;
            }
        }

        if let Some(stage) = self.mode.overlay_stage() {
            debug!("Closing {} overlay", stage);
            self.overlay.stop_and_join().await;
        }
        if !queue.is_empty() {
            debug!("{} commands left unprocessed", queue.len());
        }
        info!("Session stopped in {:?} mode", self.mode());
        self.emitter.into_sink()
    }

    /// Apply one command. Commands not accepted in the current mode are
    /// dropped without side effects.
    pub async fn handle(&mut self, command: Command) {
        match (command, self.mode) {
            (Command::Init, _) => self.initialize().await,
            (Command::StabAck, SessionMode::Stabilizing) => self.start_calibration().await,
            (Command::CalibrationSample(sample), SessionMode::Calibrating) => {
                self.record_sample(sample).await
            }
            (Command::FireEvent(orientation), SessionMode::Playing) => {
                if let Some(model) = &self.model {
                    let position = model.angle_to_screen(orientation.yaw, orientation.pitch);
                    debug!("Fire at ({}, {})", position.x, position.y);
                    self.emitter.fire(position).await;
                }
            }
            (Command::AimEvent(orientation), SessionMode::Playing) => {
                if let Some(model) = &self.model {
                    let position = model.angle_to_screen(orientation.yaw, orientation.pitch);
                    self.emitter.aim(position);
                }
            }
            (command, mode) => trace!("Ignoring '{}' in {:?} mode", command.id(), mode),
        }
    }

    async fn initialize(&mut self) {
        if self.mode.overlay_stage().is_some() {
            debug!("Restarting from {:?}, dropping progress", self.mode);
            self.overlay.stop_and_join().await;
        }
        if !self.samples.is_empty() {
            debug!("Discarding {} calibration samples", self.samples.len());
        }
        self.samples.reset();
        self.model = None;

        info!("Initialization sequence");
        self.enter(SessionMode::Init);
        self.acknowledge(Ack::Initialized);

        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(INIT_SETTLE) => {}
            _ = shutdown.wait_for(|&stop| stop) => {
                debug!("Shutdown during init settle");
                return;
            }
        }

        self.overlay.stop_and_join().await;
        info!("Waiting for gyroscope stabilization");
        self.enter(SessionMode::Stabilizing);
    }

    async fn start_calibration(&mut self) {
        self.acknowledge(Ack::Stabilized);
        info!("Stabilization OK");
        self.overlay.stop_and_join().await;

        self.samples.reset();
        info!("Calibration");
        self.enter(SessionMode::Calibrating);
    }

    async fn record_sample(&mut self, sample: Orientation) {
        let Some(index) = self.samples.push(sample) else {
            self.samples.reset();
            return;
        };
        debug!(
            "Calibration point {}: yaw {:.2} pitch {:.2} roll {:.2}",
            index, sample.yaw, sample.pitch, sample.roll
        );

        if index + 1 < GRID_POINTS {
            self.overlay.advance_point(index + 1);
            return;
        }

        match CalibrationModel::compute(&self.samples, self.screen) {
            Ok(model) => {
                self.acknowledge(Ack::Calibrated);
                info!(
                    "Calibration OK: x [{:.2} {:.2} {:.2}] y [{:.2} {:.2} {:.2}] \
                     slopes ({:.3}, {:.3}, {:.3}, {:.3}) on {}x{}",
                    model.left,
                    model.middle_x,
                    model.right,
                    model.down,
                    model.middle_y,
                    model.up,
                    model.sx1,
                    model.sx2,
                    model.sy1,
                    model.sy2,
                    model.screen.width,
                    model.screen.height
                );
                self.samples.reset();
                self.overlay.stop_and_join().await;
                self.model = Some(model);
                info!("Game");
                self.enter(SessionMode::Playing);
            }
            Err(e) => {
                warn!("Calibration failed ({}), retaking the grid", e);
                self.samples.reset();
                self.overlay.advance_point(0);
            }
        }
    }

    /// Switch mode and start its overlay, if it has one.
    fn enter(&mut self, mode: SessionMode) {
        self.mode = mode;
        if let Some(stage) = mode.overlay_stage() {
            self.overlay.start(stage);
        }
    }

    fn acknowledge(&self, ack: Ack) {
        if self.acks.send(ack).is_err() {
            warn!("Link supervisor gone, dropping ack '{}'", ack.as_byte() as char);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::overlay::OverlayStage;
    use crate::domain::overlay::tests::{OverlayEvent, RecordingOverlay};
    use crate::domain::pointer::tests::{PointerEvent, RecordingSink};

    const SCREEN: ScreenSize = ScreenSize {
        width: 1920,
        height: 1080,
    };

    struct Harness {
        session: Session<RecordingSink, RecordingOverlay>,
        sink: RecordingSink,
        overlay: RecordingOverlay,
        acks: mpsc::UnboundedReceiver<Ack>,
        shutdown: watch::Sender<bool>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = RecordingSink::default();
            let overlay = RecordingOverlay::default();
            let (ack_tx, acks) = mpsc::unbounded_channel();
            let (shutdown, shutdown_rx) = watch::channel(false);
            let session = Session::new(SCREEN, sink.clone(), overlay.clone(), ack_tx, shutdown_rx);
            Self {
                session,
                sink,
                overlay,
                acks,
                shutdown,
            }
        }

        fn acks(&mut self) -> Vec<Ack> {
            let mut acks = Vec::new();
            while let Ok(ack) = self.acks.try_recv() {
                acks.push(ack);
            }
            acks
        }

        async fn calibrate(&mut self, samples: &[Orientation]) {
            for &sample in samples {
                self.session
                    .handle(Command::CalibrationSample(sample))
                    .await;
            }
        }

        async fn to_calibrating(&mut self) {
            self.session.handle(Command::Init).await;
            self.session.handle(Command::StabAck).await;
            assert_eq!(self.session.mode(), SessionMode::Calibrating);
            self.acks();
            self.overlay.clear();
        }
    }

    fn grid() -> Vec<Orientation> {
        let yaw = [-10.0, -10.0, -10.0, 0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        let pitch = [10.0, 0.0, -10.0, -10.0, 0.0, 10.0, 10.0, 0.0, -10.0];
        yaw.iter()
            .zip(pitch.iter())
            .map(|(&y, &p)| Orientation::new(y, p, 0.0))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_sequence() {
        let mut h = Harness::new();
        let start = tokio::time::Instant::now();

        h.session.handle(Command::Init).await;

        assert!(start.elapsed() >= INIT_SETTLE);
        assert_eq!(h.session.mode(), SessionMode::Stabilizing);
        assert_eq!(h.acks(), vec![Ack::Initialized]);
        assert_eq!(
            h.overlay.events(),
            vec![
                OverlayEvent::Start(OverlayStage::Init),
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Stabilizing),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stab_ack_only_in_stabilizing() {
        let mut h = Harness::new();
        h.session.handle(Command::StabAck).await;
        assert_eq!(h.session.mode(), SessionMode::Idle);
        assert!(h.acks().is_empty());

        h.session.handle(Command::Init).await;
        h.overlay.clear();
        h.acks();

        h.session.handle(Command::StabAck).await;
        assert_eq!(h.session.mode(), SessionMode::Calibrating);
        assert_eq!(h.acks(), vec![Ack::Stabilized]);
        assert_eq!(
            h.overlay.events(),
            vec![
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Calibrating)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_while_calibrating_is_ignored() {
        let mut h = Harness::new();
        h.to_calibrating().await;

        h.session
            .handle(Command::FireEvent(Orientation::new(1.0, 2.0, 3.0)))
            .await;
        h.session
            .handle(Command::AimEvent(Orientation::new(1.0, 2.0, 3.0)))
            .await;

        assert_eq!(h.session.mode(), SessionMode::Calibrating);
        assert!(h.sink.events().is_empty());
        assert!(h.overlay.events().is_empty());
        assert!(h.acks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_then_fire() {
        let mut h = Harness::new();
        h.to_calibrating().await;

        h.calibrate(&grid()[..8]).await;
        assert_eq!(h.session.mode(), SessionMode::Calibrating);
        assert!(h.acks().is_empty());

        h.calibrate(&grid()[8..]).await;
        assert_eq!(h.session.mode(), SessionMode::Playing);
        assert_eq!(h.acks(), vec![Ack::Calibrated]);

        let mut expected: Vec<OverlayEvent> = (1..9).map(OverlayEvent::Advance).collect();
        expected.push(OverlayEvent::Stop);
        assert_eq!(h.overlay.events(), expected);

        let model = h.session.model.as_ref().unwrap();
        assert_eq!(model.middle_x, 0.0);
        assert_eq!(model.middle_y, 0.0);

        // Extra samples after the transition are ignored
        h.calibrate(&grid()[..1]).await;
        assert_eq!(h.session.mode(), SessionMode::Playing);
        assert!(h.acks().is_empty());

        h.session
            .handle(Command::FireEvent(Orientation::new(-10.0, 10.0, 0.0)))
            .await;

        use PointerEvent::*;
        assert_eq!(
            h.sink.events(),
            vec![
                Press,
                Move(1023, 1820),
                Sync,
                Release,
                Move(1023, 1820),
                Sync
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_aim_moves_without_click() {
        let mut h = Harness::new();
        h.to_calibrating().await;
        h.calibrate(&grid()).await;

        h.session
            .handle(Command::AimEvent(Orientation::new(0.0, 0.0, 45.0)))
            .await;

        use PointerEvent::*;
        assert_eq!(h.sink.events(), vec![Move(32767, 32767), Sync]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_calibration_is_retaken() {
        let mut h = Harness::new();
        h.to_calibrating().await;

        let flat: Vec<Orientation> = grid()
            .into_iter()
            .map(|o| Orientation::new(5.0, o.pitch, 0.0))
            .collect();
        h.calibrate(&flat).await;

        assert_eq!(h.session.mode(), SessionMode::Calibrating);
        assert!(h.session.model.as_ref().is_none());
        assert!(h.acks().is_empty());
        assert_eq!(h.overlay.events().last(), Some(&OverlayEvent::Advance(0)));

        h.calibrate(&grid()).await;
        assert_eq!(h.session.mode(), SessionMode::Playing);
        assert_eq!(h.acks(), vec![Ack::Calibrated]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_during_calibration_drops_progress() {
        let mut h = Harness::new();
        h.to_calibrating().await;
        h.calibrate(&grid()[..4]).await;
        h.overlay.clear();

        h.session.handle(Command::Init).await;
        assert_eq!(h.session.mode(), SessionMode::Stabilizing);
        assert!(h.session.samples.is_empty());
        assert_eq!(
            h.overlay.events(),
            vec![
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Init),
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Stabilizing),
            ]
        );

        h.session.handle(Command::StabAck).await;
        h.calibrate(&grid()[..8]).await;
        // A full grid is needed again, the four earlier points are gone
        assert_eq!(h.session.mode(), SessionMode::Calibrating);
        h.calibrate(&grid()[8..]).await;
        assert_eq!(h.session.mode(), SessionMode::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_during_play_has_no_overlay_to_stop() {
        let mut h = Harness::new();
        h.to_calibrating().await;
        h.calibrate(&grid()).await;
        h.overlay.clear();

        h.session.handle(Command::Init).await;
        assert!(h.session.model.as_ref().is_none());
        assert_eq!(
            h.overlay.events().first(),
            Some(&OverlayEvent::Start(OverlayStage::Init))
        );

        h.session
            .handle(Command::FireEvent(Orientation::default()))
            .await;
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_queue_and_closes_overlay_on_shutdown() {
        let h = Harness::new();
        let queue = Arc::new(CommandQueue::new());
        queue.push(Command::Init);
        queue.push(Command::StabAck);
        queue.push(Command::CalibrationSample(grid()[0]));

        let overlay = h.overlay.clone();
        let task = tokio::spawn(h.session.run(queue.clone()));

        tokio::time::sleep(INIT_SETTLE * 2).await;
        assert!(queue.is_empty());
        h.shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(
            overlay.events(),
            vec![
                OverlayEvent::Start(OverlayStage::Init),
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Stabilizing),
                OverlayEvent::Stop,
                OverlayEvent::Start(OverlayStage::Calibrating),
                OverlayEvent::Advance(1),
                OverlayEvent::Stop,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_init_settle_short() {
        let h = Harness::new();
        let queue = Arc::new(CommandQueue::new());
        queue.push(Command::Init);

        let overlay = h.overlay.clone();
        let task = tokio::spawn(h.session.run(queue));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let start = tokio::time::Instant::now();
        h.shutdown.send(true).unwrap();
        task.await.unwrap();
        assert!(start.elapsed() < INIT_SETTLE);

        // Init overlay started, then closed by the shutdown path only
        assert_eq!(
            overlay.events(),
            vec![OverlayEvent::Start(OverlayStage::Init), OverlayEvent::Stop]
        );
    }
}
