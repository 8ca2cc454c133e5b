//! Frame Reassembler
//!
//! BLE notifications carry arbitrary slices of the gun's text stream. This
//! module buffers them and cuts complete `;`-terminated frames.

use crate::domain::models::Command;
use tracing::{debug, trace};

/// Frame terminator
pub const TERMINATOR: u8 = b';';

/// Capacity of the accumulation buffer. A frame must complete before the
/// buffered length reaches this value.
pub const MAX_FRAME_LEN: usize = 30;

#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    completed: u64,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
            completed: 0,
            discarded: 0,
        }
    }

    /// Feed one notification and return the commands it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Command> {
        if bytes.is_empty() {
            return Vec::new();
        }

        if self.buffer.len() + bytes.len() >= MAX_FRAME_LEN {
            debug!(
                "Frame overflow ({} buffered + {} incoming), resyncing",
                self.buffer.len(),
                bytes.len()
            );
            self.buffer.clear();
            self.discarded += 1;
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);

        let mut commands = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == TERMINATOR) {
            let frame: Vec<u8> = self.buffer.drain(..=end).collect();
            self.completed += 1;

            let body = &frame[..frame.len() - 1];
            match Command::parse(body) {
                Some(command) => commands.push(command),
                None => trace!("Ignoring frame {:?}", String::from_utf8_lossy(body)),
            }
        }

        commands
    }

    /// Number of terminated frames seen so far, including unknown ids.
    pub fn completed_frames(&self) -> u64 {
        self.completed
    }

    /// Number of overflow resyncs.
    pub fn discarded_frames(&self) -> u64 {
        self.discarded
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame, e.g. after the link was torn down.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Orientation;

    #[test]
    fn test_stream_in_one_chunk() {
        let mut assembler = FrameAssembler::new();
        let commands = assembler.feed(b"A;C1 2 3;D4 5 6;");
        assert_eq!(
            commands,
            vec![
                Command::Init,
                Command::CalibrationSample(Orientation::new(1.0, 2.0, 3.0)),
                Command::FireEvent(Orientation::new(4.0, 5.0, 6.0)),
            ]
        );
        assert_eq!(assembler.completed_frames(), 3);
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn test_frame_split_across_notifications() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(b"E12.5 ").is_empty());
        assert!(assembler.feed(b"-3").is_empty());
        let commands = assembler.feed(b" 0.25;B");
        assert_eq!(
            commands,
            vec![Command::AimEvent(Orientation::new(12.5, -3.0, 0.25))]
        );
        // The trailing `B` waits for its terminator
        assert_eq!(assembler.buffered_len(), 1);
        assert_eq!(assembler.feed(b";"), vec![Command::StabAck]);
    }

    #[test]
    fn test_overflow_resyncs() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&[b'7'; 29]).is_empty());
        assert_eq!(assembler.buffered_len(), 29);

        assert!(assembler.feed(b";").is_empty());
        assert_eq!(assembler.buffered_len(), 0);
        assert_eq!(assembler.discarded_frames(), 1);
        assert_eq!(assembler.completed_frames(), 0);

        // Next frame parses normally
        assert_eq!(assembler.feed(b"A;"), vec![Command::Init]);
    }

    #[test]
    fn test_oversized_notification_is_ignored() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(b"A").is_empty());
        assert!(assembler.feed(&[b' '; 40]).is_empty());
        assert_eq!(assembler.buffered_len(), 0);
    }

    #[test]
    fn test_unknown_frames_still_count() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(b";Z9;").is_empty());
        assert_eq!(assembler.completed_frames(), 2);
    }
}
