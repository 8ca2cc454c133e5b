//! Shared domain types for the light gun session.

/// Orientation reported by the gun, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Orientation {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Orientation {
    pub fn new(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Parse a `"<yaw> <pitch> <roll>"` payload the way `sscanf("%lf %lf %lf")`
    /// reads it.
    ///
    /// Each field takes the longest numeric prefix at its position, so
    /// `"12.5deg"` reads as 12.5 and `"1-2-3"` as three values. Parsing stops
    /// where no number starts; the remaining fields stay at zero. Malformed
    /// payloads are never rejected.
    pub fn parse_lenient(payload: &str) -> Self {
        let mut fields = [0.0f64; 3];
        let mut rest = payload;
        for slot in fields.iter_mut() {
            rest = rest.trim_start();
            let Some((value, len)) = float_prefix(rest) else {
                break;
            };
            *slot = value;
            rest = &rest[len..];
        }
        Self::new(fields[0], fields[1], fields[2])
    }
}

/// Longest prefix of `text` that is a valid float, with its length in bytes.
fn float_prefix(text: &str) -> Option<(f64, usize)> {
    (1..=text.len())
        .rev()
        .filter(|&end| text.is_char_boundary(end))
        .find_map(|end| text[..end].parse::<f64>().ok().map(|value| (value, end)))
}

/// A command sent by the gun, parsed from one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `A` - the gun (re)started its initialization sequence
    Init,
    /// `B` - gyroscope stabilization finished
    StabAck,
    /// `C` - orientation captured while aiming at a calibration target
    CalibrationSample(Orientation),
    /// `D` - trigger pulled
    FireEvent(Orientation),
    /// `E` - aim update without trigger
    AimEvent(Orientation),
}

impl Command {
    /// Parse a frame with its terminator already stripped.
    ///
    /// Returns `None` for an empty frame or an unknown id.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let (&id, payload) = frame.split_first()?;
        let orientation =
            || Orientation::parse_lenient(std::str::from_utf8(payload).unwrap_or(""));

        match id {
            b'A' => Some(Self::Init),
            b'B' => Some(Self::StabAck),
            b'C' => Some(Self::CalibrationSample(orientation())),
            b'D' => Some(Self::FireEvent(orientation())),
            b'E' => Some(Self::AimEvent(orientation())),
            _ => None,
        }
    }

    pub fn id(&self) -> char {
        match self {
            Self::Init => 'A',
            Self::StabAck => 'B',
            Self::CalibrationSample(_) => 'C',
            Self::FireEvent(_) => 'D',
            Self::AimEvent(_) => 'E',
        }
    }
}

/// Stage of the session, owned by the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    Init,
    Stabilizing,
    Calibrating,
    Playing,
}

/// Single-byte acknowledgements written back to the gun at stage transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Initialization screen shown, gun may start stabilizing
    Initialized,
    /// Stabilization accepted, calibration starts
    Stabilized,
    /// All nine calibration points captured
    Calibrated,
}

impl Ack {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Initialized => b'Z',
            Self::Stabilized => b'Y',
            Self::Calibrated => b'X',
        }
    }
}

/// Screen size in pixels, used by calibration and by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn half_width(&self) -> f64 {
        f64::from(self.width / 2)
    }

    pub fn half_height(&self) -> f64 {
        f64::from(self.height / 2)
    }
}

/// Absolute pointer position on the `[0, 65535]` axes of the pointer sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerPosition {
    pub x: i32,
    pub y: i32,
}

impl PointerPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}
