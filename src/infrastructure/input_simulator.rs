//! Absolute pointer device backed by uinput.

use crate::domain::calibration::AXIS_MAX;
use crate::domain::pointer::{PointerError, PointerSink};
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode,
    UinputAbsSetup,
};
use tracing::{debug, info, trace};

const VENDOR_ID: u16 = 0x1234;
const PRODUCT_ID: u16 = 0x5678;
const VERSION: u16 = 1;

pub struct UinputPointer {
    device: VirtualDevice,
    // Events since the last sync
    pending: Vec<InputEvent>,
}

impl UinputPointer {
    /// Create the virtual device. Needs write access to `/dev/uinput`.
    pub fn new(name: &str) -> Result<Self, PointerError> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_LEFT);

        let axis = AbsInfo::new(0, 0, AXIS_MAX, 0, 0, 0);

        let device = VirtualDevice::builder()?
            .name(name)
            .input_id(InputId::new(BusType::BUS_USB, VENDOR_ID, PRODUCT_ID, VERSION))
            .with_keys(&keys)?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, axis))?
            .with_absolute_axis(&UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, axis))?
            .build()?;

        info!("Virtual pointer \"{}\" created", name);
        Ok(Self {
            device,
            pending: Vec::with_capacity(4),
        })
    }

    fn button(&mut self, pressed: bool) {
        self.pending.push(InputEvent::new(
            EventType::KEY.0,
            KeyCode::BTN_LEFT.0,
            i32::from(pressed),
        ));
    }
}

impl PointerSink for UinputPointer {
    fn press(&mut self) -> Result<(), PointerError> {
        self.button(true);
        Ok(())
    }

    fn release(&mut self) -> Result<(), PointerError> {
        self.button(false);
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), PointerError> {
        self.pending.extend([
            InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_X.0, x),
            InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_Y.0, y),
        ]);
        Ok(())
    }

    /// Deliver the pending events followed by a SYN_REPORT.
    fn sync(&mut self) -> Result<(), PointerError> {
        trace!("Flushing {} pointer events", self.pending.len());
        let result = self.device.emit(&self.pending);
        self.pending.clear();
        result?;
        Ok(())
    }
}

impl Drop for UinputPointer {
    fn drop(&mut self) {
        debug!("Destroying virtual pointer");
    }
}
