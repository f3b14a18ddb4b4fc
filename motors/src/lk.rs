//! LK-TECH motors in multi-motor broadcast mode.
//!
//! Up to four motors on one bus. Each replies on `0x140 + id`; all are commanded by one frame on
//! `0x280` carrying a little-endian torque current per motor.

use core::cell::Cell;

use canmux::{
    slot_for_device, BusHardware, CanHub, ContributionError, Endpoint, EndpointConfig,
    EndpointHandle, FrameHandler,
};
use critical_section::Mutex;

use crate::{clamp_output, MotorError};

pub const FEEDBACK_BASE: u16 = 0x140;
pub const BROADCAST_COMMAND_ID: u16 = 0x280;
pub const MAX_ID: u8 = 4;

/// Torque current range accepted in broadcast mode.
pub const OUTPUT_LIMIT: i16 = 2000;

/// Reply code of a torque-control command.
const TORQUE_REPLY: u8 = 0xA1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LkFeedback {
    pub temperature: i8,
    pub current: i16,
    /// Degrees per second.
    pub speed: i16,
    /// Single-turn encoder position.
    pub encoder: u16,
    pub frames: u32,
}

impl LkFeedback {
    pub const ZERO: Self = Self {
        temperature: 0,
        current: 0,
        speed: 0,
        encoder: 0,
        frames: 0,
    };

    /// Decode a torque-control reply. Other replies and short payloads are ignored.
    pub fn update(&mut self, data: &[u8]) -> bool {
        if data.len() < 8 || data[0] != TORQUE_REPLY {
            return false;
        }
        self.temperature = data[1] as i8;
        self.current = i16::from_le_bytes([data[2], data[3]]);
        self.speed = i16::from_le_bytes([data[4], data[5]]);
        self.encoder = u16::from_le_bytes([data[6], data[7]]);
        self.frames = self.frames.wrapping_add(1);
        true
    }
}

impl Default for LkFeedback {
    fn default() -> Self {
        Self::ZERO
    }
}

/// One LK motor, meant to live in a `static`.
pub struct LkMotor {
    id: u8,
    feedback: Mutex<Cell<LkFeedback>>,
}

impl LkMotor {
    pub const fn new(id: u8) -> Self {
        Self {
            id,
            feedback: Mutex::new(Cell::new(LkFeedback::ZERO)),
        }
    }

    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn endpoint(&self, label: &'static str) -> Result<EndpointConfig<'_>, u8> {
        if self.id == 0 || self.id > MAX_ID {
            return Err(self.id);
        }
        Ok(
            EndpointConfig::new(label, FEEDBACK_BASE + u16::from(self.id), BROADCAST_COMMAND_ID)
                .with_handler(self),
        )
    }

    pub fn register<'a, H: BusHardware, const N: usize>(
        &'a self,
        hub: &mut CanHub<'a, H, N>,
        bus: u8,
        label: &'static str,
    ) -> Result<EndpointHandle, MotorError<H::Error>> {
        let config = self.endpoint(label).map_err(MotorError::InvalidDeviceId)?;
        Ok(hub.register(bus, config)?)
    }

    pub fn feedback(&self) -> LkFeedback {
        critical_section::with(|cs| self.feedback.borrow(cs).get())
    }

    pub fn command(&self, output: f32) -> [u8; 2] {
        clamp_output(output, OUTPUT_LIMIT).to_le_bytes()
    }

    pub fn write_command<'a, H: BusHardware, const N: usize>(
        &self,
        hub: &mut CanHub<'a, H, N>,
        handle: EndpointHandle,
        output: f32,
    ) -> Result<(), ContributionError> {
        hub.write_contribution(handle, slot_for_device(self.id), self.command(output))
    }
}

impl FrameHandler for LkMotor {
    fn on_frame(&self, endpoint: &Endpoint) {
        critical_section::with(|cs| {
            let cell = self.feedback.borrow(cs);
            let mut feedback = cell.get();
            if feedback.update(endpoint.payload().bytes()) {
                cell.set(feedback);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torque_reply_is_little_endian() {
        let mut fb = LkFeedback::ZERO;
        assert!(fb.update(&[0xA1, 35, 0x10, 0xFF, 0x2C, 0x01, 0x00, 0x40]));
        assert_eq!(fb.temperature, 35);
        assert_eq!(fb.current, -240);
        assert_eq!(fb.speed, 300);
        assert_eq!(fb.encoder, 0x4000);
    }

    #[test]
    fn other_replies_are_ignored() {
        let mut fb = LkFeedback::ZERO;
        assert!(!fb.update(&[0x9C, 1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(fb, LkFeedback::ZERO);
    }

    #[test]
    fn command_is_little_endian_and_clamped() {
        let motor = LkMotor::new(2);
        assert_eq!(motor.command(-240.0), [0x10, 0xFF]);
        assert_eq!(motor.command(5000.0), 2000i16.to_le_bytes());
    }
}
