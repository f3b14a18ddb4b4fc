//! DJI RoboMaster motors: M3508 (C620 ESC), M2006 (C610 ESC) and GM6020.
//!
//! - Feedback arrives on `0x200 + id` (M3508, M2006) or `0x204 + id` (GM6020), big-endian:
//!   rotor angle (0..8191), speed (rpm), torque current, temperature.
//! - Commands for four motors share one frame, big-endian `i16` per motor.
//!
//! | Model | ids | Command frame (ids 1-4 / 5-8) | Limit |
//! | ----- | --- | ----------------------------- | ----- |
//! | M3508 | 1..=8 | `0x200` / `0x1FF` | ±16384 |
//! | M2006 | 1..=8 | `0x200` / `0x1FF` | ±10000 |
//! | GM6020 voltage | 1..=7 | `0x1FF` / `0x2FF` | ±25000 |
//! | GM6020 current | 1..=7 | `0x1FE` / `0x2FE` | ±16384 |

use core::cell::Cell;
use core::f32::consts::PI;

use canmux::{
    slot_for_device, BusHardware, CanHub, ContributionError, Endpoint, EndpointConfig,
    EndpointHandle, FrameHandler,
};
use critical_section::Mutex;

use crate::{clamp_output, MotorError};

/// Encoder counts per rotor revolution.
pub const ECD_RANGE: i32 = 8192;

const RPM_TO_RAD_S: f32 = 2.0 * PI / 60.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DjiModel {
    M3508,
    M2006,
    /// GM6020 driven with voltage commands.
    Gm6020Voltage,
    /// GM6020 driven with current commands (firmware newer than 2023).
    Gm6020Current,
}

impl DjiModel {
    const fn is_gm6020(self) -> bool {
        matches!(self, DjiModel::Gm6020Voltage | DjiModel::Gm6020Current)
    }

    /// Highest device id the model can be set to.
    pub const fn max_id(self) -> u8 {
        if self.is_gm6020() {
            7
        } else {
            8
        }
    }

    /// Identifier of the feedback frame of motor `id`.
    pub const fn feedback_id(self, id: u8) -> u16 {
        let base = if self.is_gm6020() { 0x204 } else { 0x200 };
        base + id as u16
    }

    /// Identifier of the command frame carrying motor `id`.
    pub const fn command_id(self, id: u8) -> u16 {
        let low = id <= 4;
        match self {
            DjiModel::M3508 | DjiModel::M2006 => {
                if low {
                    0x200
                } else {
                    0x1FF
                }
            }
            DjiModel::Gm6020Voltage => {
                if low {
                    0x1FF
                } else {
                    0x2FF
                }
            }
            DjiModel::Gm6020Current => {
                if low {
                    0x1FE
                } else {
                    0x2FE
                }
            }
        }
    }

    /// Largest raw command magnitude.
    pub const fn output_limit(self) -> i16 {
        match self {
            DjiModel::M3508 | DjiModel::Gm6020Current => 16_384,
            DjiModel::M2006 => 10_000,
            DjiModel::Gm6020Voltage => 25_000,
        }
    }
}

/// Decoded feedback of one motor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DjiFeedback {
    /// Rotor angle, encoder counts.
    pub angle: u16,
    pub speed_rpm: i16,
    /// Raw torque current.
    pub current: i16,
    /// Degrees Celsius.
    pub temperature: u8,
    /// Rotor angle accumulated across turns, encoder counts. Wide enough for centuries of
    /// continuous rotation; wraps instead of overflowing.
    pub total_counts: i64,
    /// Frames decoded.
    pub frames: u32,
}

impl DjiFeedback {
    pub const ZERO: Self = Self {
        angle: 0,
        speed_rpm: 0,
        current: 0,
        temperature: 0,
        total_counts: 0,
        frames: 0,
    };

    /// Decode a feedback payload. Payloads shorter than 7 bytes are ignored.
    ///
    /// The rotor cannot turn half a revolution between two frames, so of the two possible
    /// wrap-around deltas the shorter one is taken.
    pub fn update(&mut self, data: &[u8]) -> bool {
        if data.len() < 7 {
            return false;
        }
        let angle = u16::from_be_bytes([data[0], data[1]]);

        if self.frames > 0 {
            let delta = i32::from(angle) - i32::from(self.angle);
            let wrapped = if delta > 0 {
                delta - ECD_RANGE
            } else {
                delta + ECD_RANGE
            };
            let step = if delta.abs() <= wrapped.abs() {
                delta
            } else {
                wrapped
            };
            self.total_counts = self.total_counts.wrapping_add(i64::from(step));
        } else {
            self.total_counts = i64::from(angle);
        }

        self.angle = angle;
        self.speed_rpm = i16::from_be_bytes([data[2], data[3]]);
        self.current = i16::from_be_bytes([data[4], data[5]]);
        self.temperature = data[6];
        self.frames = self.frames.wrapping_add(1);
        true
    }

    /// Output shaft angle in radians for a gearbox of `reduction` : 1.
    pub fn shaft_angle(&self, reduction: f32) -> f32 {
        self.total_counts as f32 * (2.0 * PI / ECD_RANGE as f32) / reduction
    }

    /// Output shaft velocity in rad/s for a gearbox of `reduction` : 1.
    pub fn shaft_velocity(&self, reduction: f32) -> f32 {
        f32::from(self.speed_rpm) / reduction * RPM_TO_RAD_S
    }
}

impl Default for DjiFeedback {
    fn default() -> Self {
        Self::ZERO
    }
}

/// One DJI motor. Meant to live in a `static` so it can be the endpoint's frame handler.
pub struct DjiMotor {
    model: DjiModel,
    id: u8,
    feedback: Mutex<Cell<DjiFeedback>>,
}

impl DjiMotor {
    pub const fn new(model: DjiModel, id: u8) -> Self {
        Self {
            model,
            id,
            feedback: Mutex::new(Cell::new(DjiFeedback::ZERO)),
        }
    }

    #[inline]
    pub fn model(&self) -> DjiModel {
        self.model
    }

    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Endpoint request for this motor, handled by `self`.
    pub fn endpoint(&self, label: &'static str) -> Result<EndpointConfig<'_>, u8> {
        if self.id == 0 || self.id > self.model.max_id() {
            return Err(self.id);
        }
        Ok(EndpointConfig::new(
            label,
            self.model.feedback_id(self.id),
            self.model.command_id(self.id),
        )
        .with_handler(self))
    }

    /// Register the motor on bus `bus` (1-based).
    pub fn register<'a, H: BusHardware, const N: usize>(
        &'a self,
        hub: &mut CanHub<'a, H, N>,
        bus: u8,
        label: &'static str,
    ) -> Result<EndpointHandle, MotorError<H::Error>> {
        let config = self.endpoint(label).map_err(MotorError::InvalidDeviceId)?;
        Ok(hub.register(bus, config)?)
    }

    /// Latest feedback.
    pub fn feedback(&self) -> DjiFeedback {
        critical_section::with(|cs| self.feedback.borrow(cs).get())
    }

    /// Raw command bytes for `output`, clamped to the model's limit.
    pub fn command(&self, output: f32) -> [u8; 2] {
        clamp_output(output, self.model.output_limit()).to_be_bytes()
    }

    /// Write `output` into this motor's slot of its shared command frame.
    pub fn write_command<'a, H: BusHardware, const N: usize>(
        &self,
        hub: &mut CanHub<'a, H, N>,
        handle: EndpointHandle,
        output: f32,
    ) -> Result<(), ContributionError> {
        hub.write_contribution(handle, slot_for_device(self.id), self.command(output))
    }
}

impl FrameHandler for DjiMotor {
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
