//! Board status LEDs.
//!
//! The wheelbot carries two: a heartbeat that toggles while the control loop runs, and a fault LED
//! that latches on once the CAN layer reports a fatal error.

use embedded_hal::digital::v2::OutputPin;

/// Whether the LED is driven active-high or active-low on the board wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveLevel {
    High,
    Low,
}

/// LED that remembers its active level and last driven state.
pub struct Led<PIN: OutputPin> {
    pin: PIN,
    active: ActiveLevel,
    is_on: bool,
    latched: bool,
}

impl<PIN: OutputPin> Led<PIN> {
    /// Wrap `pin`, starting OFF.
    pub fn new(pin: PIN, active: ActiveLevel) -> Self {
        let mut led = Self {
            pin,
            active,
            is_on: true,
            latched: false,
        };
        led.set(false);
        led
    }

    pub fn active_low(pin: PIN) -> Self {
        Self::new(pin, ActiveLevel::Low)
    }

    /// Drive the LED logically ON or OFF. Ignored once latched.
    pub fn set(&mut self, on: bool) {
        if self.latched {
            return;
        }
        let high = on == (self.active == ActiveLevel::High);
        // GPIO writes on this MCU are infallible.
        let _ = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        self.is_on = on;
    }

    pub fn toggle(&mut self) {
        self.set(!self.is_on);
    }

    /// Turn ON and stay ON for good.
    pub fn latch(&mut self) {
        self.set(true);
        self.latched = true;
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.is_on
    }
}
