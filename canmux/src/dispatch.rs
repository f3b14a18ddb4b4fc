//! Receive dispatch, run from the FIFO message-pending interrupt.

use embedded_can::StandardId;

use crate::bus::CanBus;
use crate::endpoint::EndpointHandle;
use crate::frame::Fifo;
use crate::hardware::BusHardware;

/// Outcome of one [`CanBus::on_frame_pending`] call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The FIFO held no standard data frame.
    Empty,
    /// The frame was stored in this endpoint and its handler ran.
    Delivered(EndpointHandle),
    /// No endpoint receives this id; the frame was dropped.
    Unmatched(StandardId),
}

impl<'a, H: BusHardware, const N: usize> CanBus<'a, H, N> {
    /// Read one frame from `fifo` and deliver it.
    ///
    /// The matching endpoint's payload and receive counter are updated before its handler is
    /// called, so the handler sees the new bytes. Frames for the same id are delivered in FIFO
    /// order. An unmatched frame is counted and dropped; only the first one per bus is logged.
    pub fn on_frame_pending(&mut self, fifo: Fifo) -> Dispatch {
        let level = self.hw.rx_fill_level(fifo);
        if level >= self.congestion_level {
            self.stats.congestion_warnings = self.stats.congestion_warnings.wrapping_add(1);
            warn!(
                "CAN{}: {} congested ({} frames pending)",
                self.id().number(),
                fifo,
                level
            );
        }

        let Some(frame) = self.hw.read_frame(fifo) else {
            return Dispatch::Empty;
        };
        self.stats.rx_frames = self.stats.rx_frames.wrapping_add(1);

        let Some(index) = self.endpoints.iter().position(|e| e.rx_id == frame.id) else {
            self.stats.unmatched_frames = self.stats.unmatched_frames.wrapping_add(1);
            if !self.unmatched_reported {
                self.unmatched_reported = true;
                warn!(
                    "CAN{}: frame {=u16:#x} matches no endpoint",
                    self.id().number(),
                    frame.id.as_raw()
                );
            }
            return Dispatch::Unmatched(frame.id);
        };

        let endpoint = &mut self.endpoints[index];
        endpoint.rx.store(&frame);
        endpoint.rx_count = endpoint.rx_count.wrapping_add(1);

        if let Some(handler) = self.handlers[index] {
            handler.on_frame(&self.endpoints[index]);
        }

        Dispatch::Delivered(EndpointHandle {
            bus: self.id(),
            index: index as u8,
        })
    }

    /// Dispatch until `fifo` is empty. Returns the number of frames read.
    pub fn drain(&mut self, fifo: Fifo) -> usize {
        let mut frames = 0;
        while self.on_frame_pending(fifo) != Dispatch::Empty {
            frames += 1;
        }
        frames
    }
}
