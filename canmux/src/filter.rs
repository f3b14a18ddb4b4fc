//! Filter bank and receive FIFO allocation for one bus.
//!
//! Banks are handed out monotonically from the bus's reserved range and never reused: endpoints
//! live until reset. FIFOs alternate 0, 1, 0, 1 when both are enabled so the two message-pending
//! interrupts share the load.

use crate::config::BusConfig;
use crate::frame::Fifo;

#[derive(Clone, Debug)]
pub(crate) struct FilterAllocator {
    next_bank: u16,
    end: u16,
    fifo_cursor: Fifo,
    fifo0: bool,
    fifo1: bool,
}

impl FilterAllocator {
    pub(crate) fn new(config: &BusConfig) -> Self {
        Self {
            next_bank: u16::from(config.first_filter_bank),
            end: config.bank_end(),
            fifo_cursor: Fifo::Fifo0,
            fifo0: config.fifo0,
            fifo1: config.fifo1,
        }
    }

    /// Next unused bank, or `None` when the range is exhausted.
    pub(crate) fn allocate_bank(&mut self) -> Option<u8> {
        if self.next_bank >= self.end {
            return None;
        }
        let bank = self.next_bank as u8;
        self.next_bank += 1;
        Some(bank)
    }

    /// FIFO for the next endpoint.
    pub(crate) fn next_fifo(&mut self) -> Fifo {
        match (self.fifo0, self.fifo1) {
            (true, true) => {
                let fifo = self.fifo_cursor;
                self.fifo_cursor = fifo.other();
                fifo
            }
            (false, true) => Fifo::Fifo1,
            _ => Fifo::Fifo0,
        }
    }

    /// Banks not yet handed out.
    pub(crate) fn remaining(&self) -> u16 {
        self.end.saturating_sub(self.next_bank)
    }
}
