#![allow(dead_code)]

use std::collections::VecDeque;

use canmux::{
    BusConfig, BusHardware, BusId, CanConfig, ControllerKind, FilterMode, FilterSpec, Fifo,
    RxFrame, StandardId,
};

/// Controller that accepts everything: frames pushed into `rx` are read back, transmitted frames
/// land in `sent`.
#[derive(Default)]
pub struct Loopback {
    pub rx: VecDeque<RxFrame>,
    pub sent: Vec<(u16, [u8; 8])>,
}

impl BusHardware for Loopback {
    type Error = ();

    fn configure_filter(&mut self, _: u8, _: Fifo, _: FilterSpec) -> Result<(), ()> {
        Ok(())
    }

    fn configure_global_filter(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn enable_fifo_interrupt(&mut self, _: Fifo) -> Result<(), ()> {
        Ok(())
    }

    fn rx_fill_level(&mut self, _: Fifo) -> u8 {
        self.rx.len() as u8
    }

    fn read_frame(&mut self, _: Fifo) -> Option<RxFrame> {
        self.rx.pop_front()
    }

    fn tx_free_level(&mut self) -> u8 {
        3
    }

    fn add_tx_frame(&mut self, id: StandardId, data: &[u8; 8]) -> Result<(), ()> {
        self.sent.push((id.as_raw(), *data));
        Ok(())
    }

    fn clear_bus_off(&mut self) {}
}

pub fn config() -> CanConfig {
    CanConfig::new(ControllerKind::BxCan, FilterMode::IdList)
        .with_bus(BusId::Can1, BusConfig::bxcan_master())
        .with_bus(BusId::Can2, BusConfig::bxcan_slave())
}

pub fn buses() -> [Option<Loopback>; 3] {
    [Some(Loopback::default()), Some(Loopback::default()), None]
}

pub fn frame(id: u16, payload: &[u8]) -> RxFrame {
    RxFrame::new(StandardId::new(id).unwrap(), payload).unwrap()
}
