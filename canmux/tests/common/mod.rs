#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use canmux::{
    BusConfig, BusHardware, BusId, CanConfig, ControllerKind, Endpoint, FilterMode, FilterSpec,
    Fifo, FrameHandler, RxFrame, StandardId,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    Busy,
    Refused,
}

/// Scripted controller that records every call made by the engine.
#[derive(Default)]
pub struct MockHardware {
    pub filters: Vec<(u8, Fifo, FilterSpec)>,
    pub filter_calls: u32,
    pub global_filter_calls: u32,
    pub start_calls: u32,
    pub interrupt_calls: u32,
    pub interrupts: Vec<Fifo>,
    /// Fail this many upcoming calls of each init step.
    pub fail_filter: u32,
    pub fail_global_filter: u32,
    pub fail_start: u32,
    pub fail_interrupt: u32,
    pub rx: [VecDeque<RxFrame>; 2],
    /// Reported fill level; the queue length when `None`.
    pub fill_level: Option<u8>,
    /// Report no free mailbox, forever.
    pub tx_full: bool,
    /// Report no free mailbox for this many polls, then one free.
    pub tx_busy_polls: u32,
    pub tx_refuse: bool,
    pub free_level_polls: u32,
    pub sent: Vec<(StandardId, [u8; 8])>,
    pub bus_off_clears: u32,
}

fn step(remaining_failures: &mut u32) -> Result<(), MockError> {
    if *remaining_failures > 0 {
        *remaining_failures -= 1;
        Err(MockError::Busy)
    } else {
        Ok(())
    }
}

impl MockHardware {
    pub fn push(&mut self, fifo: Fifo, frame: RxFrame) {
        self.rx[fifo.index()].push_back(frame);
    }
}

impl BusHardware for MockHardware {
    type Error = MockError;

    fn configure_filter(&mut self, bank: u8, fifo: Fifo, filter: FilterSpec) -> Result<(), MockError> {
        self.filter_calls += 1;
        step(&mut self.fail_filter)?;
        self.filters.push((bank, fifo, filter));
        Ok(())
    }

    fn configure_global_filter(&mut self) -> Result<(), MockError> {
        self.global_filter_calls += 1;
        step(&mut self.fail_global_filter)
    }

    fn start(&mut self) -> Result<(), MockError> {
        self.start_calls += 1;
        step(&mut self.fail_start)
    }

    fn enable_fifo_interrupt(&mut self, fifo: Fifo) -> Result<(), MockError> {
        self.interrupt_calls += 1;
        step(&mut self.fail_interrupt)?;
        self.interrupts.push(fifo);
        Ok(())
    }

    fn rx_fill_level(&mut self, fifo: Fifo) -> u8 {
        self.fill_level
            .unwrap_or(self.rx[fifo.index()].len() as u8)
    }

    fn read_frame(&mut self, fifo: Fifo) -> Option<RxFrame> {
        self.rx[fifo.index()].pop_front()
    }

    fn tx_free_level(&mut self) -> u8 {
        self.free_level_polls += 1;
        if self.tx_full {
            return 0;
        }
        if self.tx_busy_polls > 0 {
            self.tx_busy_polls -= 1;
            return 0;
        }
        3
    }

    fn add_tx_frame(&mut self, id: StandardId, data: &[u8; 8]) -> Result<(), MockError> {
        if self.tx_refuse {
            return Err(MockError::Refused);
        }
        self.sent.push((id, *data));
        Ok(())
    }

    fn clear_bus_off(&mut self) {
        self.bus_off_clears += 1;
    }
}

/// Records what a handler was given.
#[derive(Default)]
pub struct Recorder {
    pub hits: AtomicU32,
    pub payloads: Mutex<Vec<Vec<u8>>>,
    pub rx_counts: Mutex<Vec<u32>>,
}

impl Recorder {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.payloads.lock().unwrap().last().cloned()
    }
}

impl FrameHandler for Recorder {
    fn on_frame(&self, endpoint: &Endpoint) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .push(endpoint.payload().bytes().to_vec());
        self.rx_counts.lock().unwrap().push(endpoint.rx_count());
    }
}

pub fn id(raw: u16) -> StandardId {
    StandardId::new(raw).unwrap()
}

pub fn frame(raw: u16, payload: &[u8]) -> RxFrame {
    RxFrame::new(id(raw), payload).unwrap()
}

/// CAN1 + CAN2 bxCAN in ID-list mode, both FIFOs.
pub fn bxcan_list() -> CanConfig {
    CanConfig::new(ControllerKind::BxCan, FilterMode::IdList)
        .with_bus(BusId::Can1, BusConfig::bxcan_master())
        .with_bus(BusId::Can2, BusConfig::bxcan_slave())
}

/// A single FDCAN controller in mask mode.
pub fn fdcan_mask() -> CanConfig {
    CanConfig::new(ControllerKind::FdCan, FilterMode::Mask).with_bus(BusId::Can1, BusConfig::fdcan())
}

pub fn dual() -> [Option<MockHardware>; 3] {
    [Some(MockHardware::default()), Some(MockHardware::default()), None]
}

pub fn single() -> [Option<MockHardware>; 3] {
    [Some(MockHardware::default()), None, None]
}
