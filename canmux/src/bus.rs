//! One physical CAN controller and its endpoint registry.
//!
//! - `CanBus` owns the [`BusHardware`] of one controller, the endpoints registered on it, their
//!   transmit groups and the filter allocator.
//! - Start-up is lazy: the first successful precondition check in [`CanBus::register`] runs the
//!   one-time hardware init.
//! - Receive dispatch and the transmit path are in [`dispatch`](crate::dispatch) and
//!   [`transmit`](crate::transmit).
//!
//! Registration takes `&mut self`. In firmware the bus is reached from interrupts, so it sits in a
//! `critical_section::Mutex` and registering after start happens inside a critical section.

use heapless::Vec;

use crate::config::{BusConfig, CanConfig, ConfigError, FilterMode};
use crate::endpoint::{Endpoint, EndpointConfig, EndpointHandle, FrameHandler};
use crate::error::{InitStep, RegistrationError, StartError};
use crate::filter::FilterAllocator;
use crate::frame::{standard_id, BusId, Fifo, RxPayload};
use crate::group::TxGroup;
use crate::hardware::{BusHardware, FilterSpec};
use crate::retry::with_budget;

/// Running counters of one bus.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStats {
    /// Frames read out of either FIFO.
    pub rx_frames: u32,
    /// Frames that matched no endpoint.
    pub unmatched_frames: u32,
    /// Reads that found the FIFO at or above the congestion level.
    pub congestion_warnings: u32,
    /// Frames handed to the hardware.
    pub tx_frames: u32,
    /// Transmits abandoned after the retry budget.
    pub tx_timeouts: u32,
    pub bus_off_recoveries: u32,
}

/// A physical bus with room for `N` endpoints.
pub struct CanBus<'a, H: BusHardware, const N: usize> {
    id: BusId,
    pub(crate) hw: H,
    config: BusConfig,
    filter_mode: FilterMode,
    pub(crate) tx_retry_budget: u32,
    init_retry_budget: u32,
    pub(crate) congestion_level: u8,
    started: bool,
    filters: FilterAllocator,
    /// Accept-all bank of each FIFO in mask mode, reserved once in [`CanBus::new`].
    accept_all: [Option<u8>; 2],
    pub(crate) endpoints: Vec<Endpoint, N>,
    pub(crate) handlers: Vec<Option<&'a dyn FrameHandler>, N>,
    pub(crate) groups: Vec<TxGroup, N>,
    pub(crate) unmatched_reported: bool,
    pub(crate) stats: BusStats,
}

impl<'a, H: BusHardware, const N: usize> CanBus<'a, H, N> {
    /// Handles and group indices are stored as `u8`.
    const CAPACITY_FITS_HANDLE: () =
        assert!(N <= u8::MAX as usize + 1, "at most 256 endpoints per bus");

    /// Wrap the hardware of bus `id`. The hardware is not touched until the first registration.
    pub fn new(id: BusId, config: &CanConfig, hw: H) -> Result<Self, ConfigError> {
        let () = Self::CAPACITY_FITS_HANDLE;
        config.validate()?;
        let bus = *config.bus(id).ok_or(ConfigError::BusNotEnabled(id))?;

        let mut filters = FilterAllocator::new(&bus);
        let mut accept_all = [None; 2];
        if config.filter_mode == FilterMode::Mask {
            for fifo in [Fifo::Fifo0, Fifo::Fifo1] {
                if bus.uses(fifo) {
                    let bank = filters
                        .allocate_bank()
                        .ok_or(ConfigError::FilterBanksOutOfRange(id))?;
                    accept_all[fifo.index()] = Some(bank);
                }
            }
        }

        Ok(Self {
            id,
            hw,
            config: bus,
            filter_mode: config.filter_mode,
            tx_retry_budget: config.tx_retry_budget,
            init_retry_budget: config.init_retry_budget,
            congestion_level: config.congestion_level,
            started: false,
            filters,
            accept_all,
            endpoints: Vec::new(),
            handlers: Vec::new(),
            groups: Vec::new(),
            unmatched_reported: false,
            stats: BusStats::default(),
        })
    }

    #[inline]
    pub fn id(&self) -> BusId {
        self.id
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Run the one-time hardware init if it has not completed yet.
    ///
    /// In mask mode the accept-all bank reserved for each enabled FIFO is programmed; then the
    /// global reject policy is set, the controller started and the message-pending interrupts of
    /// the enabled FIFOs switched on. Every step is retried up to the init budget. A failed start
    /// leaves the bus stopped and the next call tries again from the top, on the same banks.
    pub fn ensure_started(&mut self) -> Result<(), StartError<H::Error>> {
        if self.started {
            return Ok(());
        }
        let budget = self.init_retry_budget;

        for fifo in [Fifo::Fifo0, Fifo::Fifo1] {
            if let Some(bank) = self.accept_all[fifo.index()] {
                with_budget(budget, || {
                    self.hw.configure_filter(bank, fifo, FilterSpec::AcceptAll)
                })
                .map_err(|e| self.init_failed(InitStep::Filter, e))?;
            }
        }

        with_budget(budget, || self.hw.configure_global_filter())
            .map_err(|e| self.init_failed(InitStep::GlobalFilter, e))?;

        with_budget(budget, || self.hw.start()).map_err(|e| self.init_failed(InitStep::Start, e))?;

        for fifo in [Fifo::Fifo0, Fifo::Fifo1] {
            if self.config.uses(fifo) {
                with_budget(budget, || self.hw.enable_fifo_interrupt(fifo))
                    .map_err(|e| self.init_failed(InitStep::Notification, e))?;
            }
        }

        self.started = true;
        info!("CAN{}: started", self.id.number());
        Ok(())
    }

    fn init_failed(&self, step: InitStep, error: H::Error) -> StartError<H::Error> {
        error!(
            "CAN{}: init step {} failed after {} attempts",
            self.id.number(),
            step,
            self.init_retry_budget
        );
        StartError { step, error }
    }

    /// Register an endpoint on this bus.
    ///
    /// Checks, in order: non-empty label, non-zero and 11-bit ids, free capacity, unique `rx_id`.
    /// Then starts the bus if needed, picks a FIFO, programs an exact-id filter in ID-list mode,
    /// and joins (or creates) the transmit group of `tx_id`.
    pub fn register(
        &mut self,
        config: EndpointConfig<'a>,
    ) -> Result<EndpointHandle, RegistrationError<H::Error>> {
        let result = self.try_register(&config);
        if let Err(e) = &result {
            error!(
                "CAN{}: cannot register {}: {}",
                self.id.number(),
                config.label,
                e.reason()
            );
        }
        result
    }

    fn try_register(
        &mut self,
        config: &EndpointConfig<'a>,
    ) -> Result<EndpointHandle, RegistrationError<H::Error>> {
        let (rx_id, tx_id) = config.ids()?;
        if self.endpoints.is_full() {
            return Err(RegistrationError::RegistryFull);
        }
        if self.endpoints.iter().any(|e| e.rx_id == rx_id) {
            return Err(RegistrationError::DuplicateRxId(config.rx_id));
        }

        self.ensure_started()?;

        let (fifo, filter_bank) = match self.filter_mode {
            FilterMode::Mask => (self.filters.next_fifo(), None),
            FilterMode::IdList => {
                let bank = self
                    .filters
                    .allocate_bank()
                    .ok_or(RegistrationError::FilterBanksExhausted)?;
                let fifo = self.filters.next_fifo();
                with_budget(self.init_retry_budget, || {
                    self.hw.configure_filter(bank, fifo, FilterSpec::Exact(rx_id))
                })
                .map_err(RegistrationError::FilterProgramming)?;
                (fifo, Some(bank))
            }
        };

        let group = match self.groups.iter().position(|g| g.tx_id == tx_id) {
            Some(index) => {
                let g = &mut self.groups[index];
                g.members = g.members.saturating_add(1);
                index
            }
            None => {
                self.groups
                    .push(TxGroup::new(tx_id))
                    .map_err(|_| RegistrationError::RegistryFull)?;
                self.groups.len() - 1
            }
        };

        let index = self.endpoints.len();
        self.endpoints
            .push(Endpoint {
                label: config.label,
                bus: self.id,
                rx_id,
                tx_id,
                fifo,
                filter_bank,
                group: group as u8,
                rx: RxPayload::default(),
                rx_count: 0,
            })
            .map_err(|_| RegistrationError::RegistryFull)?;
        self.handlers
            .push(config.handler)
            .map_err(|_| RegistrationError::RegistryFull)?;

        info!(
            "CAN{}: registered {} rx={=u16:#x} tx={=u16:#x} fifo={} bank={}",
            self.id.number(),
            config.label,
            config.rx_id,
            config.tx_id,
            fifo,
            filter_bank
        );
        if config.handler.is_none() {
            warn!("CAN{}: {} has no frame handler", self.id.number(), config.label);
        }

        Ok(EndpointHandle {
            bus: self.id,
            index: index as u8,
        })
    }

    /// Clear a bus-off condition. Recovery is a single register clear; there is no retry policy.
    pub fn on_bus_off(&mut self) {
        self.hw.clear_bus_off();
        self.stats.bus_off_recoveries = self.stats.bus_off_recoveries.wrapping_add(1);
        warn!("CAN{}: bus-off, rejoining", self.id.number());
    }

    /// Registry slot of `handle`, if it belongs to this bus.
    pub(crate) fn slot(&self, handle: EndpointHandle) -> Option<usize> {
        let index = handle.index();
        (handle.bus == self.id && index < self.endpoints.len()).then_some(index)
    }

    pub fn endpoint(&self, handle: EndpointHandle) -> Option<&Endpoint> {
        self.slot(handle).map(|i| &self.endpoints[i])
    }

    /// Registered endpoints, in registration order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Handle of the endpoint receiving `rx_id`.
    pub fn find(&self, rx_id: u16) -> Option<EndpointHandle> {
        let id = standard_id(rx_id)?;
        self.endpoints
            .iter()
            .position(|e| e.rx_id == id)
            .map(|index| EndpointHandle {
                bus: self.id,
                index: index as u8,
            })
    }

    /// Transmit groups, in creation order.
    pub fn groups(&self) -> &[TxGroup] {
        &self.groups
    }

    /// Filter banks still free for ID-list registrations.
    pub fn free_filter_banks(&self) -> u16 {
        self.filters.remaining()
    }

    #[inline]
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Access the underlying hardware.
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}
