//! Startup configuration.
//!
//! Which controllers exist, which receive FIFOs each one uses, how acceptance filtering is done and
//! how long the engine may busy-wait on the hardware. A [`CanConfig`] is built once at boot,
//! checked with [`CanConfig::validate`] and handed to [`CanHub::new`](crate::CanHub::new).

use crate::frame::{BusId, Fifo, MAX_BUSES};

/// Number of filter banks shared by CAN1 and CAN2 on bxCAN parts (STM32F4/F7).
pub const BXCAN_FILTER_BANKS: u8 = 28;

/// First bank owned by CAN2 with the usual even split.
pub const BXCAN_SLAVE_START: u8 = 14;

/// Standard-id filter elements per FDCAN controller.
pub const FDCAN_STD_FILTERS: u8 = 28;

/// Default transmit budget: free-level polls before giving up.
pub const DEFAULT_TX_RETRY_BUDGET: u32 = 100;

/// Default budget for each one-time hardware configuration call.
pub const DEFAULT_INIT_RETRY_BUDGET: u32 = 100_000;

/// Default RX FIFO fill level at which a congestion warning is emitted.
pub const DEFAULT_CONGESTION_LEVEL: u8 = 7;

/// Controller family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerKind {
    /// bxCAN: CAN1 owns a filter block shared with CAN2, no CAN3.
    BxCan,
    /// FDCAN: up to three controllers, each with its own filter elements.
    FdCan,
}

/// Acceptance filtering strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterMode {
    /// Accept everything into each enabled FIFO; the dispatch engine does the demultiplexing.
    Mask,
    /// One exact-id filter per endpoint, FIFOs assigned round-robin.
    IdList,
}

/// Per-controller settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub fifo0: bool,
    pub fifo1: bool,
    /// First filter bank (bxCAN) or standard filter element (FDCAN) this bus may use.
    pub first_filter_bank: u8,
    /// Number of banks reserved for this bus.
    pub filter_banks: u8,
}

impl BusConfig {
    /// bxCAN CAN1: banks 0..14, both FIFOs.
    pub const fn bxcan_master() -> Self {
        Self {
            fifo0: true,
            fifo1: true,
            first_filter_bank: 0,
            filter_banks: BXCAN_SLAVE_START,
        }
    }

    /// bxCAN CAN2: banks 14..28, both FIFOs.
    pub const fn bxcan_slave() -> Self {
        Self {
            fifo0: true,
            fifo1: true,
            first_filter_bank: BXCAN_SLAVE_START,
            filter_banks: BXCAN_FILTER_BANKS - BXCAN_SLAVE_START,
        }
    }

    /// FDCAN controller: all 28 standard filter elements, both FIFOs.
    pub const fn fdcan() -> Self {
        Self {
            fifo0: true,
            fifo1: true,
            first_filter_bank: 0,
            filter_banks: FDCAN_STD_FILTERS,
        }
    }

    /// Restrict the bus to a single receive FIFO.
    pub const fn only(mut self, fifo: Fifo) -> Self {
        self.fifo0 = matches!(fifo, Fifo::Fifo0);
        self.fifo1 = matches!(fifo, Fifo::Fifo1);
        self
    }

    #[inline]
    pub const fn uses(&self, fifo: Fifo) -> bool {
        match fifo {
            Fifo::Fifo0 => self.fifo0,
            Fifo::Fifo1 => self.fifo1,
        }
    }

    /// Number of enabled receive FIFOs.
    #[inline]
    pub const fn fifo_count(&self) -> u8 {
        self.fifo0 as u8 + self.fifo1 as u8
    }

    /// One past the last bank of this bus.
    #[inline]
    pub const fn bank_end(&self) -> u16 {
        self.first_filter_bank as u16 + self.filter_banks as u16
    }
}

/// Configuration problems found by [`CanConfig::validate`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No controller is enabled.
    NoBuses,
    /// The bus has neither FIFO enabled.
    NoFifo(BusId),
    /// The controller family has no such bus (bxCAN has no CAN3).
    UnsupportedBus(BusId),
    /// bxCAN CAN2 without CAN1; CAN1 owns the filter block.
    SlaveWithoutMaster,
    /// The bus reserves no filter banks, or more than the controller has.
    FilterBanksOutOfRange(BusId),
    /// Two bxCAN buses claim the same banks.
    FilterBanksOverlap(BusId, BusId),
    /// A retry budget of zero would fail every call.
    ZeroRetryBudget,
    /// A congestion level of zero would warn on an empty FIFO.
    ZeroCongestionLevel,
    /// Hardware was not supplied for an enabled bus.
    MissingHardware(BusId),
    /// The bus is not enabled in this configuration.
    BusNotEnabled(BusId),
}

/// Complete engine configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanConfig {
    pub controller: ControllerKind,
    pub filter_mode: FilterMode,
    pub buses: [Option<BusConfig>; MAX_BUSES],
    pub tx_retry_budget: u32,
    pub init_retry_budget: u32,
    pub congestion_level: u8,
}

impl CanConfig {
    /// A configuration with no buses and default budgets.
    pub const fn new(controller: ControllerKind, filter_mode: FilterMode) -> Self {
        Self {
            controller,
            filter_mode,
            buses: [None; MAX_BUSES],
            tx_retry_budget: DEFAULT_TX_RETRY_BUDGET,
            init_retry_budget: DEFAULT_INIT_RETRY_BUDGET,
            congestion_level: DEFAULT_CONGESTION_LEVEL,
        }
    }

    /// Enable `bus` with the given settings.
    pub const fn with_bus(mut self, bus: BusId, config: BusConfig) -> Self {
        self.buses[bus.index()] = Some(config);
        self
    }

    /// Set the number of free-level polls a transmit may spend waiting for a mailbox.
    pub const fn with_tx_retry_budget(mut self, budget: u32) -> Self {
        self.tx_retry_budget = budget;
        self
    }

    /// Set the number of attempts for each one-time hardware configuration call.
    pub const fn with_init_retry_budget(mut self, budget: u32) -> Self {
        self.init_retry_budget = budget;
        self
    }

    /// Set the RX FIFO fill level that triggers a congestion warning.
    pub const fn with_congestion_level(mut self, level: u8) -> Self {
        self.congestion_level = level;
        self
    }

    #[inline]
    pub fn bus(&self, bus: BusId) -> Option<&BusConfig> {
        self.buses[bus.index()].as_ref()
    }

    /// Check the configuration once, before any hardware is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buses.iter().all(Option::is_none) {
            return Err(ConfigError::NoBuses);
        }
        if self.tx_retry_budget == 0 || self.init_retry_budget == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        if self.congestion_level == 0 {
            return Err(ConfigError::ZeroCongestionLevel);
        }

        let bank_limit = match self.controller {
            ControllerKind::BxCan => BXCAN_FILTER_BANKS,
            ControllerKind::FdCan => FDCAN_STD_FILTERS,
        };

        for bus in BusId::ALL {
            let Some(config) = self.bus(bus) else {
                continue;
            };
            if !config.fifo0 && !config.fifo1 {
                return Err(ConfigError::NoFifo(bus));
            }
            if config.filter_banks == 0 || config.bank_end() > u16::from(bank_limit) {
                return Err(ConfigError::FilterBanksOutOfRange(bus));
            }
            // Mask mode programs one accept-all bank per enabled FIFO.
            if self.filter_mode == FilterMode::Mask && config.filter_banks < config.fifo_count() {
                return Err(ConfigError::FilterBanksOutOfRange(bus));
            }
        }

        if self.controller == ControllerKind::BxCan {
            if self.bus(BusId::Can3).is_some() {
                return Err(ConfigError::UnsupportedBus(BusId::Can3));
            }
            match (self.bus(BusId::Can1), self.bus(BusId::Can2)) {
                (None, Some(_)) => return Err(ConfigError::SlaveWithoutMaster),
                (Some(master), Some(slave)) => {
                    let disjoint = master.bank_end() <= u16::from(slave.first_filter_bank)
                        || slave.bank_end() <= u16::from(master.first_filter_bank);
                    if !disjoint {
                        return Err(ConfigError::FilterBanksOverlap(BusId::Can1, BusId::Can2));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual_bxcan() -> CanConfig {
        CanConfig::new(ControllerKind::BxCan, FilterMode::IdList)
            .with_bus(BusId::Can1, BusConfig::bxcan_master())
            .with_bus(BusId::Can2, BusConfig::bxcan_slave())
    }

    #[test]
    fn dual_bxcan_preset_is_valid() {
        assert_eq!(dual_bxcan().validate(), Ok(()));
    }

    #[test]
    fn empty_config_is_rejected() {
        let config = CanConfig::new(ControllerKind::FdCan, FilterMode::Mask);
        assert_eq!(config.validate(), Err(ConfigError::NoBuses));
    }

    #[test]
    fn bxcan_has_no_third_bus() {
        let config = dual_bxcan().with_bus(BusId::Can3, BusConfig::bxcan_slave());
        assert_eq!(config.validate(), Err(ConfigError::UnsupportedBus(BusId::Can3)));
    }

    #[test]
    fn bxcan_slave_needs_master() {
        let config = CanConfig::new(ControllerKind::BxCan, FilterMode::Mask)
            .with_bus(BusId::Can2, BusConfig::bxcan_slave());
        assert_eq!(config.validate(), Err(ConfigError::SlaveWithoutMaster));
    }

    #[test]
    fn overlapping_bank_ranges_are_rejected() {
        let mut slave = BusConfig::bxcan_slave();
        slave.first_filter_bank = 10;
        slave.filter_banks = 10;
        let config = dual_bxcan().with_bus(BusId::Can2, slave);
        assert_eq!(
            config.validate(),
            Err(ConfigError::FilterBanksOverlap(BusId::Can1, BusId::Can2))
        );
    }

    #[test]
    fn bank_range_must_fit_the_controller() {
        let mut slave = BusConfig::bxcan_slave();
        slave.filter_banks = 15;
        let config = dual_bxcan().with_bus(BusId::Can2, slave);
        assert_eq!(
            config.validate(),
            Err(ConfigError::FilterBanksOutOfRange(BusId::Can2))
        );
    }

    #[test]
    fn fdcan_allows_three_independent_buses() {
        let config = CanConfig::new(ControllerKind::FdCan, FilterMode::Mask)
            .with_bus(BusId::Can1, BusConfig::fdcan())
            .with_bus(BusId::Can2, BusConfig::fdcan())
            .with_bus(BusId::Can3, BusConfig::fdcan().only(Fifo::Fifo1));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn bus_without_fifo_is_rejected() {
        let mut bus = BusConfig::fdcan();
        bus.fifo0 = false;
        bus.fifo1 = false;
        let config =
            CanConfig::new(ControllerKind::FdCan, FilterMode::Mask).with_bus(BusId::Can2, bus);
        assert_eq!(config.validate(), Err(ConfigError::NoFifo(BusId::Can2)));
    }

    #[test]
    fn mask_mode_needs_a_bank_per_fifo() {
        let mut bus = BusConfig::fdcan();
        bus.filter_banks = 1;
        let mask = CanConfig::new(ControllerKind::FdCan, FilterMode::Mask).with_bus(BusId::Can1, bus);
        assert_eq!(
            mask.validate(),
            Err(ConfigError::FilterBanksOutOfRange(BusId::Can1))
        );

        let single = mask.with_bus(BusId::Can1, bus.only(Fifo::Fifo0));
        assert_eq!(single.validate(), Ok(()));
    }

    #[test]
    fn zero_budgets_are_rejected() {
        assert_eq!(
            dual_bxcan().with_tx_retry_budget(0).validate(),
            Err(ConfigError::ZeroRetryBudget)
        );
        assert_eq!(
            dual_bxcan().with_congestion_level(0).validate(),
            Err(ConfigError::ZeroCongestionLevel)
        );
    }
}
