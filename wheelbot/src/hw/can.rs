//! bxCAN binding for the `canmux` engine.
//!
//! - `BxCanBus` wraps a HAL `can::Can` instance in `bxcan::Can` and implements [`BusHardware`].
//! - Filter banks are shared by CAN1 and CAN2 and always programmed through CAN1's registers,
//!   see [`init_filter_block`].
//! - `Controller` puts both instances behind one type so a single hub can own them.

use core::convert::Infallible;

use bxcan::{Data, Frame};
use canmux::{BusHardware, Fifo, FilterSpec, RxFrame, StandardId, FRAME_LEN};
use stm32f7xx_hal::can as hal_can;
use stm32f7xx_hal::pac::{self, can1::RegisterBlock};

/// Frames a bxCAN receive FIFO can hold.
pub const FIFO_DEPTH: u8 = 3;

/// Filter banks shared by both controllers.
pub const FILTER_BANKS: u8 = 28;

const TSR_TME_SHIFT: u32 = 26;
const RFR_FMP_MASK: u32 = 0b11;
const IER_FMPIE0: u32 = 1 << 1;
const IER_FMPIE1: u32 = 1 << 4;
const IER_BOFIE: u32 = 1 << 10;
const IER_ERRIE: u32 = 1 << 15;
const MCR_INRQ: u32 = 1 << 0;
const ESR_BOFF: u32 = 1 << 2;
const MSR_ERRI: u32 = 1 << 2;

/// Hardware errors reported to the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, defmt::Format)]
pub enum HwError {
    /// The controller has not synchronized to the bus yet.
    NotSynchronized,
    /// All transmit mailboxes are pending.
    MailboxFull,
    /// Filter bank outside the shared block.
    InvalidBank(u8),
    /// Identifier or payload bxcan refused to put in a frame.
    InvalidFrame,
}

/// Register block of a CAN instance.
pub trait Registers {
    fn regs() -> &'static RegisterBlock;
}

impl Registers for pac::CAN1 {
    #[inline]
    fn regs() -> &'static RegisterBlock {
        unsafe { &*pac::CAN1::ptr() }
    }
}

impl Registers for pac::CAN2 {
    #[inline]
    fn regs() -> &'static RegisterBlock {
        unsafe { &*pac::CAN2::ptr() }
    }
}

/// Reset every filter bank and give banks `split..28` to CAN2.
///
/// Must run once, after both controllers are clocked and before any bus starts.
pub fn init_filter_block(split: u8) {
    let regs = pac::CAN1::regs();

    regs.fmr.modify(|_, w| w.finit().set_bit());
    regs.fmr.modify(|_, w| unsafe { w.can2sb().bits(split) });

    regs.fa1r.reset();
    regs.fm1r.reset();
    regs.fs1r.reset();
    regs.ffa1r.reset();

    regs.fmr.modify(|_, w| w.finit().clear_bit());
}

/// Program one bank of the shared block and activate it.
///
/// `Exact` uses 16-bit list mode with all four entries set to the id (RTR and IDE clear, so only
/// standard data frames match). `AcceptAll` uses a 32-bit mask of zero.
fn configure_bank(bank: u8, fifo: Fifo, filter: FilterSpec) -> Result<(), HwError> {
    if bank >= FILTER_BANKS {
        return Err(HwError::InvalidBank(bank));
    }
    let regs = pac::CAN1::regs();
    let bit = 1u32 << bank;

    let (list, wide, value) = match filter {
        FilterSpec::AcceptAll => (false, true, 0),
        FilterSpec::Exact(id) => {
            let entry = u32::from(id.as_raw()) << 5;
            (true, false, entry | (entry << 16))
        }
    };
    let assign = |bits: u32, set: bool| if set { bits | bit } else { bits & !bit };

    regs.fmr.modify(|_, w| w.finit().set_bit());
    regs.fa1r.modify(|r, w| unsafe { w.bits(r.bits() & !bit) });

    regs.fm1r.modify(|r, w| unsafe { w.bits(assign(r.bits(), list)) });
    regs.fs1r.modify(|r, w| unsafe { w.bits(assign(r.bits(), wide)) });
    regs.ffa1r
        .modify(|r, w| unsafe { w.bits(assign(r.bits(), fifo == Fifo::Fifo1)) });

    let fb = &regs.fb[usize::from(bank)];
    fb.fr1.write(|w| unsafe { w.bits(value) });
    fb.fr2.write(|w| unsafe { w.bits(value) });

    regs.fa1r.modify(|r, w| unsafe { w.bits(r.bits() | bit) });
    regs.fmr.modify(|_, w| w.finit().clear_bit());
    Ok(())
}

/// Standard data frame out of a bxcan frame. Remote and extended frames yield `None`.
fn to_rx_frame(frame: &Frame) -> Option<RxFrame> {
    let bxcan::Id::Standard(id) = frame.id() else {
        return None;
    };
    let data = frame.data()?;
    RxFrame::new(StandardId::new(id.as_raw())?, data)
}

/// One bxCAN controller.
pub struct BxCanBus<I>
where
    hal_can::Can<I>: bxcan::Instance,
{
    can: bxcan::Can<hal_can::Can<I>>,
    overruns: u32,
}

impl<I: Registers> BxCanBus<I>
where
    hal_can::Can<I>: bxcan::Instance,
{
    /// Wrap a HAL CAN peripheral, left in initialization mode until the engine starts it.
    ///
    /// * `btr` – value for the CAN_BTR register (bit timing).
    pub fn new(hal_can: hal_can::Can<I>, btr: u32) -> Self {
        let can = bxcan::Can::builder(hal_can)
            .set_bit_timing(btr)
            .leave_disabled();

        Self { can, overruns: 0 }
    }

    /// Consume the wrapper and get back the underlying HAL CAN instance.
    pub fn free(self) -> hal_can::Can<I> {
        self.can.free()
    }

    pub fn is_bus_off(&self) -> bool {
        I::regs().esr.read().bits() & ESR_BOFF != 0
    }

    /// Clear the error interrupt flag.
    pub fn acknowledge_errors(&mut self) {
        I::regs().msr.write(|w| unsafe { w.bits(MSR_ERRI) });
    }

    /// Frames lost to FIFO overruns.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    fn enable_interrupts(&mut self, bits: u32) {
        I::regs().ier.modify(|r, w| unsafe { w.bits(r.bits() | bits) });
    }
}

impl<I: Registers> BusHardware for BxCanBus<I>
where
    hal_can::Can<I>: bxcan::Instance,
{
    type Error = HwError;

    fn configure_filter(&mut self, bank: u8, fifo: Fifo, filter: FilterSpec) -> Result<(), HwError> {
        configure_bank(bank, fifo, filter)
    }

    /// bxCAN has no global filter: list entries only match standard data frames, and in mask mode
    /// `read_frame` drops everything else.
    fn configure_global_filter(&mut self) -> Result<(), HwError> {
        Ok(())
    }

    /// Also enables the bus-off interrupt.
    fn start(&mut self) -> Result<(), HwError> {
        match self.can.enable_non_blocking() {
            Ok(()) => {
                self.enable_interrupts(IER_ERRIE | IER_BOFIE);
                Ok(())
            }
            Err(nb::Error::WouldBlock) => Err(HwError::NotSynchronized),
            Err(nb::Error::Other(never)) => match never {},
        }
    }

    fn enable_fifo_interrupt(&mut self, fifo: Fifo) -> Result<(), HwError> {
        self.enable_interrupts(match fifo {
            Fifo::Fifo0 => IER_FMPIE0,
            Fifo::Fifo1 => IER_FMPIE1,
        });
        Ok(())
    }

    fn rx_fill_level(&mut self, fifo: Fifo) -> u8 {
        let regs = I::regs();
        let rfr = match fifo {
            Fifo::Fifo0 => regs.rfr[0].read().bits(),
            Fifo::Fifo1 => regs.rfr[1].read().bits(),
        };
        (rfr & RFR_FMP_MASK) as u8
    }

    fn read_frame(&mut self, fifo: Fifo) -> Option<RxFrame> {
        loop {
            let received = match fifo {
                Fifo::Fifo0 => self.can.rx0().receive(),
                Fifo::Fifo1 => self.can.rx1().receive(),
            };
            match received {
                Ok(frame) => {
                    if let Some(frame) = to_rx_frame(&frame) {
                        return Some(frame);
                    }
                }
                Err(nb::Error::WouldBlock) => return None,
                Err(nb::Error::Other(_overrun)) => {
                    self.overruns = self.overruns.wrapping_add(1);
                }
            }
        }
    }

    fn tx_free_level(&mut self) -> u8 {
        ((I::regs().tsr.read().bits() >> TSR_TME_SHIFT) & 0b111).count_ones() as u8
    }

    fn add_tx_frame(&mut self, id: StandardId, data: &[u8; FRAME_LEN]) -> Result<(), HwError> {
        let id = bxcan::StandardId::new(id.as_raw()).ok_or(HwError::InvalidFrame)?;
        let data = Data::new(data).ok_or(HwError::InvalidFrame)?;
        let frame = Frame::new_data(id, data);

        match self.can.transmit(&frame) {
            Ok(_status) => Ok(()),
            Err(nb::Error::WouldBlock) => Err(HwError::MailboxFull),
            Err(nb::Error::Other(never)) => {
                let never: Infallible = never;
                match never {}
            }
        }
    }

    fn clear_bus_off(&mut self) {
        let mcr = &I::regs().mcr;
        mcr.modify(|r, w| unsafe { w.bits(r.bits() | MCR_INRQ) });
        mcr.modify(|r, w| unsafe { w.bits(r.bits() & !MCR_INRQ) });
    }
}

/// Both controllers of the board behind one hardware type.
pub enum Controller {
    Can1(BxCanBus<pac::CAN1>),
    Can2(BxCanBus<pac::CAN2>),
}

macro_rules! on_bus {
    ($self:expr, $bus:ident => $body:expr) => {
        match $self {
            Controller::Can1($bus) => $body,
            Controller::Can2($bus) => $body,
        }
    };
}

impl Controller {
    pub fn is_bus_off(&self) -> bool {
        on_bus!(self, bus => bus.is_bus_off())
    }

    pub fn acknowledge_errors(&mut self) {
        on_bus!(self, bus => bus.acknowledge_errors())
    }

    pub fn overruns(&self) -> u32 {
        on_bus!(self, bus => bus.overruns())
    }
}

impl BusHardware for Controller {
    type Error = HwError;

    fn configure_filter(&mut self, bank: u8, fifo: Fifo, filter: FilterSpec) -> Result<(), HwError> {
        on_bus!(self, bus => bus.configure_filter(bank, fifo, filter))
    }

    fn configure_global_filter(&mut self) -> Result<(), HwError> {
        on_bus!(self, bus => bus.configure_global_filter())
    }

    fn start(&mut self) -> Result<(), HwError> {
        on_bus!(self, bus => bus.start())
    }

    fn enable_fifo_interrupt(&mut self, fifo: Fifo) -> Result<(), HwError> {
        on_bus!(self, bus => bus.enable_fifo_interrupt(fifo))
    }

    fn rx_fill_level(&mut self, fifo: Fifo) -> u8 {
        on_bus!(self, bus => bus.rx_fill_level(fifo))
    }

    fn read_frame(&mut self, fifo: Fifo) -> Option<RxFrame> {
        on_bus!(self, bus => bus.read_frame(fifo))
    }

    fn tx_free_level(&mut self) -> u8 {
        on_bus!(self, bus => bus.tx_free_level())
    }

    fn add_tx_frame(&mut self, id: StandardId, data: &[u8; FRAME_LEN]) -> Result<(), HwError> {
        on_bus!(self, bus => bus.add_tx_frame(id, data))
    }

    fn clear_bus_off(&mut self) {
        on_bus!(self, bus => bus.clear_bus_off())
    }
}
