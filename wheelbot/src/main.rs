#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m::{delay::Delay, peripheral::NVIC};
use cortex_m_rt::entry;
use critical_section::Mutex;
use defmt_rtt as _;
use embedded_hal::digital::v2::OutputPin;
use panic_halt as _;

use hal::{
    can::Can,
    pac::{self, interrupt, Interrupt},
    prelude::*,
};
use stm32f7xx_hal as hal;

use canmux::config::BXCAN_SLAVE_START;
use canmux::{
    BusConfig, BusId, CanConfig, CanHub, ControllerKind, EndpointHandle, Fifo, FilterMode,
    TransmitError,
};
use wheelbot::hw::{
    can::{init_filter_block, FIFO_DEPTH},
    BxCanBus, Controller, HwError, Led,
};
use wheelbot_motors::{DjiModel, DjiMotor, MotorError};

type Hub = CanHub<'static, Controller, 8>;

/// 1 Mbit/s with APB1 at 16 MHz: prescaler 1, BS1 13 tq, BS2 2 tq, SJW 1 tq.
const CAN_BTR: u32 = 0x001C_0000;

const CONFIG: CanConfig = CanConfig::new(ControllerKind::BxCan, FilterMode::IdList)
    .with_bus(BusId::Can1, BusConfig::bxcan_master())
    .with_bus(BusId::Can2, BusConfig::bxcan_slave())
    .with_congestion_level(FIFO_DEPTH);

const LOOP_PERIOD_MS: u32 = 1;
const STATS_PERIOD: u32 = 1000;

/// Speed loop gain, raw current per rpm of error.
const WHEEL_KP: f32 = 8.0;
/// Yaw hold gain, raw voltage per encoder count of error.
const YAW_KP: f32 = 12.0;

static HUB: Mutex<RefCell<Option<Hub>>> = Mutex::new(RefCell::new(None));

static WHEELS: [DjiMotor; 4] = [
    DjiMotor::new(DjiModel::M3508, 1),
    DjiMotor::new(DjiModel::M3508, 2),
    DjiMotor::new(DjiModel::M3508, 3),
    DjiMotor::new(DjiModel::M3508, 4),
];
const WHEEL_LABELS: [&str; 4] = ["wheel-fl", "wheel-fr", "wheel-rl", "wheel-rr"];

static YAW: DjiMotor = DjiMotor::new(DjiModel::Gm6020Voltage, 1);

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();

    // Clocks
    let mut rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let mut delay = Delay::new(cp.SYST, clocks.sysclk().raw());

    // GPIO
    let gpioa = dp.GPIOA.split();
    let gpiob = dp.GPIOB.split();
    let gpiod = dp.GPIOD.split();

    // LED
    let mut heartbeat = Led::active_low(gpiod.pd10.into_push_pull_output());
    let mut fault = Led::active_low(gpiod.pd9.into_push_pull_output());

    // CAN1 (wheels): PA12 TX, PA11 RX
    let can1 = Can::new(
        dp.CAN1,
        &mut rcc.apb1,
        (
            gpioa.pa12.into_alternate::<9>(),
            gpioa.pa11.into_alternate::<9>(),
        ),
    );
    // CAN2 (gimbal): PB13 TX, PB12 RX
    let can2 = Can::new(
        dp.CAN2,
        &mut rcc.apb1,
        (
            gpiob.pb13.into_alternate::<9>(),
            gpiob.pb12.into_alternate::<9>(),
        ),
    );
    init_filter_block(BXCAN_SLAVE_START);

    let hardware = [
        Some(Controller::Can1(BxCanBus::new(can1, CAN_BTR))),
        Some(Controller::Can2(BxCanBus::new(can2, CAN_BTR))),
        None,
    ];
    let mut hub: Hub = match CanHub::new(CONFIG, hardware) {
        Ok(hub) => hub,
        Err(e) => {
            defmt::error!("invalid CAN configuration: {}", e);
            halt(&mut fault);
        }
    };

    // Motors
    let mut wheels: [Option<EndpointHandle>; 4] = [None; 4];
    for ((motor, label), slot) in WHEELS.iter().zip(WHEEL_LABELS).zip(wheels.iter_mut()) {
        *slot = attach(motor.register(&mut hub, 1, label), label, &mut fault);
    }
    let yaw = attach(YAW.register(&mut hub, 2, "yaw"), "yaw", &mut fault);

    critical_section::with(|cs| HUB.borrow(cs).replace(Some(hub)));
    unsafe {
        for irq in [
            Interrupt::CAN1_RX0,
            Interrupt::CAN1_RX1,
            Interrupt::CAN1_SCE,
            Interrupt::CAN2_RX0,
            Interrupt::CAN2_RX1,
            Interrupt::CAN2_SCE,
        ] {
            NVIC::unmask(irq);
        }
    }
    defmt::info!("wheelbot up");

    let mut yaw_target: Option<i64> = None;
    let mut tick: u32 = 0;

    loop {
        critical_section::with(|cs| {
            let mut hub = HUB.borrow_ref_mut(cs);
            let Some(hub) = hub.as_mut() else {
                return;
            };

            // Hold every wheel at standstill.
            for (motor, handle) in WHEELS.iter().zip(wheels) {
                if let Some(handle) = handle {
                    let error = -f32::from(motor.feedback().speed_rpm);
                    let _ = motor.write_command(hub, handle, WHEEL_KP * error);
                }
            }

            // Hold the yaw where it was at the first feedback frame.
            if let Some(handle) = yaw {
                let feedback = YAW.feedback();
                if feedback.frames > 0 {
                    let target = *yaw_target.get_or_insert(feedback.total_counts);
                    let error = target.wrapping_sub(feedback.total_counts) as f32;
                    let _ = YAW.write_command(hub, handle, YAW_KP * error);
                }
            }

            if let Some(handle) = wheels.iter().flatten().next() {
                send(hub, *handle);
            }
            if let Some(handle) = yaw {
                send(hub, handle);
            }

            if tick % STATS_PERIOD == 0 {
                for bus in [BusId::Can1, BusId::Can2] {
                    if let Some(stats) = hub.stats(bus) {
                        defmt::info!("{}: {}", bus, stats);
                    }
                }
            }
        });

        if tick % STATS_PERIOD == 0 {
            heartbeat.toggle();
        }
        tick = tick.wrapping_add(1);
        delay.delay_ms(LOOP_PERIOD_MS);
    }
}

/// Keep the handle of a registered motor. Fatal errors halt the board, anything else leaves the
/// motor out.
fn attach<P: OutputPin>(
    result: Result<EndpointHandle, MotorError<HwError>>,
    label: &str,
    fault: &mut Led<P>,
) -> Option<EndpointHandle> {
    match result {
        Ok(handle) => Some(handle),
        Err(MotorError::Registration(e)) if e.is_fatal() => {
            defmt::error!("{}: {}", label, e);
            halt(fault);
        }
        Err(MotorError::Registration(e)) => {
            defmt::warn!("{}: skipped, {}", label, e.reason());
            None
        }
        Err(MotorError::InvalidDeviceId(id)) => {
            defmt::warn!("{}: skipped, device id {} out of range", label, id);
            None
        }
    }
}

fn send(hub: &mut Hub, handle: EndpointHandle) {
    match hub.transmit(handle) {
        Ok(()) => {}
        // Counted in the bus stats.
        Err(TransmitError::Timeout) => {}
        Err(e) => defmt::warn!("transmit failed: {}", e),
    }
}

fn halt<P: OutputPin>(fault: &mut Led<P>) -> ! {
    fault.latch();
    panic!();
}

fn drain(bus: BusId, fifo: Fifo) {
    critical_section::with(|cs| {
        if let Some(hub) = HUB.borrow_ref_mut(cs).as_mut() {
            hub.drain(bus, fifo);
        }
    });
}

fn on_status_change(bus: BusId) {
    critical_section::with(|cs| {
        let mut hub = HUB.borrow_ref_mut(cs);
        let Some(hub) = hub.as_mut() else {
            return;
        };
        let bus_off = match hub.bus_mut(bus) {
            Some(can) => {
                let hw = can.hardware_mut();
                hw.acknowledge_errors();
                hw.is_bus_off()
            }
            None => false,
        };
        if bus_off {
            defmt::warn!("{}: bus-off", bus);
            hub.on_bus_off(bus);
        }
    });
}

#[interrupt]
fn CAN1_RX0() {
    drain(BusId::Can1, Fifo::Fifo0);
}

#[interrupt]
fn CAN1_RX1() {
    drain(BusId::Can1, Fifo::Fifo1);
}

#[interrupt]
fn CAN1_SCE() {
    on_status_change(BusId::Can1);
}

#[interrupt]
fn CAN2_RX0() {
    drain(BusId::Can2, Fifo::Fifo0);
}

#[interrupt]
fn CAN2_RX1() {
    drain(BusId::Can2, Fifo::Fifo1);
}

#[interrupt]
fn CAN2_SCE() {
    on_status_change(BusId::Can2);
}
