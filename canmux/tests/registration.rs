mod common;

use canmux::{
    BusConfig, BusId, CanBus, CanConfig, CanHub, ConfigError, ControllerKind, EndpointConfig, Fifo,
    FilterMode, FilterSpec, InitStep, RegistrationError,
};
use common::{bxcan_list, dual, fdcan_mask, id, single, MockError, MockHardware};

type Hub = CanHub<'static, MockHardware, 8>;

fn hub() -> Hub {
    CanHub::new(bxcan_list(), dual()).unwrap()
}

#[test]
fn duplicate_rx_id_fails_in_either_order() {
    let mut hub = hub();
    hub.register(1, EndpointConfig::new("a", 0x201, 0x200)).unwrap();
    assert_eq!(
        hub.register(1, EndpointConfig::new("b", 0x201, 0x1FF)),
        Err(RegistrationError::DuplicateRxId(0x201))
    );

    let mut hub = self::hub();
    hub.register(1, EndpointConfig::new("b", 0x201, 0x1FF)).unwrap();
    assert_eq!(
        hub.register(1, EndpointConfig::new("a", 0x201, 0x200)),
        Err(RegistrationError::DuplicateRxId(0x201))
    );
}

#[test]
fn same_rx_id_on_different_buses_is_allowed() {
    let mut hub = hub();
    hub.register(1, EndpointConfig::new("left", 0x201, 0x200)).unwrap();
    hub.register(2, EndpointConfig::new("right", 0x201, 0x200)).unwrap();
}

#[test]
fn registry_rejects_from_capacity_plus_one() {
    let mut hub: CanHub<'static, MockHardware, 4> = CanHub::new(bxcan_list(), dual()).unwrap();
    for n in 1..=4u16 {
        hub.register(1, EndpointConfig::new("m", 0x200 + n, 0x200)).unwrap();
    }
    for n in 5..=7u16 {
        assert_eq!(
            hub.register(1, EndpointConfig::new("m", 0x200 + n, 0x1FF)),
            Err(RegistrationError::RegistryFull)
        );
    }
    assert_eq!(hub.bus(BusId::Can1).unwrap().endpoints().len(), 4);
}

#[test]
fn preconditions_are_distinct_errors() {
    let mut hub = hub();
    assert_eq!(
        hub.register(1, EndpointConfig::new("", 0x201, 0x200)),
        Err(RegistrationError::EmptyLabel)
    );
    assert_eq!(
        hub.register(1, EndpointConfig::new("m", 0, 0x200)),
        Err(RegistrationError::ZeroRxId)
    );
    assert_eq!(
        hub.register(1, EndpointConfig::new("m", 0x201, 0)),
        Err(RegistrationError::ZeroTxId)
    );
    assert_eq!(
        hub.register(1, EndpointConfig::new("m", 0x800, 0x200)),
        Err(RegistrationError::InvalidId(0x800))
    );
    assert_eq!(
        hub.register(0, EndpointConfig::new("m", 0x201, 0x200)),
        Err(RegistrationError::InvalidBus(0))
    );
    assert_eq!(
        hub.register(4, EndpointConfig::new("m", 0x201, 0x200)),
        Err(RegistrationError::InvalidBus(4))
    );
    assert_eq!(
        hub.register(3, EndpointConfig::new("m", 0x201, 0x200)),
        Err(RegistrationError::BusNotEnabled(BusId::Can3))
    );

    // Rejected requests never touch the hardware.
    let can1 = hub.bus(BusId::Can1).unwrap();
    assert!(!can1.is_started());
    assert_eq!(can1.hardware().start_calls, 0);
}

#[test]
fn fifos_alternate_across_registrations() {
    let mut hub = hub();
    let fifos: Vec<Fifo> = (1..=6u16)
        .map(|n| {
            let handle = hub
                .register(1, EndpointConfig::new("m", 0x200 + n, 0x200))
                .unwrap();
            hub.endpoint(handle).unwrap().fifo()
        })
        .collect();

    assert_eq!(
        fifos,
        [Fifo::Fifo0, Fifo::Fifo1, Fifo::Fifo0, Fifo::Fifo1, Fifo::Fifo0, Fifo::Fifo1]
    );
}

#[test]
fn list_mode_programs_one_exact_filter_per_endpoint() {
    let mut hub = hub();
    hub.register(1, EndpointConfig::new("a", 0x201, 0x200)).unwrap();
    hub.register(1, EndpointConfig::new("b", 0x202, 0x200)).unwrap();
    hub.register(2, EndpointConfig::new("yaw", 0x205, 0x1FF)).unwrap();

    assert_eq!(
        hub.bus(BusId::Can1).unwrap().hardware().filters,
        [
            (0, Fifo::Fifo0, FilterSpec::Exact(id(0x201))),
            (1, Fifo::Fifo1, FilterSpec::Exact(id(0x202))),
        ]
    );
    // CAN2 allocates from its own half of the shared bank block.
    assert_eq!(
        hub.bus(BusId::Can2).unwrap().hardware().filters,
        [(14, Fifo::Fifo0, FilterSpec::Exact(id(0x205)))]
    );
}

#[test]
fn filter_banks_run_out() {
    let mut master = BusConfig::bxcan_master();
    master.filter_banks = 2;
    let config = bxcan_list().with_bus(BusId::Can1, master);
    let mut hub: Hub = CanHub::new(config, dual()).unwrap();

    hub.register(1, EndpointConfig::new("a", 0x201, 0x200)).unwrap();
    hub.register(1, EndpointConfig::new("b", 0x202, 0x200)).unwrap();
    assert_eq!(
        hub.register(1, EndpointConfig::new("c", 0x203, 0x200)),
        Err(RegistrationError::FilterBanksExhausted)
    );
    assert_eq!(hub.bus(BusId::Can1).unwrap().free_filter_banks(), 0);
}

#[test]
fn bus_starts_once_on_first_registration() {
    let mut hub = hub();
    for n in 1..=5u16 {
        hub.register(1, EndpointConfig::new("m", 0x200 + n, 0x200)).unwrap();
    }

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert!(can1.is_started());
    assert_eq!(can1.hardware().start_calls, 1);
    assert_eq!(can1.hardware().global_filter_calls, 1);
    assert_eq!(can1.hardware().interrupts, [Fifo::Fifo0, Fifo::Fifo1]);

    let can2 = hub.bus(BusId::Can2).unwrap();
    assert!(!can2.is_started());
    assert_eq!(can2.hardware().start_calls, 0);
}

#[test]
fn mask_mode_programs_accept_all_banks_at_start() {
    let mut hub: Hub = CanHub::new(fdcan_mask(), single()).unwrap();
    let a = hub.register(1, EndpointConfig::new("a", 0x141, 0x280)).unwrap();
    hub.register(1, EndpointConfig::new("b", 0x142, 0x280)).unwrap();

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert_eq!(
        can1.hardware().filters,
        [
            (0, Fifo::Fifo0, FilterSpec::AcceptAll),
            (1, Fifo::Fifo1, FilterSpec::AcceptAll),
        ]
    );
    assert_eq!(hub.endpoint(a).unwrap().filter_bank(), None);
}

#[test]
fn start_failure_is_bounded_and_fatal() {
    let config = bxcan_list().with_init_retry_budget(10);
    let mut hub: Hub = CanHub::new(config, dual()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_start = u32::MAX;

    let err = hub
        .register(1, EndpointConfig::new("m", 0x201, 0x200))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        RegistrationError::Start(e) if e.step == InitStep::Start && e.error == MockError::Busy
    ));

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert_eq!(can1.hardware().start_calls, 10);
    assert!(!can1.is_started());
    assert!(can1.endpoints().is_empty());
}

#[test]
fn transient_init_failures_are_retried() {
    let mut hub = hub();
    {
        let hw = hub.bus_mut(BusId::Can1).unwrap().hardware_mut();
        hw.fail_start = 3;
        hw.fail_interrupt = 2;
        hw.fail_filter = 1;
    }

    hub.register(1, EndpointConfig::new("m", 0x201, 0x200)).unwrap();

    let hw = hub.bus(BusId::Can1).unwrap().hardware();
    assert_eq!(hw.start_calls, 4);
    assert_eq!(hw.filter_calls, 2);
    assert_eq!(hw.interrupts, [Fifo::Fifo0, Fifo::Fifo1]);
}

#[test]
fn filter_programming_failure_is_fatal() {
    let config = bxcan_list().with_init_retry_budget(5);
    let mut hub: Hub = CanHub::new(config, dual()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_filter = u32::MAX;

    let err = hub
        .register(1, EndpointConfig::new("m", 0x201, 0x200))
        .unwrap_err();
    assert_eq!(err, RegistrationError::FilterProgramming(MockError::Busy));
    assert!(err.is_fatal());
    assert_eq!(hub.bus(BusId::Can1).unwrap().hardware().filter_calls, 5);
}

#[test]
fn endpoints_sharing_tx_id_share_a_group() {
    let mut hub = hub();
    let a = hub.register(1, EndpointConfig::new("a", 0x201, 0x200)).unwrap();
    let b = hub.register(1, EndpointConfig::new("b", 0x202, 0x200)).unwrap();
    let c = hub.register(1, EndpointConfig::new("c", 0x205, 0x1FF)).unwrap();

    let ea = hub.endpoint(a).unwrap();
    let eb = hub.endpoint(b).unwrap();
    let ec = hub.endpoint(c).unwrap();
    assert_eq!(ea.group(), eb.group());
    assert_ne!(ea.group(), ec.group());

    let groups = hub.bus(BusId::Can1).unwrap().groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[ea.group()].members(), 2);
    assert_eq!(groups[ec.group()].tx_id(), id(0x1FF));
}

#[test]
fn hub_requires_hardware_for_enabled_buses() {
    let result: Result<Hub, _> = CanHub::new(bxcan_list(), single());
    assert!(matches!(
        result,
        Err(ConfigError::MissingHardware(BusId::Can2))
    ));
}

#[test]
fn find_locates_endpoint_by_rx_id() {
    let mut hub = hub();
    hub.register(1, EndpointConfig::new("a", 0x201, 0x200)).unwrap();
    let b = hub.register(1, EndpointConfig::new("b", 0x202, 0x200)).unwrap();

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert_eq!(can1.find(0x202), Some(b));
    assert_eq!(can1.find(0x203), None);
    assert_eq!(hub.endpoint(b).unwrap().label(), "b");
}

#[test]
fn label_and_ids_are_checked_before_the_bus_selector() {
    let mut hub = hub();
    assert_eq!(
        hub.register(0, EndpointConfig::new("", 0, 0)),
        Err(RegistrationError::EmptyLabel)
    );
    assert_eq!(
        hub.register(9, EndpointConfig::new("m", 0, 0x200)),
        Err(RegistrationError::ZeroRxId)
    );
    assert_eq!(
        hub.register(3, EndpointConfig::new("m", 0x201, 0)),
        Err(RegistrationError::ZeroTxId)
    );
    assert_eq!(
        hub.register(0, EndpointConfig::new("m", 0x201, 0x800)),
        Err(RegistrationError::InvalidId(0x800))
    );
}

#[test]
fn global_filter_failure_is_bounded() {
    let config = bxcan_list().with_init_retry_budget(7);
    let mut hub: Hub = CanHub::new(config, dual()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_global_filter = u32::MAX;

    let err = hub
        .register(1, EndpointConfig::new("m", 0x201, 0x200))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        RegistrationError::Start(e) if e.step == InitStep::GlobalFilter
    ));

    let hw = hub.bus(BusId::Can1).unwrap().hardware();
    assert_eq!(hw.global_filter_calls, 7);
    assert_eq!(hw.start_calls, 0);
}

#[test]
fn notification_failure_is_bounded() {
    let config = bxcan_list().with_init_retry_budget(4);
    let mut hub: Hub = CanHub::new(config, dual()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_interrupt = u32::MAX;

    let err = hub
        .register(1, EndpointConfig::new("m", 0x201, 0x200))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        RegistrationError::Start(e) if e.step == InitStep::Notification
    ));

    let can1 = hub.bus(BusId::Can1).unwrap();
    // Gave up on FIFO0, never reached FIFO1.
    assert_eq!(can1.hardware().interrupt_calls, 4);
    assert!(can1.hardware().interrupts.is_empty());
    assert_eq!(can1.hardware().start_calls, 1);
    assert!(!can1.is_started());
}

#[test]
fn restart_after_failure_reuses_the_accept_all_banks() {
    let config = fdcan_mask().with_init_retry_budget(2);
    let mut hub: Hub = CanHub::new(config, single()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_global_filter = 2;

    let err = hub
        .register(1, EndpointConfig::new("a", 0x141, 0x280))
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Start(e) if e.step == InitStep::GlobalFilter
    ));
    hub.register(1, EndpointConfig::new("a", 0x141, 0x280)).unwrap();

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert!(can1.is_started());
    assert_eq!(
        can1.hardware().filters,
        [
            (0, Fifo::Fifo0, FilterSpec::AcceptAll),
            (1, Fifo::Fifo1, FilterSpec::AcceptAll),
            (0, Fifo::Fifo0, FilterSpec::AcceptAll),
            (1, Fifo::Fifo1, FilterSpec::AcceptAll),
        ]
    );
    assert_eq!(can1.free_filter_banks(), 26);
}

#[test]
fn restart_programs_every_fifo_when_the_range_is_tight() {
    let bus = BusConfig {
        filter_banks: 2,
        ..BusConfig::fdcan()
    };
    let config = CanConfig::new(ControllerKind::FdCan, FilterMode::Mask)
        .with_bus(BusId::Can1, bus)
        .with_init_retry_budget(1);
    let mut hub: Hub = CanHub::new(config, single()).unwrap();
    hub.bus_mut(BusId::Can1).unwrap().hardware_mut().fail_filter = 2;

    for _ in 0..2 {
        let err = hub
            .register(1, EndpointConfig::new("a", 0x141, 0x280))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Start(e) if e.step == InitStep::Filter
        ));
    }
    hub.register(1, EndpointConfig::new("a", 0x141, 0x280)).unwrap();

    let can1 = hub.bus(BusId::Can1).unwrap();
    assert_eq!(
        can1.hardware().filters,
        [
            (0, Fifo::Fifo0, FilterSpec::AcceptAll),
            (1, Fifo::Fifo1, FilterSpec::AcceptAll),
        ]
    );
    assert_eq!(can1.hardware().interrupts, [Fifo::Fifo0, Fifo::Fifo1]);
    assert_eq!(can1.free_filter_banks(), 0);
}

#[test]
fn full_u8_handle_range_is_addressable() {
    let mut bus: CanBus<'static, MockHardware, 256> =
        CanBus::new(BusId::Can1, &fdcan_mask(), MockHardware::default()).unwrap();
    for i in 0..256u16 {
        bus.register(EndpointConfig::new("m", 0x100 + i, 0x700)).unwrap();
    }
    assert_eq!(
        bus.register(EndpointConfig::new("m", 0x600, 0x700)),
        Err(RegistrationError::RegistryFull)
    );

    let last = bus.find(0x1FF).unwrap();
    assert_eq!(last.index(), 255);
    assert_eq!(bus.endpoint(last).unwrap().rx_id(), id(0x1FF));
    assert_eq!(bus.groups()[0].members(), 256);
}
