use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use super::*;
use crate::collaborators::{
    ChargeStatus, ConnectionState, InputPath, InputPresence, Measurements, TemperatureStatus,
};
use crate::config::PdMode;
use crate::events::{SourceRequest, SourceRequestChannel};
use crate::indicator::{BlinkRate, BreathSpeed, Color};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    SelectInput(InputPath),
    InputLimit(u16),
    Charging(bool),
    AutoDetection(bool),
    EnableSource(u16),
    DisableSource,
    SourceLimit(u16),
    ChargeVoltage(u16),
    ChargeCurrent(u16),
    Thermistor(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BusError;

/// Simulated hardware around the state machine.
#[derive(Debug, Default)]
struct Bench {
    presence: InputPresence,
    fault: u16,
    temperature: TemperatureStatus,
    charge_status: ChargeStatus,
    measurements: Measurements,
    connection: ConnectionState,
    contract: bool,
    advertised_ma: u16,
    rig_on: bool,
    now: Ticks,
    bus_down: bool,

    commands: Vec<Command>,
    charging: bool,
    sourcing: Option<u16>,
    led: Vec<LedCommand>,
    led_power_downs: usize,
    led_wakes: usize,
}

impl Bench {
    fn record(&mut self, command: Command) -> Result<(), BusError> {
        if self.bus_down {
            return Err(BusError);
        }
        match command {
            Command::Charging(enable) => self.charging = enable,
            Command::EnableSource(mv) => self.sourcing = Some(mv),
            Command::DisableSource => self.sourcing = None,
            _ => {}
        }
        self.commands.push(command);
        Ok(())
    }

    fn read<V>(&self, value: V) -> Result<V, BusError> {
        if self.bus_down {
            Err(BusError)
        } else {
            Ok(value)
        }
    }

    fn count(&self, command: Command) -> usize {
        self.commands.iter().filter(|c| **c == command).count()
    }
}

#[derive(Clone)]
struct Handle(Rc<RefCell<Bench>>);

impl ChargerDriver for Handle {
    type Error = BusError;

    fn input_presence(&mut self) -> Result<InputPresence, BusError> {
        let bench = self.0.borrow();
        bench.read(bench.presence)
    }

    fn fault_status(&mut self) -> Result<u16, BusError> {
        let bench = self.0.borrow();
        bench.read(bench.fault)
    }

    fn temperature_status(&mut self) -> Result<TemperatureStatus, BusError> {
        let bench = self.0.borrow();
        bench.read(bench.temperature)
    }

    fn charge_status(&mut self) -> Result<ChargeStatus, BusError> {
        let bench = self.0.borrow();
        bench.read(bench.charge_status)
    }

    fn measure(&mut self) -> Result<Measurements, BusError> {
        let bench = self.0.borrow();
        bench.read(bench.measurements)
    }

    fn select_input(&mut self, path: InputPath) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::SelectInput(path))
    }

    fn set_input_current_limit(&mut self, milliampere: u16) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::InputLimit(milliampere))
    }

    fn set_charging(&mut self, enable: bool) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::Charging(enable))
    }

    fn set_auto_detection(&mut self, enable: bool) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::AutoDetection(enable))
    }

    fn enable_source(&mut self, millivolt: u16) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::EnableSource(millivolt))
    }

    fn disable_source(&mut self) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::DisableSource)
    }

    fn set_source_current_limit(&mut self, milliampere: u16) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::SourceLimit(milliampere))
    }

    fn set_charge_voltage_limit(&mut self, millivolt: u16) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::ChargeVoltage(millivolt))
    }

    fn set_charge_current_limit(&mut self, milliampere: u16) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::ChargeCurrent(milliampere))
    }

    fn set_thermistor(&mut self, enable: bool) -> Result<(), BusError> {
        self.0.borrow_mut().record(Command::Thermistor(enable))
    }
}

impl PowerDeliveryController for Handle {
    fn connection_state(&self) -> ConnectionState {
        self.0.borrow().connection
    }

    fn has_contract(&self) -> bool {
        self.0.borrow().contract
    }

    fn advertised_current_ma(&self) -> u16 {
        self.0.borrow().advertised_ma
    }
}

impl RigPowerSensor for Handle {
    fn is_powered(&self) -> bool {
        self.0.borrow().rig_on
    }
}

impl StatusIndicator for Handle {
    type Error = Infallible;

    fn show(&mut self, command: LedCommand) -> Result<(), Infallible> {
        self.0.borrow_mut().led.push(command);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().led_power_downs += 1;
        Ok(())
    }

    fn wake(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().led_wakes += 1;
        Ok(())
    }
}

impl TickSource for Handle {
    fn now(&self) -> Ticks {
        self.0.borrow().now
    }
}

type Sm = ChargerStateMachine<Handle, Handle, Handle, Handle, Handle>;
type Shared = Rc<RefCell<Bench>>;

fn machine_with(config: ChargerConfig) -> (Sm, Shared) {
    let bench = Rc::new(RefCell::new(Bench {
        advertised_ma: TYPE_C_DEFAULT_CURRENT_MA,
        measurements: Measurements {
            vbus_mv: 5000,
            ibus_ma: 0,
            vbat_mv: 11500,
            ibat_ma: 0,
        },
        ..Default::default()
    }));
    let h = Handle(bench.clone());
    let sm = ChargerStateMachine::new(h.clone(), h.clone(), h.clone(), h.clone(), h, config);
    (sm, bench)
}

fn machine() -> (Sm, Shared) {
    machine_with(ChargerConfig::default())
}

/// Source mode iff `Discharging`; charging only in a charging state and not inhibited.
fn assert_invariants(sm: &Sm, bench: &Shared) {
    let b = bench.borrow();
    assert_eq!(
        b.sourcing.is_some(),
        sm.state() == ChargerState::Discharging,
        "source mode in {}",
        sm.state()
    );
    if b.charging {
        assert!(sm.state().is_charging(), "charging in {}", sm.state());
        assert!(!b.rig_on || sm.config().charge_when_rig_is_on);
    }
}

fn run(sm: &mut Sm, bench: &Shared) -> Option<Ticks> {
    let deadline = sm.run().unwrap();
    assert_invariants(sm, bench);
    deadline
}

fn dc_charging() -> (Sm, Shared) {
    let (mut sm, bench) = machine();
    bench.borrow_mut().presence.dc_jack = true;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::DcCharging);
    (sm, bench)
}

fn negotiating() -> (Sm, Shared) {
    let (mut sm, bench) = machine();
    {
        let mut b = bench.borrow_mut();
        b.presence.usb = true;
        b.connection = ConnectionState::AttachedSink;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);
    (sm, bench)
}

fn discharging() -> (Sm, Shared) {
    let (mut sm, bench) = machine();
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    run(&mut sm, &bench);
    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Applied
    );
    bench.borrow_mut().presence.usb = true;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Discharging);
    (sm, bench)
}

fn reach(state: ChargerState) -> (Sm, Shared) {
    match state {
        ChargerState::Disconnected => {
            let (mut sm, bench) = machine();
            // VBUS without an attached sink keeps us disconnected
            bench.borrow_mut().presence.usb = true;
            run(&mut sm, &bench);
            (sm, bench)
        }
        ChargerState::DcCharging => dc_charging(),
        ChargerState::UsbNegotiating => negotiating(),
        ChargerState::UsbTypeCCharging => {
            let (mut sm, bench) = negotiating();
            bench.borrow_mut().now = NEGOTIATION_TIMEOUT_TICKS;
            run(&mut sm, &bench);
            (sm, bench)
        }
        ChargerState::UsbPdCharging => {
            let (mut sm, bench) = negotiating();
            bench.borrow_mut().contract = true;
            run(&mut sm, &bench);
            (sm, bench)
        }
        ChargerState::RigOn => {
            let (mut sm, bench) = dc_charging();
            bench.borrow_mut().rig_on = true;
            run(&mut sm, &bench);
            (sm, bench)
        }
        ChargerState::Discharging => discharging(),
        ChargerState::DischargingBlocked => {
            let (mut sm, bench) = discharging();
            bench.borrow_mut().measurements.vbat_mv = 9000;
            run(&mut sm, &bench);
            (sm, bench)
        }
        ChargerState::Fault => unreachable!("fault is only entered through the fault check"),
    }
}

#[test]
fn test_starts_disconnected() {
    let (mut sm, bench) = machine();
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(sm.pre_fault_state(), ChargerState::Disconnected);
    assert_eq!(sm.otg_voltage_mv(), 0);
    assert_eq!(sm.otg_current_ma(), 0);
    assert!(!sm.is_low_battery_latched());

    assert_eq!(run(&mut sm, &bench), None);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(bench.borrow().led, [LedCommand::Off]);
}

#[test]
fn test_init_resets_everything() {
    let (mut sm, _bench) = reach(ChargerState::DischargingBlocked);
    assert!(sm.is_low_battery_latched());

    sm.init();
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(sm.otg_voltage_mv(), 0);
    assert_eq!(sm.otg_current_ma(), 0);
    assert!(!sm.is_low_battery_latched());
    assert!(!sm.negotiation_timer.is_armed());
}

#[test]
fn test_dc_jack_starts_dc_charging() {
    let (_sm, bench) = dc_charging();
    let b = bench.borrow();
    assert_eq!(
        b.commands,
        [
            Command::SelectInput(InputPath::DcJack),
            Command::InputLimit(ChargerConfig::default().dc_input_current_limit_ma),
            Command::Charging(true),
        ]
    );
    assert!(b.charging);
    assert_eq!(b.led_wakes, 1);
}

#[test]
fn test_dc_removed_with_usb_sink_attached_starts_negotiating() {
    let (mut sm, bench) = dc_charging();
    {
        let mut b = bench.borrow_mut();
        b.presence = InputPresence {
            usb: true,
            dc_jack: false,
        };
        b.connection = ConnectionState::AttachedSink;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);
    assert!(!bench.borrow().charging);
}

#[test]
fn test_dc_removed_without_usb_disconnects() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().presence.dc_jack = false;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    let b = bench.borrow();
    assert!(!b.charging);
    assert_eq!(b.led_power_downs, 1);
    assert_eq!(b.led.last(), Some(&LedCommand::Breathe(Color::GREEN, BreathSpeed::Slowest)));
}

#[test]
fn test_negotiation_timeout_falls_back_to_type_c() {
    let (mut sm, bench) = negotiating();
    assert_eq!(
        bench.borrow().commands,
        [
            Command::Charging(false),
            Command::SelectInput(InputPath::Usb),
            Command::InputLimit(TYPE_C_DEFAULT_CURRENT_MA),
        ]
    );
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Blink(Color::GREEN, BlinkRate::Fast))
    );

    bench.borrow_mut().now = 1000;
    assert_eq!(run(&mut sm, &bench), Some(2000));
    bench.borrow_mut().now = 2999;
    assert_eq!(run(&mut sm, &bench), Some(1));
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);

    bench.borrow_mut().now = 3000;
    assert_eq!(run(&mut sm, &bench), None);
    assert_eq!(sm.state(), ChargerState::UsbTypeCCharging);
    let b = bench.borrow();
    assert_eq!(b.count(Command::AutoDetection(true)), 1);
    assert!(b.charging);
}

#[test]
fn test_contract_before_timeout_goes_straight_to_pd() {
    let (mut sm, bench) = negotiating();
    {
        let mut b = bench.borrow_mut();
        b.now = 1200;
        b.contract = true;
        b.advertised_ma = 3000;
    }
    assert_eq!(run(&mut sm, &bench), None);
    assert_eq!(sm.state(), ChargerState::UsbPdCharging);
    assert!(!sm.negotiation_timer.is_armed());

    let b = bench.borrow();
    assert_eq!(b.count(Command::AutoDetection(false)), 1);
    assert_eq!(b.count(Command::InputLimit(3000)), 1);
    assert!(b.charging);
}

#[test]
fn test_pd_off_skips_negotiation_wait() {
    let (mut sm, bench) = machine_with(ChargerConfig {
        pd_mode: PdMode::Off,
        ..ChargerConfig::default()
    });
    {
        let mut b = bench.borrow_mut();
        b.presence.usb = true;
        b.connection = ConnectionState::AttachedSink;
    }
    // due right away instead of after the negotiation timeout
    assert_eq!(run(&mut sm, &bench), Some(0));
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);
    assert_eq!(run(&mut sm, &bench), None);
    assert_eq!(sm.state(), ChargerState::UsbTypeCCharging);
    assert!(bench.borrow().charging);
}

#[test]
fn test_entering_negotiation_reports_timer_deadline() {
    let (mut sm, bench) = machine();
    {
        let mut b = bench.borrow_mut();
        b.presence.usb = true;
        b.connection = ConnectionState::AttachedSink;
    }
    assert_eq!(run(&mut sm, &bench), Some(NEGOTIATION_TIMEOUT_TICKS));
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);

    let (mut sm, bench) = dc_charging();
    {
        let mut b = bench.borrow_mut();
        b.presence = InputPresence {
            usb: true,
            dc_jack: false,
        };
        b.connection = ConnectionState::AttachedSink;
        b.now = 500;
    }
    assert_eq!(run(&mut sm, &bench), Some(NEGOTIATION_TIMEOUT_TICKS));
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);
}

#[test]
fn test_resuming_negotiation_after_fault_reports_timer_deadline() {
    let (mut sm, bench) = negotiating();
    bench.borrow_mut().fault = 0x0100;
    assert_eq!(run(&mut sm, &bench), None);
    assert_eq!(sm.state(), ChargerState::Fault);

    bench.borrow_mut().fault = 0;
    assert_eq!(run(&mut sm, &bench), Some(NEGOTIATION_TIMEOUT_TICKS));
    assert_eq!(sm.state(), ChargerState::UsbNegotiating);
}

#[test]
fn test_usb_removed_while_negotiating_disconnects() {
    let (mut sm, bench) = negotiating();
    bench.borrow_mut().presence.usb = false;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert!(!sm.negotiation_timer.is_armed());
}

#[test]
fn test_type_c_with_advertised_current_sets_limit() {
    let (mut sm, bench) = negotiating();
    {
        let mut b = bench.borrow_mut();
        b.advertised_ma = 1500;
        b.now = NEGOTIATION_TIMEOUT_TICKS;
        b.commands.clear();
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::UsbTypeCCharging);
    assert_eq!(
        bench.borrow().commands,
        [
            Command::AutoDetection(false),
            Command::InputLimit(1500),
            Command::Charging(true),
        ]
    );
}

#[test]
fn test_type_c_follows_advertised_current() {
    let (mut sm, bench) = reach(ChargerState::UsbTypeCCharging);
    bench.borrow_mut().commands.clear();

    // still at the default, BC1.2 detection keeps the limit
    run(&mut sm, &bench);
    assert!(bench.borrow().commands.is_empty());

    bench.borrow_mut().advertised_ma = 1500;
    run(&mut sm, &bench);
    run(&mut sm, &bench);
    assert_eq!(
        bench.borrow().commands,
        [Command::AutoDetection(false), Command::InputLimit(1500)]
    );

    bench.borrow_mut().advertised_ma = 3000;
    run(&mut sm, &bench);
    assert_eq!(bench.borrow().count(Command::InputLimit(3000)), 1);
    assert_eq!(bench.borrow().count(Command::AutoDetection(false)), 1);
}

#[test]
fn test_type_c_upgrades_to_pd_and_back() {
    let (mut sm, bench) = reach(ChargerState::UsbTypeCCharging);
    bench.borrow_mut().contract = true;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::UsbPdCharging);

    bench.borrow_mut().contract = false;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::UsbTypeCCharging);

    bench.borrow_mut().connection = ConnectionState::Disconnected;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
}

#[test]
fn test_pd_reapplies_limit_only_on_change() {
    let (mut sm, bench) = reach(ChargerState::UsbPdCharging);
    bench.borrow_mut().commands.clear();

    run(&mut sm, &bench);
    assert!(bench.borrow().commands.is_empty());

    bench.borrow_mut().advertised_ma = 2000;
    run(&mut sm, &bench);
    run(&mut sm, &bench);
    assert_eq!(bench.borrow().commands, [Command::InputLimit(2000)]);
}

#[test]
fn test_rig_power_inhibits_charging() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().rig_on = true;
    run(&mut sm, &bench);

    assert_eq!(sm.state(), ChargerState::RigOn);
    let b = bench.borrow();
    assert!(!b.charging);
    assert_eq!(b.led.last(), Some(&LedCommand::Solid(Color::MAGENTA)));
}

#[test]
fn test_rig_power_allowed_by_config() {
    let (mut sm, bench) = machine_with(ChargerConfig {
        charge_when_rig_is_on: true,
        ..ChargerConfig::default()
    });
    {
        let mut b = bench.borrow_mut();
        b.presence.dc_jack = true;
        b.rig_on = true;
    }
    run(&mut sm, &bench);
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::DcCharging);
    assert!(bench.borrow().charging);
}

#[test]
fn test_charging_entry_with_rig_on_never_enables_charging() {
    let (mut sm, bench) = machine();
    {
        let mut b = bench.borrow_mut();
        b.presence.dc_jack = true;
        b.rig_on = true;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::DcCharging);
    assert_eq!(bench.borrow().count(Command::Charging(true)), 0);

    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::RigOn);
}

#[test]
fn test_rig_on_exits() {
    let (mut sm, bench) = reach(ChargerState::RigOn);
    bench.borrow_mut().rig_on = false;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);

    let (mut sm, bench) = reach(ChargerState::RigOn);
    bench.borrow_mut().presence = InputPresence::default();
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
}

#[test]
fn test_source_request_starts_discharging() {
    let (sm, bench) = discharging();
    let b = bench.borrow();
    let default = ChargerConfig::default();
    assert_eq!(
        b.commands,
        [
            Command::Charging(false),
            Command::SelectInput(InputPath::Usb),
            Command::SourceLimit(default.otg_current_limit_ma),
            Command::EnableSource(5000 + default.otg_voltage_headroom_mv),
        ]
    );
    assert_eq!(sm.otg_voltage_mv(), 5000);
    assert_eq!(sm.otg_current_ma(), default.otg_current_limit_ma);
    assert_eq!(
        b.led.last(),
        Some(&LedCommand::Breathe(Color::BLUE, BreathSpeed::Slowest))
    );
}

#[test]
fn test_repeated_source_request_is_idempotent() {
    let (mut sm, bench) = discharging();
    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Unchanged
    );
    assert_eq!(bench.borrow().count(Command::EnableSource(5200)), 1);
}

#[test]
fn test_source_retarget_while_discharging() {
    let (mut sm, bench) = discharging();
    assert_eq!(
        sm.on_source_voltage_request(9000).unwrap(),
        SourceResponse::Applied
    );
    assert_eq!(sm.state(), ChargerState::Discharging);
    assert_eq!(bench.borrow().sourcing, Some(9200));
}

#[test]
fn test_headroom_above_ceiling_is_skipped() {
    let (mut sm, bench) = machine_with(ChargerConfig {
        otg_voltage_headroom_mv: 600,
        ..ChargerConfig::default()
    });
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    sm.on_source_voltage_request(5000).unwrap();
    assert_eq!(bench.borrow().sourcing, Some(5000));

    let (mut sm, bench) = machine_with(ChargerConfig {
        otg_voltage_headroom_mv: OTG_HEADROOM_CEILING_MV,
        ..ChargerConfig::default()
    });
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    sm.on_source_voltage_request(5000).unwrap();
    assert_eq!(bench.borrow().sourcing, Some(5500));
}

#[test]
fn test_zero_voltage_stops_discharging() {
    let (mut sm, bench) = discharging();
    assert_eq!(
        sm.on_source_voltage_request(0).unwrap(),
        SourceResponse::Applied
    );
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(sm.otg_current_ma(), 0);
    assert_invariants(&sm, &bench);
}

#[test]
fn test_partner_detach_stops_discharging() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().connection = ConnectionState::Disconnected;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(sm.otg_voltage_mv(), 0);
}

#[test]
fn test_low_battery_blocks_discharging_until_recharged() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().measurements.vbat_mv = 9800;
    run(&mut sm, &bench);

    assert_eq!(sm.state(), ChargerState::DischargingBlocked);
    assert!(sm.is_low_battery_latched());
    assert_eq!(bench.borrow().sourcing, None);
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Blink(Color::RED, BlinkRate::Slow))
    );

    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Rejected(RejectReason::LowBattery)
    );
    assert_eq!(sm.state(), ChargerState::DischargingBlocked);

    // disconnecting alone does not clear the latch
    bench.borrow_mut().connection = ConnectionState::Disconnected;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Rejected(RejectReason::LowBattery)
    );
    assert_eq!(sm.state(), ChargerState::Disconnected);

    {
        let mut b = bench.borrow_mut();
        b.connection = ConnectionState::Disconnected;
        b.presence.dc_jack = true;
        b.measurements.vbat_mv = 11000;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::DcCharging);
    assert!(!sm.is_low_battery_latched());
}

#[test]
fn test_dc_jack_refuses_source_start() {
    let (mut sm, bench) = machine();
    {
        let mut b = bench.borrow_mut();
        b.presence.dc_jack = true;
        b.connection = ConnectionState::AttachedSource;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::DcCharging);
    bench.borrow_mut().commands.clear();

    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Rejected(RejectReason::DcInputPresent)
    );
    assert_eq!(sm.state(), ChargerState::DcCharging);
    assert!(bench.borrow().commands.is_empty());

    bench.borrow_mut().presence.dc_jack = false;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Applied
    );
    assert_eq!(sm.state(), ChargerState::Discharging);
}

#[test]
fn test_dc_jack_does_not_stop_active_source() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().presence.dc_jack = true;
    assert_eq!(
        sm.on_source_voltage_request(9000).unwrap(),
        SourceResponse::Applied
    );
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Discharging);
}

#[test]
fn test_source_current_is_clamped_and_deduplicated() {
    let (mut sm, bench) = machine();
    sm.on_source_current_request(5000).unwrap();
    sm.on_source_current_request(4000).unwrap();
    assert_eq!(sm.otg_current_ma(), 3000);
    assert_eq!(bench.borrow().commands, [Command::SourceLimit(3000)]);

    sm.on_source_current_request(1500).unwrap();
    assert_eq!(bench.borrow().count(Command::SourceLimit(1500)), 1);
}

#[test]
fn test_explicit_source_current_survives_source_start() {
    let (mut sm, bench) = machine();
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    sm.on_source_current_request(1500).unwrap();
    sm.on_source_voltage_request(5000).unwrap();
    assert_eq!(sm.otg_current_ma(), 1500);
    assert_eq!(bench.borrow().count(Command::SourceLimit(3000)), 0);
}

#[test]
fn test_queued_source_requests_are_applied_in_order() {
    let (mut sm, bench) = machine();
    bench.borrow_mut().connection = ConnectionState::AttachedSource;

    let requests = SourceRequestChannel::new();
    requests.try_send(SourceRequest::Voltage(5000)).unwrap();
    requests.try_send(SourceRequest::Current(1000)).unwrap();
    sm.drain_source_requests(&requests).unwrap();
    assert_eq!(sm.state(), ChargerState::Discharging);
    assert_eq!(sm.otg_current_ma(), 1000);

    requests.try_send(SourceRequest::Voltage(0)).unwrap();
    sm.drain_source_requests(&requests).unwrap();
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert!(requests.try_receive().is_err());

    let b = bench.borrow();
    let source_commands: Vec<_> = b
        .commands
        .iter()
        .filter(|c| {
            matches!(
                c,
                Command::SourceLimit(_) | Command::EnableSource(_) | Command::DisableSource
            )
        })
        .collect();
    assert_eq!(
        source_commands,
        [
            &Command::SourceLimit(3000),
            &Command::EnableSource(5200),
            &Command::SourceLimit(1000),
            &Command::DisableSource,
            &Command::DisableSource,
        ]
    );
}

#[test]
fn test_fault_preempts_every_state_and_resumes() {
    let states = [
        ChargerState::Disconnected,
        ChargerState::DcCharging,
        ChargerState::UsbNegotiating,
        ChargerState::UsbTypeCCharging,
        ChargerState::UsbPdCharging,
        ChargerState::RigOn,
        ChargerState::Discharging,
        ChargerState::DischargingBlocked,
    ];
    for state in states {
        let (mut sm, bench) = reach(state);
        assert_eq!(sm.state(), state);

        bench.borrow_mut().fault = 0x0100;
        run(&mut sm, &bench);
        assert_eq!(sm.state(), ChargerState::Fault, "from {state}");
        assert_eq!(sm.pre_fault_state(), state);
        assert!(!bench.borrow().charging);
        assert_eq!(bench.borrow().sourcing, None);
        assert_eq!(
            bench.borrow().led.last(),
            Some(&LedCommand::Blink(Color::RED, BlinkRate::Fast))
        );

        // stays while the fault persists
        run(&mut sm, &bench);
        assert_eq!(sm.state(), ChargerState::Fault);

        bench.borrow_mut().fault = 0;
        run(&mut sm, &bench);
        assert_eq!(sm.state(), state, "resuming {state}");
    }
}

#[test]
fn test_fault_cleared_with_input_gone_ends_disconnected() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().fault = 0x8000;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Fault);

    {
        let mut b = bench.borrow_mut();
        b.fault = 0;
        b.presence.dc_jack = false;
    }
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
}

#[test]
fn test_fault_restores_when_inputs_disappear() {
    let (mut sm, bench) = reach(ChargerState::Disconnected);
    bench.borrow_mut().fault = 0x0001;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Fault);

    bench.borrow_mut().presence = InputPresence::default();
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Fault);

    bench.borrow_mut().fault = 0;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
}

#[test]
fn test_persistent_fault_keeps_source_off_after_vbus_collapses() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().fault = 0x0040;
    for _ in 0..4 {
        run(&mut sm, &bench);
        // source off, VBUS gone
        bench.borrow_mut().presence = InputPresence::default();
        assert_eq!(sm.state(), ChargerState::Fault);
        assert_eq!(bench.borrow().sourcing, None);
    }
    assert_eq!(bench.borrow().count(Command::EnableSource(5200)), 1);
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Blink(Color::RED, BlinkRate::Fast))
    );

    bench.borrow_mut().fault = 0;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Discharging);
    assert_eq!(bench.borrow().sourcing, Some(5200));
}

#[test]
fn test_persistent_fault_keeps_charging_off_after_dc_removed() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().fault = 0x0040;
    run(&mut sm, &bench);
    bench.borrow_mut().presence = InputPresence::default();
    for _ in 0..4 {
        run(&mut sm, &bench);
        assert_eq!(sm.state(), ChargerState::Fault);
        assert!(!bench.borrow().charging);
    }
    assert_eq!(bench.borrow().count(Command::Charging(true)), 1);

    bench.borrow_mut().fault = 0;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
    assert!(!bench.borrow().charging);
}

#[test]
fn test_source_request_during_fault_is_deferred() {
    let (mut sm, bench) = reach(ChargerState::Disconnected);
    bench.borrow_mut().connection = ConnectionState::AttachedSource;
    bench.borrow_mut().fault = 0x0400;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Fault);

    assert_eq!(
        sm.on_source_voltage_request(5000).unwrap(),
        SourceResponse::Deferred
    );
    assert_eq!(sm.state(), ChargerState::Fault);
    assert_eq!(bench.borrow().sourcing, None);

    bench.borrow_mut().fault = 0;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Discharging);
    assert_eq!(bench.borrow().sourcing, Some(5200));
}

#[test]
fn test_source_stop_during_fault_forgets_discharging() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().fault = 0x0400;
    run(&mut sm, &bench);
    assert_eq!(sm.pre_fault_state(), ChargerState::Discharging);

    sm.on_source_voltage_request(0).unwrap();
    assert_eq!(sm.state(), ChargerState::Fault);
    assert_eq!(sm.pre_fault_state(), ChargerState::Disconnected);

    bench.borrow_mut().fault = 0;
    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::Disconnected);
}

#[test]
fn test_indicator_follows_battery_current_without_repeats() {
    let (mut sm, bench) = dc_charging();
    let shown = bench.borrow().led.len();

    run(&mut sm, &bench);
    assert_eq!(bench.borrow().led.len(), shown);

    bench.borrow_mut().measurements.ibat_ma = 2100;
    run(&mut sm, &bench);
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Breathe(Color::GREEN, BreathSpeed::Fastest))
    );

    {
        let mut b = bench.borrow_mut();
        b.temperature = TemperatureStatus::WARM;
        b.charge_status = ChargeStatus::TaperCharge;
    }
    run(&mut sm, &bench);
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Breathe(Color::AMBER, BreathSpeed::Fastest))
    );

    bench.borrow_mut().charge_status = ChargeStatus::Done;
    run(&mut sm, &bench);
    assert_eq!(
        bench.borrow().led.last(),
        Some(&LedCommand::Solid(Color::GREEN))
    );
}

#[test]
fn test_bus_failure_is_propagated() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().bus_down = true;
    assert_eq!(sm.run(), Err(Error::Charger(BusError)));
    assert_eq!(
        sm.on_source_voltage_request(5000),
        Err(Error::Charger(BusError))
    );
    assert_eq!(sm.state(), ChargerState::DcCharging);
}

#[test]
fn test_static_config_is_written() {
    let (mut sm, bench) = machine_with(ChargerConfig {
        enable_thermistor: true,
        ..ChargerConfig::default()
    });
    sm.apply_static_config().unwrap();
    assert_eq!(
        bench.borrow().commands,
        [
            Command::ChargeVoltage(12600),
            Command::ChargeCurrent(3000),
            Command::Thermistor(true),
        ]
    );
}

#[test]
fn test_status_swaps_power_flow_while_sourcing() {
    let (mut sm, bench) = discharging();
    bench.borrow_mut().measurements = Measurements {
        vbus_mv: 5000,
        ibus_ma: -2000,
        vbat_mv: 11000,
        ibat_ma: -1000,
    };
    let report = sm.status().unwrap();
    assert_eq!(report.state, ChargerState::Discharging);
    assert_eq!(report.power.input_mw, 11000);
    assert_eq!(report.power.output_mw, 10000);
}

#[test]
fn test_advisory_notifications_do_not_change_state() {
    let (mut sm, bench) = dc_charging();
    bench.borrow_mut().rig_on = true;
    let commands = bench.borrow().commands.len();

    sm.on_pd_state_change();
    sm.on_kx2_state_change(true);
    sm.on_bq_interrupt();
    assert_eq!(sm.state(), ChargerState::DcCharging);
    assert_eq!(bench.borrow().commands.len(), commands);

    run(&mut sm, &bench);
    assert_eq!(sm.state(), ChargerState::RigOn);
}
