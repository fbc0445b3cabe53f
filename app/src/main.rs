#![no_std]
#![no_main]

use controller::Controller;
use embassy_executor::Spawner;
use embedded_hal_bus::util::AtomicCell;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::i2c::master::I2c;
use esp_hal::rtc_cntl::{Rtc, RwdtStage};
use esp_hal::time::Duration;
use esp_hal::xtensa_lx::singleton;
use esp_hal_embassy::main;
use hardware::{
    charger_irq_task, initialize_led, initialize_port, initialize_rig_sense, led_task, port_task,
    rig_task, Charger, I2cBus, LedIndicator, PmuImpl, RigSense, TypeCPort,
};
use log::info;
use pd_charger::ChargerStateMachine;

use crate::clock::EmbassyClock;
use crate::config::{CHARGER_CONFIG, WATCHDOG_TIMEOUT_SECS};

mod clock;
mod config;
mod controller;
mod hardware;

esp_bootloader_esp_idf::esp_app_desc!();

#[main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    // Initialize peripherals
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz));

    let timg0 = esp_hal::timer::timg::TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timg0.timer0);
    info!("Embassy initialized!");

    CHARGER_CONFIG
        .validate()
        .expect("invalid charger configuration");

    // Initialize I2C bus
    let i2c = I2c::new(peripherals.I2C0, esp_hal::i2c::master::Config::default())
        .expect("I2C configuration rejected")
        .with_sda(peripherals.GPIO8)
        .with_scl(peripherals.GPIO9);

    let i2c_ref_cell = singleton!(:AtomicCell<I2cBus> = AtomicCell::new(i2c))
        .expect("Failed to create I2C mutex");

    // Initialize power management unit
    let pmu: Charger = PmuImpl::new(i2c_ref_cell);

    // BQ25798 INT, open drain
    let charger_int = Input::new(peripherals.GPIO4, InputConfig::default().with_pull(Pull::Up));
    // KX2 rig power, high while the radio is on
    let rig_sense = initialize_rig_sense(Input::new(
        peripherals.GPIO6,
        InputConfig::default().with_pull(Pull::Down),
    ));

    let port = initialize_port(i2c_ref_cell, CHARGER_CONFIG.role);
    let indicator = LedIndicator::new(initialize_led(i2c_ref_cell));

    // TASK: forward charger interrupts
    spawner.spawn(charger_irq_task(charger_int)).ok();

    // TASK: track the rig power sense line
    spawner.spawn(rig_task(rig_sense)).ok();

    // TASK: Type-C attach detection
    spawner.spawn(port_task(port)).ok();

    // TASK: LED animation, on its own handle to the LED driver
    spawner.spawn(led_task(initialize_led(i2c_ref_cell))).ok();

    let mut sm = ChargerStateMachine::new(
        pmu,
        TypeCPort,
        RigSense,
        indicator,
        EmbassyClock,
        CHARGER_CONFIG,
    );
    sm.apply_static_config()
        .expect("charger static configuration failed");

    // fed by the controller while both chips answer
    let mut rtc = Rtc::new(peripherals.LPWR);
    rtc.rwdt.set_timeout(
        RwdtStage::Stage0,
        Duration::from_secs(WATCHDOG_TIMEOUT_SECS),
    );
    rtc.rwdt.enable();
    info!("Watchdog armed, {}s", WATCHDOG_TIMEOUT_SECS);

    // run the controller event loop
    let mut controller = Controller::new(sm, rtc, i2c_ref_cell);
    controller.run().await;
}
