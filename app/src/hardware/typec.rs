//! Type-C port hardware module
//!
//! The FUSB302 runs attach detection in its own task and publishes the last
//! [`PortStatus`]. The state machine reads it through [`TypeCPort`].

use core::cell::Cell;

use drivers::fusb302::{Attachment, PortRole, PortStatus, DEFAULT_CURRENT_MA, FUSB302};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Timer;
use embedded_hal_bus::i2c::AtomicDevice;
use embedded_hal_bus::util::AtomicCell;
use log::{info, warn};
use pd_charger::collaborators::{ConnectionState, PowerDeliveryController};
use pd_charger::config::Role;
use pd_charger::events::{post_source_request, PendingEvents, SourceRequest};

use super::I2cBus;
use crate::config::{PORT_POLL_INTERVAL_MS, TYPE_C_SOURCE_MV};
use crate::controller::{raise_event, SOURCE_REQUESTS};

/// Type alias for the FUSB302 driver instance
pub type Port = FUSB302<AtomicDevice<'static, I2cBus>>;

static PORT_STATUS: Mutex<CriticalSectionRawMutex, Cell<PortStatus>> =
    Mutex::new(Cell::new(PortStatus {
        attachment: Attachment::Detached,
        current_ma: 0,
    }));

/// Initializes the port controller and starts toggling.
///
/// # Panics
///
/// Panics if the FUSB302 does not answer.
pub fn initialize_port(i2c_ref_cell: &'static AtomicCell<I2cBus>, role: Role) -> Port {
    let mut port = FUSB302::new(AtomicDevice::new(i2c_ref_cell));
    let role = match role {
        Role::Sink => PortRole::Sink,
        Role::Source => PortRole::Source,
        // no Try.SRC / Try.SNK without a PD stack
        Role::DualRole | Role::TrySource | Role::TrySink => PortRole::DualRole,
    };
    port.init(role).expect("FUSB302 initialization failed");
    info!(
        "FUSB302 device id: {:#04x}, role {:?}",
        port.device_id().expect("device_id failed"),
        role
    );
    port
}

/// Device id read through its own handle on the shared bus, used to gate the watchdog.
pub fn port_responds(i2c_ref_cell: &'static AtomicCell<I2cBus>) -> bool {
    FUSB302::new(AtomicDevice::new(i2c_ref_cell))
        .test_connection()
        .unwrap_or(false)
}

/// Read-only view of the port for the state machine.
///
/// There is no PD engine, so a contract never exists and the advertised
/// current comes from the partner's Rp.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCPort;

impl TypeCPort {
    fn status(&self) -> PortStatus {
        PORT_STATUS.lock(|status| status.get())
    }
}

impl PowerDeliveryController for TypeCPort {
    fn connection_state(&self) -> ConnectionState {
        match self.status().attachment {
            Attachment::Detached => ConnectionState::Disconnected,
            Attachment::Sink(_) => ConnectionState::AttachedSink,
            Attachment::Source(_) => ConnectionState::AttachedSource,
        }
    }

    fn has_contract(&self) -> bool {
        false
    }

    fn advertised_current_ma(&self) -> u16 {
        match self.status() {
            PortStatus {
                attachment: Attachment::Sink(_),
                current_ma,
            } => current_ma,
            _ => DEFAULT_CURRENT_MA,
        }
    }
}

fn publish(status: PortStatus) {
    let previous = PORT_STATUS.lock(|cell| cell.replace(status));
    info!("Type-C: {} ({} mA)", status.attachment, status.current_ma);

    let was_source = matches!(previous.attachment, Attachment::Source(_));
    let is_source = matches!(status.attachment, Attachment::Source(_));
    if is_source && !was_source {
        post_source_request(&SOURCE_REQUESTS, SourceRequest::Voltage(TYPE_C_SOURCE_MV));
    } else if was_source && !is_source {
        post_source_request(&SOURCE_REQUESTS, SourceRequest::Voltage(0));
    }
    raise_event(PendingEvents::POWER_DELIVERY);
}

#[embassy_executor::task]
pub async fn port_task(mut port: Port) {
    loop {
        match port.poll() {
            Ok(Some(status)) => publish(status),
            Ok(None) => {}
            Err(e) => warn!("Port poll failed: {}", e),
        }
        Timer::after_millis(PORT_POLL_INTERVAL_MS).await;
    }
}
