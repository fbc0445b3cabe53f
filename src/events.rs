//! Interrupt handlers never touch the charger or the port controller. They only
//! raise a bit in an [`EventLatch`]; the main loop takes the whole set in one
//! atomic swap and turns it into advisory calls plus a fresh `run()`.
//!
//! Source-mode requests travel the other way round: the PD engine posts them
//! into a [`SourceRequestChannel`] from wherever it happens to be in its own
//! call stack, and the main loop hands them to the state machine in order.

use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct PendingEvents: u32 {
        /// Charger IC interrupt line asserted
        const CHARGER        = 1 << 0;
        /// Port controller interrupt line asserted
        const POWER_DELIVERY = 1 << 1;
        /// Rig power sense changed level
        const RIG            = 1 << 2;
        /// Wake-up alarm fired
        const TIMER          = 1 << 3;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PendingEvents {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PendingEvents({=u32:#x})", self.bits());
    }
}

/// Lock-free set of pending events, safe to raise from interrupt context.
#[derive(Debug, Default)]
pub struct EventLatch {
    bits: AtomicU32,
}

impl EventLatch {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn raise(&self, events: PendingEvents) {
        self.bits.fetch_or(events.bits(), Ordering::Release);
    }

    /// Take and clear everything raised so far.
    pub fn take(&self) -> PendingEvents {
        PendingEvents::from_bits_truncate(self.bits.swap(0, Ordering::Acquire))
    }

    pub fn is_pending(&self) -> bool {
        self.bits.load(Ordering::Acquire) != 0
    }
}

/// Source-mode target raised by the PD engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceRequest {
    /// Output voltage in mV, 0 turns source mode off
    Voltage(u16),
    /// Output current limit in mA
    Current(u16),
}

pub const SOURCE_REQUEST_DEPTH: usize = 4;

pub type SourceRequestChannel =
    Channel<CriticalSectionRawMutex, SourceRequest, SOURCE_REQUEST_DEPTH>;

/// Queue a request without blocking. Returns `false` if the queue was full and the
/// request was dropped.
pub fn post_source_request(channel: &SourceRequestChannel, request: SourceRequest) -> bool {
    match channel.try_send(request) {
        Ok(()) => true,
        Err(_) => {
            // the main loop drains the queue every cycle, so this means it is stuck
            warn!("source request queue full, dropping {:?}", request);
            false
        }
    }
}
