#![cfg_attr(not(test), no_std)]
//! Charger power-path state machine
//!
//! This library is the control core of a battery accessory that can charge from
//! a DC jack or a USB Type-C / USB-PD port, and that can source power back out of
//! the USB port (OTG). It decides which of those mutually exclusive modes is
//! active, drives the charger IC and the status LED accordingly, and tells the
//! surrounding scheduler how long it may sleep.
//!
//! Hardware is reached exclusively through the traits in [`collaborators`], so
//! the state machine runs unchanged on the target and in host tests.

/// Traits and value types shared with the hardware collaborators.
pub mod collaborators;

/// Static configuration record and its validation.
pub mod config;

/// The charger state machine.
pub mod charger_sm;

/// Interrupt-to-mainline event flags and the source-request mailbox.
pub mod events;

/// Status LED commands and the state-to-LED policy.
pub mod indicator;

/// Wake-up planning for the cooperative scheduler loop.
pub mod scheduler;

/// Diagnostics snapshot and power-flow arithmetic.
pub mod status;

/// Negotiation countdown.
pub mod timer;

pub use charger_sm::{ChargerState, ChargerStateMachine, Error, RejectReason, SourceResponse};
pub use config::{ChargerConfig, ConfigError};

/// Time base of the core, in ticks of one millisecond.
pub type Ticks = u32;
