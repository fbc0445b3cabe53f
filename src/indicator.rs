//! The status LED is the only user-visible diagnostic surface. This module maps
//! the charger state plus a few live readings onto a small vocabulary of LED
//! commands, and renders those commands into colour frames for a software
//! animation loop.

use crate::charger_sm::ChargerState;
use crate::collaborators::{ChargeStatus, TemperatureStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
    pub const AMBER: Color = Color::rgb(255, 128, 0);
    pub const CYAN: Color = Color::rgb(0, 160, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale every channel by `level / 255`.
    pub fn dimmed(self, level: u8) -> Self {
        let scale = |c: u8| ((c as u16 * level as u16) / 255) as u8;
        Self::rgb(scale(self.r), scale(self.g), scale(self.b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlinkRate {
    /// 5 Hz
    Fast,
    /// 1 Hz
    Slow,
}

impl BlinkRate {
    pub const fn period_ms(self) -> u32 {
        match self {
            BlinkRate::Fast => 200,
            BlinkRate::Slow => 1000,
        }
    }
}

/// Breathing speed, faster with more current through the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BreathSpeed {
    Fastest,
    Fast,
    Slow,
    Slowest,
}

impl BreathSpeed {
    pub fn from_battery_current(milliampere: i16) -> Self {
        match milliampere.unsigned_abs() {
            2000.. => BreathSpeed::Fastest,
            1000..=1999 => BreathSpeed::Fast,
            500..=999 => BreathSpeed::Slow,
            _ => BreathSpeed::Slowest,
        }
    }

    pub const fn period_ms(self) -> u32 {
        match self {
            BreathSpeed::Fastest => 1000,
            BreathSpeed::Fast => 2000,
            BreathSpeed::Slow => 3000,
            BreathSpeed::Slowest => 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedCommand {
    Off,
    Solid(Color),
    Blink(Color, BlinkRate),
    Breathe(Color, BreathSpeed),
}

impl LedCommand {
    /// Colour to drive `elapsed_ms` after the command was first shown.
    pub fn frame(&self, elapsed_ms: u32) -> Color {
        match *self {
            LedCommand::Off => Color::OFF,
            LedCommand::Solid(color) => color,
            LedCommand::Blink(color, rate) => {
                let period = rate.period_ms();
                if elapsed_ms % period < period / 2 {
                    color
                } else {
                    Color::OFF
                }
            }
            LedCommand::Breathe(color, speed) => {
                let period = speed.period_ms();
                let half = period / 2;
                let phase = elapsed_ms % period;
                let ramp = if phase < half { phase } else { period - phase };
                color.dimmed((ramp * 255 / half).min(255) as u8)
            }
        }
    }
}

/// Live readings the policy depends on. Only sampled in states that show power flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorInputs {
    pub temperature: TemperatureStatus,
    pub battery_current_ma: i16,
    pub charge_status: ChargeStatus,
}

/// Map a state onto the LED command that represents it.
pub fn command_for(state: ChargerState, inputs: &IndicatorInputs) -> LedCommand {
    match state {
        ChargerState::Fault => LedCommand::Blink(Color::RED, BlinkRate::Fast),
        ChargerState::UsbNegotiating => LedCommand::Blink(Color::GREEN, BlinkRate::Fast),
        ChargerState::RigOn => LedCommand::Solid(Color::MAGENTA),
        ChargerState::DischargingBlocked => LedCommand::Blink(Color::RED, BlinkRate::Slow),
        ChargerState::Disconnected => LedCommand::Off,
        ChargerState::DcCharging | ChargerState::UsbTypeCCharging | ChargerState::UsbPdCharging => {
            power_flow_command(Color::GREEN, true, inputs)
        }
        ChargerState::Discharging => power_flow_command(Color::BLUE, false, inputs),
    }
}

fn power_flow_command(normal: Color, charging: bool, inputs: &IndicatorInputs) -> LedCommand {
    if inputs.temperature.is_suspended() {
        return LedCommand::Solid(Color::RED);
    }
    if charging && inputs.charge_status == ChargeStatus::Done {
        return LedCommand::Solid(Color::GREEN);
    }
    let color = if inputs.temperature.contains(TemperatureStatus::WARM) {
        Color::AMBER
    } else if inputs.temperature.contains(TemperatureStatus::COOL) {
        Color::CYAN
    } else {
        normal
    };
    LedCommand::Breathe(color, BreathSpeed::from_battery_current(inputs.battery_current_ma))
}
