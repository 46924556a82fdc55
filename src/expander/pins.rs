//! Pin table and pin modes
//!
//! Pins are numbered 1..=14 as printed on the breakout. Each maps to a port
//! bit on the MCU and optionally to a PWM and/or ADC channel.

use super::registers::*;

/// Pin function, encoded the way the expander firmware expects it
///
/// Bits 0-1 hold the GPIO mode, bits 2-3 the IO type (GPIO, PWM, ADC) and
/// bit 4 the initial output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Quasi-bidirectional
    Io,
    PushPull,
    Input,
    PullUp,
    OpenDrain,
    Pwm,
    Adc,
}

impl PinMode {
    pub const fn bits(self) -> u8 {
        match self {
            PinMode::Io => 0b00000,
            PinMode::PushPull => 0b00001,
            PinMode::Input => 0b00010,
            PinMode::PullUp => 0b10000,
            PinMode::OpenDrain => 0b00011,
            PinMode::Pwm => 0b00101,
            PinMode::Adc => 0b01010,
        }
    }

    pub const fn gpio_mode(self) -> u8 {
        self.bits() & 0b11
    }

    pub const fn initial_state(self) -> u8 {
        self.bits() >> 4
    }
}

/// MCU port a pin lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    P0,
    P1,
    P3,
}

impl Port {
    pub const fn reg_p(self) -> u8 {
        match self {
            Port::P0 => REG_P0,
            Port::P1 => REG_P1,
            Port::P3 => REG_P3,
        }
    }

    pub const fn reg_m1(self) -> u8 {
        match self {
            Port::P0 => REG_P0M1,
            Port::P1 => REG_P1M1,
            Port::P3 => REG_P3M1,
        }
    }

    pub const fn reg_m2(self) -> u8 {
        match self {
            Port::P0 => REG_P0M2,
            Port::P1 => REG_P1M2,
            Port::P3 => REG_P3M2,
        }
    }

    pub const fn reg_ps(self) -> u8 {
        match self {
            Port::P0 => REG_P0S,
            Port::P1 => REG_P1S,
            Port::P3 => REG_P3S,
        }
    }
}

/// PWM channel routing for a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmRoute {
    pub channel: u8,
    /// PIOCON register that enables the channel on this pin
    pub reg_iopwm: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinInfo {
    pub port: Port,
    pub bit: u8,
    pub pwm: Option<PwmRoute>,
    pub adc: Option<u8>,
}

impl PinInfo {
    pub fn supports(&self, mode: PinMode) -> bool {
        match mode {
            PinMode::Pwm => self.pwm.is_some(),
            PinMode::Adc => self.adc.is_some(),
            _ => true,
        }
    }
}

const fn pwm(port: Port, bit: u8, channel: u8, reg_iopwm: u8) -> PinInfo {
    PinInfo { port, bit, pwm: Some(PwmRoute { channel, reg_iopwm }), adc: None }
}

const fn adc(port: Port, bit: u8, adc_channel: u8) -> PinInfo {
    PinInfo { port, bit, pwm: None, adc: Some(adc_channel) }
}

const fn adc_or_pwm(port: Port, bit: u8, adc_channel: u8, channel: u8, reg_iopwm: u8) -> PinInfo {
    PinInfo {
        port,
        bit,
        pwm: Some(PwmRoute { channel, reg_iopwm }),
        adc: Some(adc_channel),
    }
}

pub const PIN_COUNT: u8 = 14;

pub const PINS: [PinInfo; PIN_COUNT as usize] = [
    pwm(Port::P1, 5, 5, REG_PIOCON1),
    pwm(Port::P1, 0, 2, REG_PIOCON0),
    pwm(Port::P1, 2, 0, REG_PIOCON0),
    pwm(Port::P1, 4, 1, REG_PIOCON1),
    pwm(Port::P0, 0, 3, REG_PIOCON0),
    pwm(Port::P0, 1, 4, REG_PIOCON0),
    adc_or_pwm(Port::P1, 1, 7, 1, REG_PIOCON0),
    adc_or_pwm(Port::P0, 3, 6, 5, REG_PIOCON0),
    adc_or_pwm(Port::P0, 4, 5, 3, REG_PIOCON1),
    adc(Port::P3, 0, 1),
    adc(Port::P0, 6, 3),
    adc_or_pwm(Port::P0, 5, 4, 2, REG_PIOCON1),
    adc(Port::P0, 7, 2),
    adc(Port::P1, 7, 0),
];

/// Look up a 1-based pin number
pub fn pin_info(pin: u8) -> Option<&'static PinInfo> {
    if pin == 0 {
        return None;
    }
    PINS.get(usize::from(pin - 1))
}
