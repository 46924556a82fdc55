//! RGB status LED on the knob
//!
//! Shows the assistant state (idle, listening, thinking) as one of eight
//! palette colours at a configurable intensity.

use embedded_hal::i2c::I2c;
use std::fmt;
use tracing::info;

use crate::config::{LedConfig, LedStateConfig};
use crate::device::KnobDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Per-channel PWM duty at `intensity` percent
    pub fn scaled(self, intensity: u8) -> [u16; 3] {
        let scale = |c: u8| u16::from(c) * u16::from(intensity.min(100)) / 100;
        [scale(self.r), scale(self.g), scale(self.b)]
    }
}

/// Selectable colours, indexed from settings
pub const PALETTE: [Rgb; 8] = [
    Rgb::new(255, 0, 0),     // red
    Rgb::new(0, 255, 0),     // green
    Rgb::new(255, 255, 0),   // yellow
    Rgb::new(0, 0, 255),     // blue
    Rgb::new(255, 0, 255),   // magenta
    Rgb::new(0, 255, 255),   // cyan
    Rgb::new(255, 255, 255), // white
    Rgb::new(0, 0, 0),       // off
];

/// Assistant state reflected on the LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Idle,
    Listen,
    Think,
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedState::Idle => write!(f, "IDLE"),
            LedState::Listen => write!(f, "LISTEN"),
            LedState::Think => write!(f, "THINK"),
        }
    }
}

pub fn clamp_intensity(intensity: i32) -> u8 {
    intensity.clamp(0, 100) as u8
}

/// Resolved colour and intensity for one state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedLook {
    pub colour: Rgb,
    pub intensity: u8,
}

impl LedLook {
    fn from_config(cfg: &LedStateConfig) -> Self {
        let colour = PALETTE
            .get(usize::from(cfg.colour))
            .copied()
            .unwrap_or(PALETTE[PALETTE.len() - 1]);
        Self {
            colour,
            intensity: clamp_intensity(cfg.intensity),
        }
    }

    pub fn duty(&self) -> [u16; 3] {
        self.colour.scaled(self.intensity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedSettings {
    pub idle: LedLook,
    pub listen: LedLook,
    pub think: LedLook,
}

impl LedSettings {
    pub fn from_config(cfg: &LedConfig) -> Self {
        Self {
            idle: LedLook::from_config(&cfg.idle),
            listen: LedLook::from_config(&cfg.listen),
            think: LedLook::from_config(&cfg.think),
        }
    }

    pub fn look(&self, state: LedState) -> LedLook {
        match state {
            LedState::Idle => self.idle,
            LedState::Listen => self.listen,
            LedState::Think => self.think,
        }
    }
}

/// Tracks the shown state and pushes colours to the device
pub struct StatusLed {
    settings: LedSettings,
    state: LedState,
}

impl StatusLed {
    pub fn new(settings: LedSettings) -> Self {
        Self {
            settings,
            state: LedState::Idle,
        }
    }

    pub fn state(&self) -> LedState {
        self.state
    }

    pub fn update_settings(&mut self, settings: LedSettings) {
        self.settings = settings;
    }

    /// Switch to `state`; write failures are logged and dropped
    pub fn show<I2C: I2c>(&mut self, device: &mut KnobDevice<I2C>, state: LedState) {
        info!("Change LED to {} colour", state);
        self.state = state;
        let duty = self.settings.look(state).duty();
        if let Err(e) = device.set_rgb(duty) {
            info!("Error while trying to update knob colours: {}", e);
        }
    }

    pub fn idle<I2C: I2c>(&mut self, device: &mut KnobDevice<I2C>) {
        self.show(device, LedState::Idle);
    }

    pub fn listen<I2C: I2c>(&mut self, device: &mut KnobDevice<I2C>) {
        self.show(device, LedState::Listen);
    }

    pub fn think<I2C: I2c>(&mut self, device: &mut KnobDevice<I2C>) {
        self.show(device, LedState::Think);
    }
}
