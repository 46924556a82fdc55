//! Configuration management for Knob GW
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.
//! Every field has a default matching the knob breakout's stock wiring, so an
//! absent file is a valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::expander::pins::PIN_COUNT;
use crate::expander::registers::ENCODER_CHANNELS;
use crate::led::PALETTE;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub led: LedConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// I2C expander and host GPIO wiring
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HardwareConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,
    #[serde(default = "default_i2c_address")]
    pub address: u8,
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,
    /// Host GPIO line wired to the expander's INT output; `null` polls the
    /// expander's interrupt register instead
    #[serde(default = "default_interrupt_pin")]
    pub interrupt_pin: Option<u32>,
    #[serde(default = "default_encoder_channel")]
    pub encoder_channel: u8,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default = "default_pwm_period")]
    pub pwm_period: u16,
    #[serde(default = "default_pwm_divider")]
    pub pwm_divider: u8,
}

/// Expander pin assignment (1-based, as printed on the breakout)
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PinConfig {
    #[serde(default = "default_knob_a")]
    pub knob_a: u8,
    #[serde(default = "default_knob_b")]
    pub knob_b: u8,
    #[serde(default = "default_knob_c")]
    pub knob_c: Option<u8>,
    #[serde(default = "default_led_red")]
    pub red: u8,
    #[serde(default = "default_led_green")]
    pub green: u8,
    #[serde(default = "default_led_blue")]
    pub blue: u8,
}

/// What a knob turn does
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMode {
    /// Step the ALSA mixer directly
    Mixer,
    /// Publish volume increase/decrease messages on the assistant bus
    Bus,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VolumeConfig {
    #[serde(default = "default_volume_mode")]
    pub mode: VolumeMode,
    #[serde(default = "default_volume_step")]
    pub step: u8,
    #[serde(default = "default_card")]
    pub card: String,
    /// Force a mixer control, skipping the selection heuristic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    /// Ask the assistant to play its volume feedback sound (bus mode)
    #[serde(default = "default_true")]
    pub play_sound: bool,
}

/// Colour and intensity for one assistant state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LedStateConfig {
    pub colour: u8,
    /// Percent; values outside 0-100 are clamped, not rejected
    #[serde(default = "default_intensity")]
    pub intensity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LedConfig {
    #[serde(default = "default_idle_led")]
    pub idle: LedStateConfig,
    #[serde(default = "default_listen_led")]
    pub listen: LedStateConfig,
    #[serde(default = "default_think_led")]
    pub think: LedStateConfig,
}

/// Assistant message bus connection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bus_url")]
    pub url: String,
}

impl AppConfig {
    /// Load configuration from file with validation
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map
        let config: AppConfig = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let hw = &self.hardware;
        if hw.i2c_bus.is_empty() {
            anyhow::bail!("hardware.i2c_bus cannot be empty");
        }
        if hw.address > 0x7F {
            anyhow::bail!("hardware.address 0x{:02X} is not a 7-bit I2C address", hw.address);
        }
        if hw.encoder_channel == 0 || hw.encoder_channel > ENCODER_CHANNELS {
            anyhow::bail!(
                "hardware.encoder_channel {} is invalid (must be 1-{})",
                hw.encoder_channel,
                ENCODER_CHANNELS
            );
        }
        if !hw.pwm_divider.is_power_of_two() {
            anyhow::bail!(
                "hardware.pwm_divider {} is invalid (must be 1, 2, 4, ... 128)",
                hw.pwm_divider
            );
        }

        let pins = &hw.pins;
        let named = [
            ("knob_a", Some(pins.knob_a)),
            ("knob_b", Some(pins.knob_b)),
            ("knob_c", pins.knob_c),
            ("red", Some(pins.red)),
            ("green", Some(pins.green)),
            ("blue", Some(pins.blue)),
        ];
        for (name, pin) in named {
            if let Some(pin) = pin {
                if pin == 0 || pin > PIN_COUNT {
                    anyhow::bail!("hardware.pins.{} {} is invalid (must be 1-{})", name, pin, PIN_COUNT);
                }
            }
        }

        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        if self.volume.step == 0 || self.volume.step > 100 {
            anyhow::bail!("volume.step {} is invalid (must be 1-100)", self.volume.step);
        }
        if self.volume.mode == VolumeMode::Bus && !self.bus.enabled {
            anyhow::bail!("volume.mode 'bus' requires bus.enabled");
        }

        for (state, led) in [
            ("idle", &self.led.idle),
            ("listen", &self.led.listen),
            ("think", &self.led.think),
        ] {
            if usize::from(led.colour) >= PALETTE.len() {
                anyhow::bail!(
                    "led.{}.colour {} is invalid (must be 0-{})",
                    state,
                    led.colour,
                    PALETTE.len() - 1
                );
            }
        }

        if self.bus.enabled && self.bus.url.is_empty() {
            anyhow::bail!("bus.url cannot be empty when the bus is enabled");
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hardware: HardwareConfig::default(),
            poll_interval_ms: default_poll_interval(),
            volume: VolumeConfig::default(),
            led: LedConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            address: default_i2c_address(),
            gpio_chip: default_gpio_chip(),
            interrupt_pin: default_interrupt_pin(),
            encoder_channel: default_encoder_channel(),
            pins: PinConfig::default(),
            pwm_period: default_pwm_period(),
            pwm_divider: default_pwm_divider(),
        }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            knob_a: default_knob_a(),
            knob_b: default_knob_b(),
            knob_c: default_knob_c(),
            red: default_led_red(),
            green: default_led_green(),
            blue: default_led_blue(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            mode: default_volume_mode(),
            step: default_volume_step(),
            card: default_card(),
            control: None,
            play_sound: true,
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            idle: default_idle_led(),
            listen: default_listen_led(),
            think: default_think_led(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_bus_url(),
        }
    }
}

// Default value functions
fn default_poll_interval() -> u64 { 100 }
fn default_i2c_bus() -> String { "/dev/i2c-1".to_string() }
fn default_i2c_address() -> u8 { 0x0F }
fn default_gpio_chip() -> String { "/dev/gpiochip0".to_string() }
fn default_interrupt_pin() -> Option<u32> { Some(4) }
fn default_encoder_channel() -> u8 { 1 }
fn default_knob_a() -> u8 { 12 }
fn default_knob_b() -> u8 { 3 }
fn default_knob_c() -> Option<u8> { Some(11) }
fn default_led_red() -> u8 { 1 }
fn default_led_green() -> u8 { 7 }
fn default_led_blue() -> u8 { 2 }
fn default_pwm_period() -> u16 { 510 }
fn default_pwm_divider() -> u8 { 2 }
fn default_volume_mode() -> VolumeMode { VolumeMode::Mixer }
fn default_volume_step() -> u8 { 5 }
fn default_card() -> String { "default".to_string() }
fn default_true() -> bool { true }
fn default_intensity() -> i32 { 100 }
fn default_idle_led() -> LedStateConfig { LedStateConfig { colour: 1, intensity: 100 } }
fn default_listen_led() -> LedStateConfig { LedStateConfig { colour: 2, intensity: 100 } }
fn default_think_led() -> LedStateConfig { LedStateConfig { colour: 2, intensity: 100 } }
fn default_bus_url() -> String { "ws://127.0.0.1:8181/core".to_string() }
