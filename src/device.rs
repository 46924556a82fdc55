//! The RGB encoder breakout as a whole
//!
//! Wraps the expander with the knob's wiring: one encoder channel and three
//! inverted (common-anode) PWM channels for the LED.

use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use tracing::{debug, info};

use crate::config::{HardwareConfig, PinConfig};
use crate::expander::pins::PinMode;
use crate::expander::{Expander, ExpanderResult};

pub struct KnobDevice<I2C> {
    ioe: Expander<I2C>,
    channel: u8,
    pins: PinConfig,
    chip_id: u16,
}

impl<I2C: I2c> KnobDevice<I2C> {
    /// Bring the breakout up: interrupt output, encoder, LED PWM channels
    pub fn init(i2c: I2C, hw: &HardwareConfig) -> ExpanderResult<Self, I2C::Error> {
        let mut ioe = Expander::new(i2c, hw.address);
        let chip_id = ioe.verify_chip_id()?;
        debug!("Expander chip id 0x{:04X} at 0x{:02X}", chip_id, hw.address);

        let pins = hw.pins;
        ioe.enable_interrupt_out(true)?;
        ioe.setup_rotary_encoder(hw.encoder_channel, pins.knob_a, pins.knob_b, pins.knob_c)?;
        ioe.set_pwm_period(hw.pwm_period)?;
        ioe.set_pwm_control(hw.pwm_divider)?;
        for pin in [pins.red, pins.green, pins.blue] {
            ioe.set_mode(pin, PinMode::Pwm, false, true)?;
        }

        Ok(Self {
            ioe,
            channel: hw.encoder_channel,
            pins,
            chip_id,
        })
    }

    pub fn chip_id(&self) -> u16 {
        self.chip_id
    }

    pub fn version(&mut self) -> ExpanderResult<u8, I2C::Error> {
        self.ioe.version()
    }

    pub fn read_position(&mut self) -> ExpanderResult<i64, I2C::Error> {
        self.ioe.read_rotary_encoder(self.channel)
    }

    pub fn interrupt_triggered(&mut self) -> ExpanderResult<bool, I2C::Error> {
        self.ioe.interrupt_triggered()
    }

    pub fn clear_interrupt(&mut self) -> ExpanderResult<(), I2C::Error> {
        self.ioe.clear_interrupt()
    }

    /// Write red, green and blue duty values
    pub fn set_rgb(&mut self, [r, g, b]: [u16; 3]) -> ExpanderResult<(), I2C::Error> {
        self.ioe.output(self.pins.red, r)?;
        self.ioe.output(self.pins.green, g)?;
        self.ioe.output(self.pins.blue, b)
    }
}

/// Open the Linux I2C bus named in the config and initialise the knob on it
pub fn open(hw: &HardwareConfig) -> anyhow::Result<KnobDevice<I2cdev>> {
    use anyhow::Context;

    let i2c = I2cdev::new(&hw.i2c_bus)
        .with_context(|| format!("Failed to open I2C bus {}", hw.i2c_bus))?;
    let device = KnobDevice::init(i2c, hw).map_err(|e| {
        anyhow::anyhow!("Failed to initialise expander at 0x{:02X}: {}", hw.address, e)
    })?;
    info!(
        "Knob expander ready on {} at 0x{:02X} (chip id 0x{:04X})",
        hw.i2c_bus,
        hw.address,
        device.chip_id()
    );
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::registers::*;
    use crate::expander::testing::FakeBus;
    use crate::expander::ExpanderError;

    fn bus_with_chip() -> FakeBus {
        let bus = FakeBus::new();
        bus.set_reg(REG_CHIP_ID_L, 0x6A);
        bus.set_reg(REG_CHIP_ID_H, 0xE2);
        bus
    }

    #[test]
    fn test_init_configures_breakout() {
        let bus = bus_with_chip();
        let device = KnobDevice::init(bus.clone(), &HardwareConfig::default()).unwrap();

        assert_eq!(device.chip_id(), CHIP_ID);
        assert_eq!(bus.reg(REG_INT) & 0b110, 0b110);
        assert_eq!(bus.reg(REG_ENC_CFG[0]), 12 | (3 << 4));
        assert_eq!(bus.reg(REG_PWMPL), 0xFE);
        assert_eq!(bus.reg(REG_PWMPH), 0x01);
        assert_eq!(bus.reg(REG_PWMCON1), 0b001);
        // Inverted outputs on PWM channels 5, 1 and 2
        assert_eq!(bus.reg(REG_PNP), (1 << 5) | (1 << 1) | (1 << 2));
    }

    #[test]
    fn test_init_rejects_wrong_chip() {
        let bus = FakeBus::new();
        let result = KnobDevice::init(bus, &HardwareConfig::default());
        assert!(matches!(result, Err(ExpanderError::ChipId { .. })));
    }

    #[test]
    fn test_read_position_uses_configured_channel() {
        let bus = bus_with_chip();
        let hw = HardwareConfig {
            encoder_channel: 2,
            ..HardwareConfig::default()
        };
        let mut device = KnobDevice::init(bus.clone(), &hw).unwrap();
        bus.set_reg(REG_ENC_COUNT[1], 7);
        assert_eq!(device.read_position().unwrap(), 7);
    }
}
