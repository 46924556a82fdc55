//! Driver for the MS51-based I2C I/O expander
//!
//! Covers the subset of the firmware the knob breakout needs: pin modes,
//! PWM outputs, the rotary encoder decoder and the interrupt output.

pub mod pins;
pub mod registers;

#[cfg(test)]
pub(crate) mod testing;

use embedded_hal::i2c::I2c;
use thiserror::Error;

use pins::{pin_info, PinMode, PIN_COUNT};
use registers::*;

/// Maximum reads of PWMCON0 while waiting for a PWM load to latch
const PWM_LOAD_ATTEMPTS: usize = 100;

/// Errors raised by the expander driver
#[derive(Debug, Error)]
pub enum ExpanderError<E> {
    #[error("I2C bus error: {0:?}")]
    Bus(E),

    #[error("unexpected chip id 0x{found:04X} (expected 0x{expected:04X})")]
    ChipId { found: u16, expected: u16 },

    #[error("invalid pin {0} (expected 1-{max})", max = PIN_COUNT)]
    InvalidPin(u8),

    #[error("pin {pin} does not support {mode:?} mode")]
    UnsupportedMode { pin: u8, mode: PinMode },

    #[error("invalid encoder channel {0} (expected 1-{max})", max = ENCODER_CHANNELS)]
    InvalidChannel(u8),

    #[error("invalid PWM divider {0} (expected a power of two up to 128)")]
    InvalidDivider(u8),

    #[error("timed out waiting for PWM load")]
    Timeout,
}

pub type ExpanderResult<T, E> = Result<T, ExpanderError<E>>;

/// I/O expander on an I2C bus
pub struct Expander<I2C> {
    i2c: I2C,
    address: u8,
    /// Last mode applied to each pin, so repeated `set_mode` calls are free
    modes: [Option<PinMode>; PIN_COUNT as usize],
    /// Last raw (signed 8-bit) count per encoder channel
    encoder_last: [i64; ENCODER_CHANNELS as usize],
    /// Accumulated wrap-around offset per encoder channel
    encoder_offset: [i64; ENCODER_CHANNELS as usize],
}

impl<I2C: I2c> Expander<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            modes: [None; PIN_COUNT as usize],
            encoder_last: [0; ENCODER_CHANNELS as usize],
            encoder_offset: [0; ENCODER_CHANNELS as usize],
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn read8(&mut self, reg: u8) -> ExpanderResult<u8, I2C::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(ExpanderError::Bus)?;
        Ok(buf[0])
    }

    fn write8(&mut self, reg: u8, value: u8) -> ExpanderResult<(), I2C::Error> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(ExpanderError::Bus)
    }

    /// Read the 16-bit chip id
    pub fn chip_id(&mut self) -> ExpanderResult<u16, I2C::Error> {
        let low = self.read8(REG_CHIP_ID_L)?;
        let high = self.read8(REG_CHIP_ID_H)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Fail unless the device answers with the expected chip id
    pub fn verify_chip_id(&mut self) -> ExpanderResult<u16, I2C::Error> {
        let found = self.chip_id()?;
        if found != CHIP_ID {
            return Err(ExpanderError::ChipId {
                found,
                expected: CHIP_ID,
            });
        }
        Ok(found)
    }

    /// Firmware version byte
    pub fn version(&mut self) -> ExpanderResult<u8, I2C::Error> {
        self.read8(REG_VERSION)
    }

    pub fn set_bit(&mut self, reg: u8, bit: u8) -> ExpanderResult<(), I2C::Error> {
        if BIT_ADDRESSED_REGS.contains(&reg) {
            return self.write8(reg, 0b1000 | (bit & 0b111));
        }
        let value = self.read8(reg)?;
        self.write8(reg, value | (1 << bit))
    }

    pub fn clr_bit(&mut self, reg: u8, bit: u8) -> ExpanderResult<(), I2C::Error> {
        if BIT_ADDRESSED_REGS.contains(&reg) {
            return self.write8(reg, bit & 0b111);
        }
        let value = self.read8(reg)?;
        self.write8(reg, value & !(1 << bit))
    }

    pub fn change_bit(&mut self, reg: u8, bit: u8, state: bool) -> ExpanderResult<(), I2C::Error> {
        if state {
            self.set_bit(reg, bit)
        } else {
            self.clr_bit(reg, bit)
        }
    }

    pub fn get_bit(&mut self, reg: u8, bit: u8) -> ExpanderResult<bool, I2C::Error> {
        Ok(self.read8(reg)? & (1 << bit) != 0)
    }

    /// Route the interrupt flag to the INT pin
    ///
    /// With `pin_swap` the output moves from P1.3 to P0.0, which is where the
    /// knob breakout wires its INT line.
    pub fn enable_interrupt_out(&mut self, pin_swap: bool) -> ExpanderResult<(), I2C::Error> {
        self.set_bit(REG_INT, BIT_INT_OUT_EN)?;
        self.change_bit(REG_INT, BIT_INT_PIN_SWAP, pin_swap)
    }

    pub fn disable_interrupt_out(&mut self) -> ExpanderResult<(), I2C::Error> {
        self.clr_bit(REG_INT, BIT_INT_OUT_EN)
    }

    pub fn interrupt_triggered(&mut self) -> ExpanderResult<bool, I2C::Error> {
        self.get_bit(REG_INT, BIT_INT_TRIGD)
    }

    pub fn clear_interrupt(&mut self) -> ExpanderResult<(), I2C::Error> {
        self.clr_bit(REG_INT, BIT_INT_TRIGD)
    }

    /// Configure a pin's function
    pub fn set_mode(
        &mut self,
        pin: u8,
        mode: PinMode,
        schmitt_trigger: bool,
        invert: bool,
    ) -> ExpanderResult<(), I2C::Error> {
        let info = *pin_info(pin).ok_or(ExpanderError::InvalidPin(pin))?;
        if !info.supports(mode) {
            return Err(ExpanderError::UnsupportedMode { pin, mode });
        }

        let idx = usize::from(pin - 1);
        if self.modes[idx] == Some(mode) {
            return Ok(());
        }

        match (mode, info.pwm) {
            (PinMode::Pwm, Some(route)) => {
                self.set_bit(route.reg_iopwm, route.channel)?;
                self.change_bit(REG_PNP, route.channel, invert)?;
                self.set_bit(REG_PWMCON0, BIT_PWMCON0_RUN)?;
            }
            (_, Some(route)) => {
                self.clr_bit(route.reg_iopwm, route.channel)?;
            }
            _ => {}
        }

        let port = info.port;
        let gpio_mode = mode.gpio_mode();
        let mut pm1 = self.read8(port.reg_m1())?;
        let mut pm2 = self.read8(port.reg_m2())?;
        pm1 &= !(1 << info.bit);
        pm2 &= !(1 << info.bit);
        pm1 |= (gpio_mode >> 1) << info.bit;
        pm2 |= (gpio_mode & 0b1) << info.bit;
        self.write8(port.reg_m1(), pm1)?;
        self.write8(port.reg_m2(), pm2)?;

        if matches!(mode, PinMode::PullUp | PinMode::Input) {
            self.change_bit(port.reg_ps(), info.bit, schmitt_trigger)?;
        }

        self.write8(port.reg_p(), (mode.initial_state() << 3) | info.bit)?;
        self.modes[idx] = Some(mode);
        Ok(())
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        pin.checked_sub(1)
            .and_then(|idx| self.modes.get(usize::from(idx)).copied().flatten())
    }

    fn channel_index(channel: u8) -> ExpanderResult<usize, I2C::Error> {
        if channel == 0 || channel > ENCODER_CHANNELS {
            return Err(ExpanderError::InvalidChannel(channel));
        }
        Ok(usize::from(channel - 1))
    }

    /// Set up a rotary encoder decoder on `channel` (1-4)
    ///
    /// `pin_c` is the encoder's common pin; it is driven low when given.
    pub fn setup_rotary_encoder(
        &mut self,
        channel: u8,
        pin_a: u8,
        pin_b: u8,
        pin_c: Option<u8>,
    ) -> ExpanderResult<(), I2C::Error> {
        let idx = Self::channel_index(channel)?;
        self.set_mode(pin_a, PinMode::PullUp, true, false)?;
        self.set_mode(pin_b, PinMode::PullUp, true, false)?;
        if let Some(pin_c) = pin_c {
            self.set_mode(pin_c, PinMode::OpenDrain, false, false)?;
            self.output(pin_c, 0)?;
        }

        self.write8(REG_ENC_CFG[idx], pin_a | (pin_b << 4))?;
        let enable_bit = (channel - 1) * 2;
        self.clr_bit(REG_ENC_EN, enable_bit + 1)?;
        self.set_bit(REG_ENC_EN, enable_bit)?;

        self.write8(REG_ENC_COUNT[idx], 0x00)?;
        self.encoder_last[idx] = 0;
        self.encoder_offset[idx] = 0;
        Ok(())
    }

    /// Read an encoder count, extended past the chip's signed 8-bit counter
    pub fn read_rotary_encoder(&mut self, channel: u8) -> ExpanderResult<i64, I2C::Error> {
        let idx = Self::channel_index(channel)?;
        let raw = i64::from(self.read8(REG_ENC_COUNT[idx])? as i8);
        let last = self.encoder_last[idx];

        if last > 64 && raw < -64 {
            self.encoder_offset[idx] += 256;
        } else if last < -64 && raw > 64 {
            self.encoder_offset[idx] -= 256;
        }
        self.encoder_last[idx] = raw;

        Ok(self.encoder_offset[idx] + raw)
    }

    pub fn set_pwm_period(&mut self, period: u16) -> ExpanderResult<(), I2C::Error> {
        let [low, high] = period.to_le_bytes();
        self.write8(REG_PWMPL, low)?;
        self.write8(REG_PWMPH, high)?;
        self.pwm_load()
    }

    /// Set the PWM clock divider (1, 2, 4, ... 128)
    pub fn set_pwm_control(&mut self, divider: u8) -> ExpanderResult<(), I2C::Error> {
        if !divider.is_power_of_two() {
            return Err(ExpanderError::InvalidDivider(divider));
        }
        // 128 is the largest u8 power of two, so this is always 0..=7
        let bits = divider.trailing_zeros() as u8;
        self.write8(REG_PWMCON1, bits)
    }

    /// Latch new PWM period/duty values
    pub fn pwm_load(&mut self) -> ExpanderResult<(), I2C::Error> {
        self.set_bit(REG_PWMCON0, BIT_PWMCON0_LOAD)?;
        for _ in 0..PWM_LOAD_ATTEMPTS {
            if !self.get_bit(REG_PWMCON0, BIT_PWMCON0_LOAD)? {
                return Ok(());
            }
        }
        Err(ExpanderError::Timeout)
    }

    /// Drive a pin: duty cycle for PWM pins, low/high for GPIO pins
    pub fn output(&mut self, pin: u8, value: u16) -> ExpanderResult<(), I2C::Error> {
        let info = *pin_info(pin).ok_or(ExpanderError::InvalidPin(pin))?;

        if self.mode(pin) == Some(PinMode::Pwm) {
            let route = info.pwm.ok_or(ExpanderError::UnsupportedMode {
                pin,
                mode: PinMode::Pwm,
            })?;
            let [low, high] = value.to_le_bytes();
            let ch = usize::from(route.channel);
            self.write8(REG_PWML[ch], low)?;
            self.write8(REG_PWMH[ch], high)?;
            return self.pwm_load();
        }

        let reg = info.port.reg_p();
        if value == 0 {
            self.clr_bit(reg, info.bit)
        } else {
            self.set_bit(reg, info.bit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeBus;
    use super::*;

    fn expander() -> (Expander<FakeBus>, FakeBus) {
        let bus = FakeBus::new();
        (Expander::new(bus.clone(), 0x0F), bus)
    }

    #[test]
    fn test_chip_id() {
        let (mut ioe, bus) = expander();
        bus.set_reg(REG_CHIP_ID_L, 0x6A);
        bus.set_reg(REG_CHIP_ID_H, 0xE2);
        assert_eq!(ioe.verify_chip_id().unwrap(), CHIP_ID);

        bus.set_reg(REG_CHIP_ID_H, 0x00);
        assert!(matches!(
            ioe.verify_chip_id(),
            Err(ExpanderError::ChipId { found: 0x006A, .. })
        ));
    }

    #[test]
    fn test_bit_addressed_port_writes() {
        let (mut ioe, bus) = expander();
        ioe.set_bit(REG_P1, 5).unwrap();
        ioe.clr_bit(REG_P1, 5).unwrap();
        assert_eq!(bus.writes_to(REG_P1), vec![0b1101, 0b0101]);
    }

    #[test]
    fn test_interrupt_flag() {
        let (mut ioe, bus) = expander();
        ioe.enable_interrupt_out(true).unwrap();
        assert_eq!(bus.reg(REG_INT), 0b110);

        bus.set_reg(REG_INT, bus.reg(REG_INT) | 1);
        assert!(ioe.interrupt_triggered().unwrap());
        ioe.clear_interrupt().unwrap();
        assert!(!ioe.interrupt_triggered().unwrap());
        assert_eq!(bus.reg(REG_INT), 0b110);
    }

    #[test]
    fn test_pwm_mode_sets_routing_and_polarity() {
        let (mut ioe, bus) = expander();
        // Pin 1 is P1.5 on PWM channel 5 via PIOCON1
        ioe.set_mode(1, PinMode::Pwm, false, true).unwrap();

        assert_eq!(bus.reg(REG_PIOCON1) & (1 << 5), 1 << 5);
        assert_eq!(bus.reg(REG_PNP) & (1 << 5), 1 << 5);
        assert_ne!(bus.reg(REG_PWMCON0) & (1 << BIT_PWMCON0_RUN), 0);
        // Push-pull: M1 bit clear, M2 bit set
        assert_eq!(bus.reg(REG_P1M1) & (1 << 5), 0);
        assert_eq!(bus.reg(REG_P1M2) & (1 << 5), 1 << 5);
        assert_eq!(ioe.mode(1), Some(PinMode::Pwm));
    }

    #[test]
    fn test_set_mode_is_cached() {
        let (mut ioe, bus) = expander();
        ioe.set_mode(2, PinMode::Pwm, false, true).unwrap();
        let before = bus.write_count();
        ioe.set_mode(2, PinMode::Pwm, false, true).unwrap();
        assert_eq!(bus.write_count(), before);
    }

    #[test]
    fn test_unsupported_mode_and_pin() {
        let (mut ioe, _bus) = expander();
        assert!(matches!(
            ioe.set_mode(11, PinMode::Pwm, false, false),
            Err(ExpanderError::UnsupportedMode { pin: 11, .. })
        ));
        assert!(matches!(
            ioe.set_mode(15, PinMode::Io, false, false),
            Err(ExpanderError::InvalidPin(15))
        ));
    }

    #[test]
    fn test_pwm_output_writes_duty_and_loads() {
        let (mut ioe, bus) = expander();
        ioe.set_mode(7, PinMode::Pwm, false, true).unwrap();
        ioe.output(7, 0x01FE).unwrap();
        // Pin 7 uses PWM channel 1
        assert_eq!(bus.reg(REG_PWML[1]), 0xFE);
        assert_eq!(bus.reg(REG_PWMH[1]), 0x01);
        assert!(bus.writes_to(REG_PWMCON0).len() >= 2);
    }

    #[test]
    fn test_pwm_load_timeout() {
        let (mut ioe, bus) = expander();
        bus.stick_pwm_load(true);
        assert!(matches!(ioe.pwm_load(), Err(ExpanderError::Timeout)));
    }

    #[test]
    fn test_pwm_period_and_divider() {
        let (mut ioe, bus) = expander();
        ioe.set_pwm_period(510).unwrap();
        assert_eq!(bus.reg(REG_PWMPL), 0xFE);
        assert_eq!(bus.reg(REG_PWMPH), 0x01);

        ioe.set_pwm_control(2).unwrap();
        assert_eq!(bus.reg(REG_PWMCON1), 0b001);
        ioe.set_pwm_control(128).unwrap();
        assert_eq!(bus.reg(REG_PWMCON1), 0b111);
        assert!(matches!(
            ioe.set_pwm_control(3),
            Err(ExpanderError::InvalidDivider(3))
        ));
    }

    #[test]
    fn test_setup_rotary_encoder() {
        let (mut ioe, bus) = expander();
        bus.set_reg(REG_ENC_COUNT[0], 0x22);
        ioe.setup_rotary_encoder(1, 12, 3, Some(11)).unwrap();

        assert_eq!(bus.reg(REG_ENC_CFG[0]), 12 | (3 << 4));
        assert_eq!(bus.reg(REG_ENC_EN) & 0b11, 0b01);
        assert_eq!(bus.reg(REG_ENC_COUNT[0]), 0);
        assert_eq!(ioe.mode(12), Some(PinMode::PullUp));
        assert_eq!(ioe.mode(11), Some(PinMode::OpenDrain));
        assert!(matches!(
            ioe.setup_rotary_encoder(5, 12, 3, None),
            Err(ExpanderError::InvalidChannel(5))
        ));
    }

    #[test]
    fn test_encoder_wraps_forward_and_back() {
        let (mut ioe, bus) = expander();
        ioe.setup_rotary_encoder(1, 12, 3, None).unwrap();

        bus.set_reg(REG_ENC_COUNT[0], 120);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), 120);

        // 130 reads back as -126 on the 8-bit counter
        bus.set_reg(REG_ENC_COUNT[0], 130u8);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), 130);

        bus.set_reg(REG_ENC_COUNT[0], 100);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), 100);
    }

    #[test]
    fn test_encoder_negative_counts() {
        let (mut ioe, bus) = expander();
        ioe.setup_rotary_encoder(1, 12, 3, None).unwrap();

        bus.set_reg(REG_ENC_COUNT[0], (-3i8) as u8);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), -3);

        bus.set_reg(REG_ENC_COUNT[0], (-100i8) as u8);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), -100);

        // Past -128 the counter wraps to positive values
        bus.set_reg(REG_ENC_COUNT[0], 100);
        assert_eq!(ioe.read_rotary_encoder(1).unwrap(), -156);
    }

    #[test]
    fn test_bus_error_propagates() {
        let (mut ioe, bus) = expander();
        bus.fail(true);
        assert!(matches!(ioe.chip_id(), Err(ExpanderError::Bus(_))));
    }
}
