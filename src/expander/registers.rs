//! Register map of the MS51-based I/O expander firmware.
//!
//! The firmware exposes the MCU's SFRs over I2C with a few remaps for page-1
//! registers that would otherwise collide. Port registers (P0..P3) use a
//! bit-addressing scheme so single pins can be changed without touching the
//! I2C pins that share the port.

/// Expected value of the chip id registers
pub const CHIP_ID: u16 = 0xE26A;

pub const REG_CHIP_ID_L: u8 = 0xFA;
pub const REG_CHIP_ID_H: u8 = 0xFB;
pub const REG_VERSION: u8 = 0xFC;

// Rotary encoders
pub const REG_ENC_EN: u8 = 0x04;
pub const REG_ENC_CFG: [u8; 4] = [0x05, 0x07, 0x09, 0x0B];
pub const REG_ENC_COUNT: [u8; 4] = [0x06, 0x08, 0x0A, 0x0C];

// Interrupt control
pub const REG_INT: u8 = 0xF9;
pub const BIT_INT_TRIGD: u8 = 0;
pub const BIT_INT_OUT_EN: u8 = 1;
pub const BIT_INT_PIN_SWAP: u8 = 2;

// Bit-addressed port registers
pub const REG_P0: u8 = 0x40;
pub const REG_P1: u8 = 0x50;
pub const REG_P2: u8 = 0x60;
pub const REG_P3: u8 = 0x70;

/// Registers that accept `0b1000 | bit` (set) and `bit` (clear) writes
pub const BIT_ADDRESSED_REGS: [u8; 4] = [REG_P0, REG_P1, REG_P2, REG_P3];

// Port mode registers
pub const REG_P0M1: u8 = 0x71;
pub const REG_P0M2: u8 = 0x72;
pub const REG_P1M1: u8 = 0x73;
pub const REG_P1M2: u8 = 0x74;
pub const REG_P3M1: u8 = 0x6C;
pub const REG_P3M2: u8 = 0x6D;

// Schmitt trigger selection (page 1, remapped)
pub const REG_P3S: u8 = 0xC0;
pub const REG_P0S: u8 = 0xC2;
pub const REG_P1S: u8 = 0xC4;

// PWM
pub const REG_PWMPH: u8 = 0x91;
pub const REG_PWMPL: u8 = 0x99;
pub const REG_PNP: u8 = 0x96;
pub const REG_PWMCON0: u8 = 0x98;
pub const REG_PWMCON1: u8 = 0x9F;
pub const REG_PIOCON0: u8 = 0x9E;
pub const REG_PIOCON1: u8 = 0xC9;

pub const BIT_PWMCON0_LOAD: u8 = 6;
pub const BIT_PWMCON0_RUN: u8 = 7;

/// Duty-cycle registers per PWM channel, low byte
pub const REG_PWML: [u8; 6] = [0x9A, 0x9B, 0x9C, 0x9D, 0xCB, 0xCC];
/// Duty-cycle registers per PWM channel, high byte
pub const REG_PWMH: [u8; 6] = [0x92, 0x93, 0x94, 0x95, 0xC7, 0xC8];

/// Number of encoder channels handled by the firmware
pub const ENCODER_CHANNELS: u8 = 4;
