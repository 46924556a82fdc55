//! Knob GW - volume knob and status LED daemon
//!
//! Drives an I2C RGB rotary-encoder breakout on a voice-assistant device:
//! turning the knob steps the ALSA volume (or asks the assistant to), and the
//! LED follows the assistant's listen/think/idle state from its message bus.

pub mod app;
pub mod bus;
pub mod config;
pub mod device;
pub mod expander;
pub mod interrupt;
pub mod knob;
pub mod led;
pub mod mixer;
pub mod paths;
