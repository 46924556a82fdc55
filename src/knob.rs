//! Volume knob poll loop
//!
//! Every poll checks whether the expander raised an interrupt, reads the
//! encoder and turns the difference to the last reading into one volume step.

use embedded_hal::i2c::I2c;
use tracing::{debug, info};

use crate::config::VolumeMode;
use crate::device::KnobDevice;
use crate::interrupt::InterruptSource;
use crate::mixer::{VolumeControl, DEFAULT_VOLUME};

pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

pub fn direction(old_knob: i64, new_knob: i64) -> Option<Direction> {
    match new_knob.cmp(&old_knob) {
        std::cmp::Ordering::Greater => Some(Direction::Up),
        std::cmp::Ordering::Less => Some(Direction::Down),
        std::cmp::Ordering::Equal => None,
    }
}

/// New volume after a knob movement, or `None` when nothing changes
///
/// One step per poll regardless of how far the knob moved; the result stays
/// within 0-100.
pub fn step_volume(old_knob: i64, new_knob: i64, volume: u8, step: u8) -> Option<u8> {
    match direction(old_knob, new_knob)? {
        Direction::Up if volume < MAX_VOLUME => Some(volume.saturating_add(step).min(MAX_VOLUME)),
        Direction::Down if volume > 0 => Some(volume.saturating_sub(step)),
        _ => None,
    }
}

/// What a poll did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnobOutcome {
    /// Mixer mode: the volume was set to this percent
    VolumeSet(u8),
    /// Bus mode: the knob turned; the caller publishes the change
    Turned(Direction),
}

pub struct VolumeKnob<I2C, V> {
    device: KnobDevice<I2C>,
    interrupt: InterruptSource,
    volume: V,
    mode: VolumeMode,
    step: u8,
    position: i64,
}

impl<I2C: I2c, V: VolumeControl> VolumeKnob<I2C, V> {
    /// Take over an initialised device; the current count becomes the origin
    pub fn new(
        mut device: KnobDevice<I2C>,
        interrupt: InterruptSource,
        volume: V,
        mode: VolumeMode,
        step: u8,
    ) -> Result<Self, crate::expander::ExpanderError<I2C::Error>> {
        let position = device.read_position()?;
        Ok(Self {
            device,
            interrupt,
            volume,
            mode,
            step,
            position,
        })
    }

    pub fn device_mut(&mut self) -> &mut KnobDevice<I2C> {
        &mut self.device
    }

    pub fn volume_mut(&mut self) -> &mut V {
        &mut self.volume
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn set_mode(&mut self, mode: VolumeMode, step: u8) {
        self.mode = mode;
        self.step = step;
    }

    /// One tick of the poll loop
    pub fn poll(&mut self) -> Option<KnobOutcome> {
        if !self.interrupt.pending(&mut self.device) {
            return None;
        }
        debug!("Detected knob interrupt");

        if let Err(e) = self.device.clear_interrupt() {
            info!("Error while trying to clear knob interrupt: {}", e);
        }

        let new_knob = match self.device.read_position() {
            Ok(value) => value,
            Err(e) => {
                info!("Error while trying to read knob value: {}", e);
                return None;
            }
        };
        debug!("Knob values: new = {}, old = {}", new_knob, self.position);

        let old_knob = self.position;

        match self.mode {
            VolumeMode::Bus => {
                self.position = new_knob;
                direction(old_knob, new_knob).map(KnobOutcome::Turned)
            }
            VolumeMode::Mixer => {
                // Without a mixer the volume is assumed; a failed read aborts the tick
                let current = match self.volume.volume() {
                    Ok(volume) => volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME),
                    Err(e) => {
                        info!("Error while trying to read volume: {:#}", e);
                        return None;
                    }
                };
                debug!("Volume level read as {}", current);

                let Some(target) = step_volume(old_knob, new_knob, current, self.step) else {
                    self.position = new_knob;
                    return None;
                };
                if let Err(e) = self.volume.set_volume(target) {
                    info!("Error while trying to set volume: {:#}", e);
                    return None;
                }
                self.position = new_knob;
                info!("Volume set to {}", target);
                Some(KnobOutcome::VolumeSet(target))
            }
        }
    }
}
