//! Knob interrupt detection
//!
//! The expander pulls its INT line low when the encoder moves. Normally that
//! line is wired to a host GPIO and watched for falling edges; without one the
//! expander's interrupt register is polled instead.

use anyhow::{Context, Result};
use embedded_hal::i2c::I2c;
use gpio_cdev::{AsyncLineEventHandle, Chip, EventRequestFlags, EventType, LineRequestFlags};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, trace, warn};

use crate::device::KnobDevice;

const CONSUMER: &str = "knob-gw";

/// Falling-edge watcher on a host GPIO line
///
/// Edges are latched until `take` is called, so a poll sees every turn that
/// happened since the previous poll exactly once.
pub struct GpioInterrupt {
    pending: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl GpioInterrupt {
    /// Request `line` on `chip_path` for falling-edge events
    ///
    /// The line must already be pulled up; the knob breakout provides one.
    pub fn open(chip_path: &str, line: u32) -> Result<Self> {
        let mut chip =
            Chip::new(chip_path).with_context(|| format!("Failed to open GPIO chip {}", chip_path))?;
        let handle = chip
            .get_line(line)
            .with_context(|| format!("Failed to get GPIO line {}", line))?
            .events(
                LineRequestFlags::INPUT,
                EventRequestFlags::FALLING_EDGE,
                CONSUMER,
            )
            .with_context(|| format!("Failed to request edge events on GPIO line {}", line))?;
        let mut events = AsyncLineEventHandle::new(handle)
            .context("Failed to register GPIO line with the runtime")?;

        let pending = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&pending);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) if matches!(event.event_type(), EventType::FallingEdge) => {
                        trace!("Knob interrupt edge at {}ns", event.timestamp());
                        flag.store(true, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("GPIO interrupt read failed: {}", e);
                    }
                }
            }
            warn!("GPIO interrupt stream closed");
        });

        info!("Watching {} line {} for knob interrupts", chip_path, line);
        Ok(Self {
            pending,
            task: Some(task),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_flag(pending: Arc<AtomicBool>) -> Self {
        Self {
            pending,
            task: None,
        }
    }

    /// Whether an edge arrived since the last call
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Drop for GpioInterrupt {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Where the poll loop learns that the knob moved
pub enum InterruptSource {
    Gpio(GpioInterrupt),
    /// Read the expander's TRIGD flag over I2C every poll
    Register,
}

impl InterruptSource {
    pub fn pending<I2C: I2c>(&mut self, device: &mut KnobDevice<I2C>) -> bool {
        match self {
            InterruptSource::Gpio(gpio) => gpio.take(),
            InterruptSource::Register => match device.interrupt_triggered() {
                Ok(triggered) => triggered,
                Err(e) => {
                    debug!("Failed to read interrupt register: {}", e);
                    false
                }
            },
        }
    }
}
