//! Main daemon loop
//!
//! Owns the knob hardware and drives it from a single task: the poll
//! interval, assistant bus events, config reloads and shutdown are all
//! handled in one `select!`.

use anyhow::Result;
use embedded_hal::i2c::I2c;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::{BusClient, BusEvent, BusHandle, Message};
use crate::config::{AppConfig, BusConfig, ConfigWatcher, HardwareConfig};
use crate::device;
use crate::interrupt::{GpioInterrupt, InterruptSource};
use crate::knob::{KnobOutcome, VolumeKnob};
use crate::led::{LedSettings, StatusLed};
use crate::mixer::MixerHandle;

/// Run until `shutdown` resolves
///
/// Hardware that cannot be initialised disables the knob: the failure is
/// logged and this returns `Ok`.
pub async fn run(
    config: AppConfig,
    watcher: Option<ConfigWatcher>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let device = match device::open(&config.hardware) {
        Ok(device) => device,
        Err(e) => {
            warn!("Can't initialize knob hardware - volume knob disabled: {:#}", e);
            return Ok(());
        }
    };

    let interrupt = interrupt_source(&config.hardware);
    let mixer = MixerHandle::new(config.volume.card.clone(), config.volume.control.clone());
    let knob = match VolumeKnob::new(device, interrupt, mixer, config.volume.mode, config.volume.step)
    {
        Ok(knob) => knob,
        Err(e) => {
            warn!("Can't read knob position - volume knob disabled: {}", e);
            return Ok(());
        }
    };

    let bus = spawn_bus(&config.bus);
    let mut daemon = Daemon::new(config, knob, bus);
    daemon.run(watcher, shutdown).await;
    Ok(())
}

fn interrupt_source(hw: &HardwareConfig) -> InterruptSource {
    match hw.interrupt_pin {
        Some(line) => match GpioInterrupt::open(&hw.gpio_chip, line) {
            Ok(gpio) => InterruptSource::Gpio(gpio),
            Err(e) => {
                warn!("{:#}; polling the expander interrupt register instead", e);
                InterruptSource::Register
            }
        },
        None => {
            info!("No interrupt line configured, polling the expander interrupt register");
            InterruptSource::Register
        }
    }
}

fn spawn_bus(cfg: &BusConfig) -> Option<BusHandle> {
    if !cfg.enabled {
        info!("Message bus disabled, LED stays idle");
        return None;
    }
    info!("🔌 Connecting to message bus at {}", cfg.url);
    Some(BusClient::spawn(cfg.url.clone()))
}

fn poll_interval(ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_bus_event(bus: &mut Option<BusHandle>) -> Option<BusEvent> {
    match bus {
        Some(bus) => bus.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

struct Daemon<I2C> {
    config: AppConfig,
    knob: VolumeKnob<I2C, MixerHandle>,
    led: StatusLed,
    bus: Option<BusHandle>,
    ticker: Interval,
}

impl<I2C: I2c> Daemon<I2C> {
    fn new(config: AppConfig, mut knob: VolumeKnob<I2C, MixerHandle>, bus: Option<BusHandle>) -> Self {
        let mut led = StatusLed::new(LedSettings::from_config(&config.led));
        led.idle(knob.device_mut());
        let ticker = poll_interval(config.poll_interval_ms);
        Self {
            config,
            knob,
            led,
            bus,
            ticker,
        }
    }

    async fn run(&mut self, mut watcher: Option<ConfigWatcher>, shutdown: impl Future<Output = ()>) {
        info!("🎛️  Volume knob ready");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = self.ticker.tick() => self.poll(),

                event = next_bus_event(&mut self.bus) => match event {
                    Some(event) => self.on_bus_event(event),
                    None => {
                        warn!("Message bus client stopped");
                        self.bus = None;
                    }
                },

                reloaded = next_config(&mut watcher) => match reloaded {
                    Some(new_config) => {
                        info!("📝 Configuration file changed, reloading...");
                        self.apply_config(new_config).await;
                        info!("✅ Configuration reloaded");
                    }
                    None => {
                        warn!("Config watcher closed, hot reload disabled");
                        watcher = None;
                    }
                },

                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping knob loop");
                    break;
                }
            }
        }

        if let Some(bus) = self.bus.take() {
            bus.shutdown().await;
        }
    }

    fn poll(&mut self) {
        match self.knob.poll() {
            Some(KnobOutcome::Turned(direction)) => match &self.bus {
                Some(bus) => {
                    debug!("📤 Requesting volume {:?}", direction);
                    bus.publish(Message::volume_change(direction, self.config.volume.play_sound));
                }
                None => debug!("Knob turned {:?} with no message bus", direction),
            },
            Some(KnobOutcome::VolumeSet(_)) | None => {}
        }
    }

    fn on_bus_event(&mut self, event: BusEvent) {
        self.led.show(self.knob.device_mut(), event.led_state());
    }

    async fn apply_config(&mut self, new: AppConfig) {
        if new.hardware != self.config.hardware {
            warn!("⚠️  Hardware settings changed; restart knob-gw to apply them");
        }

        self.led.update_settings(LedSettings::from_config(&new.led));
        self.led.idle(self.knob.device_mut());

        self.knob.set_mode(new.volume.mode, new.volume.step);
        if new.volume.card != self.config.volume.card || new.volume.control != self.config.volume.control
        {
            info!("Mixer selection changed, looking up card '{}' again", new.volume.card);
            self.knob
                .volume_mut()
                .reset(new.volume.card.clone(), new.volume.control.clone());
        }

        if new.poll_interval_ms != self.config.poll_interval_ms {
            debug!("Poll interval now {}ms", new.poll_interval_ms);
            self.ticker = poll_interval(new.poll_interval_ms);
        }

        if new.bus != self.config.bus {
            if let Some(bus) = self.bus.take() {
                bus.shutdown().await;
            }
            self.bus = spawn_bus(&new.bus);
        }

        self.config = new;
    }
}
