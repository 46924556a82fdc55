//! ALSA mixer lookup and volume control
//!
//! Picks a playback control with a short heuristic (a lone control, then
//! Master, PCM, Digital) and caches the opened mixer. Lookup is retried on
//! every use until it succeeds.

use alsa::mixer::{Mixer, Selem, SelemChannelId, SelemId};
use anyhow::{Context, Result};
use tracing::{debug, error};

/// Control used when nothing better is found
pub const DEFAULT_CONTROL: &str = "Master";

/// Volume assumed when no mixer can be opened
pub const DEFAULT_VOLUME: u8 = 50;

/// Control names tried in order when a card exposes several
const PREFERRED_CONTROLS: [&str; 3] = ["Master", "PCM", "Digital"];

/// Something that can report and set a volume in percent
pub trait VolumeControl {
    /// Current volume; `Ok(None)` when no mixer is reachable
    fn volume(&mut self) -> Result<Option<u8>>;

    /// Set the volume; a no-op when no mixer is reachable
    fn set_volume(&mut self, percent: u8) -> Result<()>;
}

/// Outcome of the control selection heuristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerChoice {
    /// The card only has one control
    Single(String),
    /// A well-known control name was present
    Preferred(&'static str),
    /// Nothing matched; fall back to the default control
    Default,
}

impl MixerChoice {
    pub fn control(&self) -> &str {
        match self {
            MixerChoice::Single(name) => name,
            MixerChoice::Preferred(name) => name,
            MixerChoice::Default => DEFAULT_CONTROL,
        }
    }
}

pub fn select_control<S: AsRef<str>>(names: &[S]) -> MixerChoice {
    if let [only] = names {
        return MixerChoice::Single(only.as_ref().to_string());
    }
    PREFERRED_CONTROLS
        .iter()
        .find(|wanted| names.iter().any(|n| n.as_ref() == **wanted))
        .map(|wanted| MixerChoice::Preferred(*wanted))
        .unwrap_or(MixerChoice::Default)
}

/// Simple mixer control names on `card`
pub fn list_controls(card: &str) -> Result<Vec<String>> {
    let mixer = Mixer::new(card, false)
        .with_context(|| format!("Failed to open mixer for card '{}'", card))?;

    let names = mixer
        .iter()
        .filter_map(Selem::new)
        .filter_map(|selem| selem.get_id().get_name().ok().map(str::to_string))
        .collect();
    Ok(names)
}

pub(crate) fn raw_to_percent(raw: i64, min: i64, max: i64) -> u8 {
    if max <= min {
        return 0;
    }
    let pct = ((raw - min) as f64 * 100.0 / (max - min) as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

pub(crate) fn percent_to_raw(percent: u8, min: i64, max: i64) -> i64 {
    let percent = f64::from(percent.min(100));
    min + ((max - min) as f64 * percent / 100.0).round() as i64
}

/// An opened playback control
pub trait PlaybackControl {
    fn name(&self) -> &str;

    /// First playback channel as a percent of the control's range
    fn volume(&self) -> Result<u8>;

    /// Set every playback channel
    fn set_volume(&self, percent: u8) -> Result<()>;
}

/// Opens playback controls on a sound card
pub trait MixerBackend {
    type Control: PlaybackControl;

    fn controls(&self, card: &str) -> Result<Vec<String>>;

    fn open(&self, card: &str, control: &str) -> Result<Self::Control>;
}

/// The system's ALSA mixer
pub struct Alsa;

impl MixerBackend for Alsa {
    type Control = AlsaMixer;

    fn controls(&self, card: &str) -> Result<Vec<String>> {
        list_controls(card)
    }

    fn open(&self, card: &str, control: &str) -> Result<AlsaMixer> {
        AlsaMixer::open(card, control)
    }
}

/// One playback control on one card
pub struct AlsaMixer {
    mixer: Mixer,
    card: String,
    control: String,
}

impl AlsaMixer {
    pub fn open(card: &str, control: &str) -> Result<Self> {
        let mixer = Mixer::new(card, false)
            .with_context(|| format!("Failed to open mixer for card '{}'", card))?;
        let this = Self {
            mixer,
            card: card.to_string(),
            control: control.to_string(),
        };
        this.selem()?;
        Ok(this)
    }

    fn selem(&self) -> Result<Selem<'_>> {
        self.mixer
            .find_selem(&SelemId::new(&self.control, 0))
            .with_context(|| {
                format!("Mixer control '{}' not found on card '{}'", self.control, self.card)
            })
    }
}

impl PlaybackControl for AlsaMixer {
    fn name(&self) -> &str {
        &self.control
    }

    fn volume(&self) -> Result<u8> {
        // Pick up changes made by other clients since the last read
        self.mixer.handle_events()?;
        let selem = self.selem()?;
        let (min, max) = selem.get_playback_volume_range();
        let raw = selem
            .get_playback_volume(SelemChannelId::FrontLeft)
            .with_context(|| format!("Failed to read volume of '{}'", self.control))?;
        Ok(raw_to_percent(raw, min, max).min(100))
    }

    fn set_volume(&self, percent: u8) -> Result<()> {
        let selem = self.selem()?;
        let (min, max) = selem.get_playback_volume_range();
        selem
            .set_playback_volume_all(percent_to_raw(percent, min, max))
            .with_context(|| format!("Failed to set volume of '{}'", self.control))?;
        Ok(())
    }
}

/// Lazily opened, cached mixer
pub struct MixerHandle<B: MixerBackend = Alsa> {
    backend: B,
    card: String,
    /// Control forced by configuration, bypassing the heuristic
    forced: Option<String>,
    mixer: Option<B::Control>,
}

impl MixerHandle<Alsa> {
    pub fn new(card: impl Into<String>, forced: Option<String>) -> Self {
        Self::with_backend(Alsa, card, forced)
    }
}

impl<B: MixerBackend> MixerHandle<B> {
    pub fn with_backend(backend: B, card: impl Into<String>, forced: Option<String>) -> Self {
        Self {
            backend,
            card: card.into(),
            forced,
            mixer: None,
        }
    }

    fn find(&self) -> Option<B::Control> {
        debug!("Finding ALSA mixer for control...");
        let attempt = match &self.forced {
            Some(control) => self.backend.open(&self.card, control),
            None => self.backend.controls(&self.card).and_then(|names| {
                let choice = select_control(&names);
                debug!("Mixer controls {:?}, picked {:?}", names, choice);
                self.backend.open(&self.card, choice.control())
            }),
        };

        match attempt {
            Ok(mixer) => Some(mixer),
            Err(e) => {
                debug!("Mixer lookup failed ({:#}), retrying with '{}'", e, DEFAULT_CONTROL);
                match self.backend.open(&self.card, DEFAULT_CONTROL) {
                    Ok(mixer) => Some(mixer),
                    Err(e) => {
                        error!("Couldn't allocate mixer: {:#}", e);
                        None
                    }
                }
            }
        }
    }

    /// The cached mixer, looking it up first if needed
    pub fn mixer(&mut self) -> Option<&B::Control> {
        if self.mixer.is_none() {
            self.mixer = self.find();
        }
        self.mixer.as_ref()
    }

    /// Forget the cached mixer so the next use looks it up again
    pub fn reset(&mut self, card: impl Into<String>, forced: Option<String>) {
        self.card = card.into();
        self.forced = forced;
        self.mixer = None;
    }
}

impl<B: MixerBackend> VolumeControl for MixerHandle<B> {
    fn volume(&mut self) -> Result<Option<u8>> {
        let Some(mixer) = self.mixer() else {
            return Ok(None);
        };
        let volume = mixer.volume()?;
        debug!("Current volume: {}", volume);
        Ok(Some(volume))
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        if let Some(mixer) = self.mixer() {
            debug!("Setting '{}' to {}%", mixer.name(), percent);
            mixer.set_volume(percent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_single_control_wins() {
        assert_eq!(
            select_control(&["Speaker"]),
            MixerChoice::Single("Speaker".to_string())
        );
    }

    #[test]
    fn test_preference_order() {
        assert_eq!(
            select_control(&["Digital", "PCM", "Master"]),
            MixerChoice::Preferred("Master")
        );
        assert_eq!(
            select_control(&["Capture", "Digital", "PCM"]),
            MixerChoice::Preferred("PCM")
        );
        assert_eq!(
            select_control(&["Capture", "Digital"]),
            MixerChoice::Preferred("Digital")
        );
    }

    #[test]
    fn test_fallback_to_default() {
        let choice = select_control(&["Headphone", "Capture"]);
        assert_eq!(choice, MixerChoice::Default);
        assert_eq!(choice.control(), DEFAULT_CONTROL);

        let empty: [&str; 0] = [];
        assert_eq!(select_control(&empty), MixerChoice::Default);
    }

    #[test]
    fn test_percent_conversion() {
        assert_eq!(raw_to_percent(0, 0, 255), 0);
        assert_eq!(raw_to_percent(255, 0, 255), 100);
        assert_eq!(raw_to_percent(-5120, -10239, 400), 48);
        assert_eq!(raw_to_percent(3, 3, 3), 0);

        assert_eq!(percent_to_raw(0, -10239, 400), -10239);
        assert_eq!(percent_to_raw(100, -10239, 400), 400);
        assert_eq!(percent_to_raw(50, 0, 255), 128);
    }

    #[test]
    fn test_percent_round_trip_is_stable() {
        for pct in 0..=100u8 {
            let raw = percent_to_raw(pct, 0, 151);
            assert_eq!(raw_to_percent(raw, 0, 151), pct);
        }
    }

    /// Backend with a scripted set of controls
    #[derive(Default)]
    struct FakeBackend {
        /// `None` makes control enumeration fail
        controls: Option<Vec<&'static str>>,
        /// Controls that can actually be opened
        openable: Vec<&'static str>,
        fail_reads: bool,
        opened: RefCell<Vec<String>>,
    }

    struct FakeControl {
        name: String,
        volume: Cell<u8>,
        fail_reads: bool,
    }

    impl PlaybackControl for FakeControl {
        fn name(&self) -> &str {
            &self.name
        }

        fn volume(&self) -> Result<u8> {
            if self.fail_reads {
                anyhow::bail!("read failed");
            }
            Ok(self.volume.get())
        }

        fn set_volume(&self, percent: u8) -> Result<()> {
            self.volume.set(percent);
            Ok(())
        }
    }

    impl MixerBackend for FakeBackend {
        type Control = FakeControl;

        fn controls(&self, _card: &str) -> Result<Vec<String>> {
            match &self.controls {
                Some(names) => Ok(names.iter().map(|n| n.to_string()).collect()),
                None => anyhow::bail!("no such card"),
            }
        }

        fn open(&self, _card: &str, control: &str) -> Result<FakeControl> {
            self.opened.borrow_mut().push(control.to_string());
            if !self.openable.iter().any(|c| *c == control) {
                anyhow::bail!("control '{}' not found", control);
            }
            Ok(FakeControl {
                name: control.to_string(),
                volume: Cell::new(30),
                fail_reads: self.fail_reads,
            })
        }
    }

    fn handle(backend: FakeBackend, forced: Option<&str>) -> MixerHandle<FakeBackend> {
        MixerHandle::with_backend(backend, "default", forced.map(str::to_string))
    }

    #[test]
    fn test_heuristic_pick_is_opened() {
        let mut mixer = handle(
            FakeBackend {
                controls: Some(vec!["Capture", "PCM"]),
                openable: vec!["PCM", "Master"],
                ..Default::default()
            },
            None,
        );
        assert_eq!(mixer.mixer().map(|m| m.name().to_string()), Some("PCM".to_string()));
        assert_eq!(mixer.volume().unwrap(), Some(30));
    }

    #[test]
    fn test_enumeration_failure_falls_back_to_default() {
        let mut mixer = handle(
            FakeBackend {
                controls: None,
                openable: vec![DEFAULT_CONTROL],
                ..Default::default()
            },
            None,
        );
        assert_eq!(mixer.mixer().map(|m| m.name().to_string()), Some(DEFAULT_CONTROL.to_string()));
        assert_eq!(*mixer.backend.opened.borrow(), vec![DEFAULT_CONTROL.to_string()]);
    }

    #[test]
    fn test_missing_forced_control_falls_back_to_default() {
        let mut mixer = handle(
            FakeBackend {
                openable: vec![DEFAULT_CONTROL],
                ..Default::default()
            },
            Some("Speaker"),
        );
        assert_eq!(mixer.mixer().map(|m| m.name().to_string()), Some(DEFAULT_CONTROL.to_string()));
        assert_eq!(
            *mixer.backend.opened.borrow(),
            vec!["Speaker".to_string(), DEFAULT_CONTROL.to_string()]
        );
    }

    #[test]
    fn test_no_mixer_is_retried_on_next_use() {
        let mut mixer = handle(FakeBackend::default(), None);

        assert!(mixer.mixer().is_none());
        assert_eq!(mixer.volume().unwrap(), None);
        mixer.set_volume(80).unwrap();
        // Every use looked the mixer up again
        assert_eq!(mixer.backend.opened.borrow().len(), 3);

        mixer.backend.openable.push(DEFAULT_CONTROL);
        assert_eq!(mixer.volume().unwrap(), Some(30));
        mixer.set_volume(80).unwrap();
        assert_eq!(mixer.volume().unwrap(), Some(80));
        assert_eq!(mixer.backend.opened.borrow().len(), 4);
    }

    #[test]
    fn test_read_failure_is_an_error_not_missing_mixer() {
        let mut mixer = handle(
            FakeBackend {
                controls: Some(vec!["Master"]),
                openable: vec!["Master"],
                fail_reads: true,
                ..Default::default()
            },
            None,
        );
        assert!(mixer.volume().is_err());
    }

    #[test]
    fn test_reset_forgets_cached_mixer() {
        let mut mixer = handle(
            FakeBackend {
                openable: vec!["Speaker", DEFAULT_CONTROL],
                ..Default::default()
            },
            Some("Speaker"),
        );
        assert!(mixer.mixer().is_some());
        mixer.reset("default", None);
        assert!(mixer.mixer.is_none());
        // Enumeration fails, so the default control is used
        assert_eq!(mixer.mixer().map(|m| m.name().to_string()), Some(DEFAULT_CONTROL.to_string()));
    }
}
