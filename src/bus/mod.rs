//! Assistant message bus
//!
//! The assistant publishes JSON messages over a WebSocket. The knob only
//! cares about the recognizer and skill-handler lifecycle (to colour the LED)
//! and can publish volume change requests.

mod client;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::knob::Direction;
use crate::led::LedState;

pub use client::{BusClient, BusHandle};

pub const RECORD_BEGIN: &str = "recognizer_loop:record_begin";
pub const RECORD_END: &str = "recognizer_loop:record_end";
pub const HANDLER_COMPLETE: &str = "mycroft.skill.handler.complete";
pub const RECOGNITION_UNKNOWN: &str = "mycroft.speech.recognition.unknown";
pub const VOLUME_INCREASE: &str = "mycroft.volume.increase";
pub const VOLUME_DECREASE: &str = "mycroft.volume.decrease";

/// A bus message as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub context: Map<String, Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(d)?.unwrap_or_default())
}

impl Message {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: Map::new(),
            context: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Request for the assistant's volume handler to step the volume
    pub fn volume_change(direction: Direction, play_sound: bool) -> Self {
        let msg_type = match direction {
            Direction::Up => VOLUME_INCREASE,
            Direction::Down => VOLUME_DECREASE,
        };
        Self::new(msg_type)
            .with_data("play_sound", play_sound)
            .with_context_source()
    }

    fn with_context_source(mut self) -> Self {
        self.context
            .insert("source".to_string(), Value::String("knob-gw".to_string()));
        self
    }
}

/// Assistant lifecycle event relevant to the knob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    ListenStarted,
    ListenEnded,
    HandlerComplete,
}

impl BusEvent {
    pub fn from_message_type(msg_type: &str) -> Option<Self> {
        match msg_type {
            RECORD_BEGIN => Some(BusEvent::ListenStarted),
            RECORD_END => Some(BusEvent::ListenEnded),
            HANDLER_COMPLETE | RECOGNITION_UNKNOWN => Some(BusEvent::HandlerComplete),
            _ => None,
        }
    }

    pub fn led_state(self) -> LedState {
        match self {
            BusEvent::ListenStarted => LedState::Listen,
            BusEvent::ListenEnded => LedState::Think,
            BusEvent::HandlerComplete => LedState::Idle,
        }
    }
}
