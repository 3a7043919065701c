//! Outbound puzzle → host messages and their JSON wire shape.

use crate::transport::{HostTransport, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PuzzleEvent {
    Config,
    Progress,
    Failure,
    Success,
}

impl PuzzleEvent {
    pub const ALL: [PuzzleEvent; 4] = [
        PuzzleEvent::Config,
        PuzzleEvent::Progress,
        PuzzleEvent::Failure,
        PuzzleEvent::Success,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PuzzleEvent::Config => "config",
            PuzzleEvent::Progress => "progress",
            PuzzleEvent::Failure => "failure",
            PuzzleEvent::Success => "success",
        }
    }

    pub fn is_outcome(self) -> bool {
        matches!(self, PuzzleEvent::Failure | PuzzleEvent::Success)
    }
}

impl fmt::Display for PuzzleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PuzzleEvent {
    type Err = MessageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        PuzzleEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == raw)
            .ok_or_else(|| MessageError::UnknownEvent(raw.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<String>>,
}

impl SuccessOptions {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl FailureOptions {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a json object")]
    NotAnObject,
    #[error("message has no `event` field")]
    MissingEvent,
    #[error("unknown message event: {0}")]
    UnknownEvent(String),
    #[error("unexpected event type `{0}`; expected success or failure")]
    UnexpectedEventType(PuzzleEvent),
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: PuzzleEvent,
        source: serde_json::Error,
    },
}

/// One notification from puzzle logic to the host.
///
/// `Config` and `Progress` carry whatever the puzzle wants persisted;
/// `Value::Null` stands for "no data".
#[derive(Debug, Clone, PartialEq)]
pub enum PuzzleMessage {
    Config(Value),
    Progress(Value),
    Failure(FailureOptions),
    Success(SuccessOptions),
}

impl PuzzleMessage {
    pub fn config(data: Value) -> Self {
        PuzzleMessage::Config(data)
    }

    pub fn progress(data: Value) -> Self {
        PuzzleMessage::Progress(data)
    }

    pub fn failure(options: FailureOptions) -> Self {
        PuzzleMessage::Failure(options)
    }

    pub fn success(options: SuccessOptions) -> Self {
        PuzzleMessage::Success(options)
    }

    pub fn from_parts(event: PuzzleEvent, data: Value) -> Result<Self, MessageError> {
        let invalid = |source| MessageError::InvalidPayload { event, source };

        Ok(match event {
            PuzzleEvent::Config => PuzzleMessage::Config(data),
            PuzzleEvent::Progress => PuzzleMessage::Progress(data),
            PuzzleEvent::Failure if data.is_null() => {
                PuzzleMessage::Failure(FailureOptions::default())
            }
            PuzzleEvent::Failure => {
                PuzzleMessage::Failure(serde_json::from_value(data).map_err(invalid)?)
            }
            PuzzleEvent::Success if data.is_null() => {
                PuzzleMessage::Success(SuccessOptions::default())
            }
            PuzzleEvent::Success => {
                PuzzleMessage::Success(serde_json::from_value(data).map_err(invalid)?)
            }
        })
    }

    pub fn event(&self) -> PuzzleEvent {
        match self {
            PuzzleMessage::Config(_) => PuzzleEvent::Config,
            PuzzleMessage::Progress(_) => PuzzleEvent::Progress,
            PuzzleMessage::Failure(_) => PuzzleEvent::Failure,
            PuzzleMessage::Success(_) => PuzzleEvent::Success,
        }
    }

    /// The payload as it appears under `data` on the wire.
    pub fn data(&self) -> Value {
        match self {
            PuzzleMessage::Config(data) | PuzzleMessage::Progress(data) => data.clone(),
            PuzzleMessage::Failure(options) => options_value(
                options.message.as_deref(),
                options.title.as_deref(),
                options.messages.as_deref(),
            ),
            PuzzleMessage::Success(options) => {
                options_value(options.message.as_deref(), options.title.as_deref(), None)
            }
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "event": self.event().as_str(), "data": self.data() })
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Parses a wire string. The legacy `fn` key is accepted in place of `event`.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut object) = value else {
            return Err(MessageError::NotAnObject);
        };

        let event = match object.remove("event").or_else(|| object.remove("fn")) {
            Some(Value::String(name)) => name.parse::<PuzzleEvent>()?,
            Some(Value::Null) | None => return Err(MessageError::MissingEvent),
            Some(other) => return Err(MessageError::UnknownEvent(other.to_string())),
        };
        let data = object.remove("data").unwrap_or(Value::Null);

        Self::from_parts(event, data)
    }

    /// Like [`PuzzleMessage::parse`], but only accepts `success` and `failure`.
    pub fn parse_outcome(raw: &str) -> Result<Self, MessageError> {
        let message = Self::parse(raw)?;
        let event = message.event();

        if event.is_outcome() {
            Ok(message)
        } else {
            Err(MessageError::UnexpectedEventType(event))
        }
    }

    pub fn post(&self, transport: &dyn HostTransport) {
        let event = self.event();

        match transport.post_message(&self.to_json()) {
            Ok(()) => tracing::debug!(%event, "posted puzzle message"),
            Err(TransportError::Unavailable) => {
                tracing::warn!(%event, "no host transport available; are we outside a host?");
            }
            Err(err) => tracing::warn!(%event, "failed to post puzzle message: {err}"),
        }
    }
}

fn options_value(message: Option<&str>, title: Option<&str>, messages: Option<&[String]>) -> Value {
    let mut map = Map::new();

    if let Some(message) = message {
        map.insert("message".to_string(), Value::from(message));
    }
    if let Some(title) = title {
        map.insert("title".to_string(), Value::from(title));
    }
    if let Some(messages) = messages {
        map.insert("messages".to_string(), Value::from(messages.to_vec()));
    }

    Value::Object(map)
}
