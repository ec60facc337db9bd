use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::StreamError;

/// Lifecycle of the single upstream connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Backoff,
    Aborted,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded frame routed by shape.
///
/// `Tweet` carries the whole object; envelope kinds carry the value found
/// under their discriminating key.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum StreamMessage {
    Tweet(Value),
    Delete(Value),
    ScrubGeo(Value),
    Limit(Value),
    StatusWithheld(Value),
    UserWithheld(Value),
    Disconnect(Value),
    Warning(Value),
    Unrecognized(Value),
}

impl StreamMessage {
    /// Event name the message is published under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Tweet(_) => "tweet",
            Self::Delete(_) => "delete",
            Self::ScrubGeo(_) => "scrub_geo",
            Self::Limit(_) => "limit",
            Self::StatusWithheld(_) => "status_withheld",
            Self::UserWithheld(_) => "user_withheld",
            Self::Disconnect(_) => "disconnect",
            Self::Warning(_) => "warning",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::Tweet(v)
            | Self::Delete(v)
            | Self::ScrubGeo(v)
            | Self::Limit(v)
            | Self::StatusWithheld(v)
            | Self::UserWithheld(v)
            | Self::Disconnect(v)
            | Self::Warning(v)
            | Self::Unrecognized(v) => v,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// Everything a subscriber can observe.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Connect,
    Message(StreamMessage),
    /// A transient failure; another attempt follows after `delay`.
    Reconnect { error: StreamError, delay: Duration },
    /// A terminal failure; no automatic retry follows.
    Error { error: StreamError },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Message(m) => m.event_name(),
            Self::Reconnect { .. } => "reconnect",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Flat JSON rendering: `{"event": name, ...}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Connect => json!({ "event": "connect" }),
            Self::Message(m) => json!({ "event": m.event_name(), "data": m.payload() }),
            Self::Reconnect { error, delay } => json!({
                "event": "reconnect",
                "type": error.kind().as_str(),
                "code": error.code(),
                "detail": error.to_string(),
                "delayMs": delay.as_millis() as u64,
            }),
            Self::Error { error } => json!({
                "event": "error",
                "type": error.kind().as_str(),
                "code": error.code(),
                "detail": error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;

    #[test]
    fn message_event_names() {
        assert_eq!(StreamMessage::Tweet(json!({})).event_name(), "tweet");
        assert_eq!(StreamMessage::ScrubGeo(json!({})).event_name(), "scrub_geo");
        assert_eq!(
            StreamMessage::StatusWithheld(json!({})).event_name(),
            "status_withheld"
        );
        assert!(!StreamMessage::Unrecognized(json!(1)).is_recognized());
    }

    #[test]
    fn reconnect_json_shape() {
        let event = StreamEvent::Reconnect {
            error: StreamError::Network(TransportError::Read("reset".into())),
            delay: Duration::from_millis(250),
        };
        let v = event.to_json();
        assert_eq!(v["event"], "reconnect");
        assert_eq!(v["type"], "network");
        assert_eq!(v["code"], Value::Null);
        assert_eq!(v["delayMs"], 250);
        assert!(v["detail"].as_str().unwrap().contains("reset"));
    }

    #[test]
    fn error_json_carries_code() {
        let event = StreamEvent::Error {
            error: StreamError::HttpStatus { status: 406 },
        };
        assert!(event.is_terminal());
        let v = event.to_json();
        assert_eq!(v["event"], "error");
        assert_eq!(v["type"], "http");
        assert_eq!(v["code"], 406);
    }

    #[test]
    fn message_json_wraps_payload() {
        let event = StreamEvent::Message(StreamMessage::Tweet(json!({"text": "Taco"})));
        assert_eq!(event.name(), "tweet");
        assert_eq!(event.to_json()["data"]["text"], "Taco");
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(ConnectionState::Backoff.to_string(), "backoff");
    }
}
