//! Text channel message types: commands and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LinkError;

/// Prefix of a configuration update.
pub const SET_PREFIX: &str = "SET+";

/// Prefix of a one-way telemetry push.
pub const DATA_PREFIX: &str = "DATA+";

/// A parsed text command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `SET+<json>`: configuration update, answered with an envelope.
    Set(Value),
    /// `DATA+[json]`: telemetry push, never answered on success.
    Data(Option<Value>),
}

impl Command {
    /// Parses a text message by prefix, `SET+` first, then `DATA+`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::JsonParse`] if the payload after a known prefix
    /// is not valid JSON, or [`LinkError::InvalidCommand`] if no prefix matches.
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        if let Some(payload) = text.strip_prefix(SET_PREFIX) {
            return Ok(Self::Set(serde_json::from_str(payload)?));
        }
        if let Some(payload) = text.strip_prefix(DATA_PREFIX) {
            if payload.is_empty() {
                return Ok(Self::Data(None));
            }
            return Ok(Self::Data(Some(serde_json::from_str(payload)?)));
        }
        Err(LinkError::InvalidCommand)
    }
}

/// Outcome discriminator of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Command accepted.
    #[serde(rename = "OK")]
    Ok,
    /// Command rejected; see `error`.
    #[serde(rename = "ERROR")]
    Error,
}

/// Response sent to the connection that issued a command.
///
/// ```json
/// {"status": "ERROR", "error": ["Invalid json format", "EOF while parsing"], "data": {}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `"OK"` or `"ERROR"`.
    pub status: Status,
    /// Error messages; empty when `status` is `"OK"`.
    pub error: Vec<String>,
    /// Extra payload; an empty object unless a command fills it.
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Success envelope with no data.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            error: Vec::new(),
            data: Map::new(),
        }
    }

    /// Error envelope with the given messages.
    #[must_use]
    pub fn error<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: Status::Error,
            error: messages.into_iter().map(Into::into).collect(),
            data: Map::new(),
        }
    }

    /// Error envelope describing a command failure.
    #[must_use]
    pub fn from_error(err: &LinkError) -> Self {
        match err {
            LinkError::JsonParse(e) => Self::error(["Invalid json format".to_string(), e.to_string()]),
            LinkError::InvalidCommand => Self::error(["Invalid command format"]),
            other => Self::error([other.to_string()]),
        }
    }

    /// Returns `true` for an `"OK"` envelope.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serializes the envelope as JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn set_parses_json_object() {
        let Ok(Command::Set(value)) = Command::parse(r#"SET+{"rate": 5}"#) else {
            panic!("expected SET");
        };
        assert_eq!(value["rate"], 5);
    }

    #[test]
    fn data_with_and_without_payload() {
        assert_eq!(Command::parse("DATA+").ok(), Some(Command::Data(None)));
        let Ok(Command::Data(Some(value))) = Command::parse("DATA+[1,2]") else {
            panic!("expected DATA with payload");
        };
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn bad_json_after_prefix_is_json_error() {
        assert!(matches!(
            Command::parse("SET+{oops"),
            Err(LinkError::JsonParse(_))
        ));
        assert!(matches!(
            Command::parse("DATA+nope"),
            Err(LinkError::JsonParse(_))
        ));
        assert!(matches!(Command::parse("SET+"), Err(LinkError::JsonParse(_))));
    }

    #[test]
    fn unknown_prefix_is_invalid_command() {
        for text in ["", "GET+{}", "set+{}", "DATA{}", "SET"] {
            assert!(
                matches!(Command::parse(text), Err(LinkError::InvalidCommand)),
                "{text}"
            );
        }
    }

    #[test]
    fn ok_envelope_shape() {
        let json = Envelope::ok().to_json();
        assert_eq!(json, r#"{"status":"OK","error":[],"data":{}}"#);
    }

    #[test]
    fn json_error_envelope_carries_parser_message() {
        let Err(err) = Command::parse("SET+{") else {
            panic!("expected failure");
        };
        let envelope = Envelope::from_error(&err);
        assert!(!envelope.is_ok());
        assert_eq!(envelope.error.len(), 2);
        assert_eq!(envelope.error.first().map(String::as_str), Some("Invalid json format"));
    }

    #[test]
    fn invalid_command_envelope() {
        let envelope = Envelope::from_error(&LinkError::InvalidCommand);
        assert_eq!(envelope.error, vec!["Invalid command format".to_string()]);
        let json = envelope.to_json();
        assert!(json.contains(r#""status":"ERROR""#));
    }
}
