//! The value every capability handler returns.
//!
//! Handlers never raise across the capability boundary: an internal fault becomes
//! [`ResultEnvelope::Failure`] carrying a short sentence that can be spoken as-is.

use crate::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// Polite rejection returned while another request is in flight.
pub const BUSY_MESSAGE: &str = "I'm still processing your previous request. Please wait a moment.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl Payload {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Build a structured payload from any serializable value. Non-object values are wrapped
    /// under a `value` key.
    pub fn structured<T: Serialize>(v: &T) -> Self {
        match serde_json::to_value(v) {
            Ok(serde_json::Value::Object(m)) => Self::Structured(m),
            Ok(other) => {
                let mut m = serde_json::Map::new();
                m.insert("value".to_string(), other);
                Self::Structured(m)
            }
            Err(e) => Self::Text(format!("unserializable result: {e}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Success { value: Payload },
    Failure {
        message: String,
        cause: String,
        /// Failure class, when the failure came from an [`Error`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
}

impl From<Payload> for ResultEnvelope {
    fn from(value: Payload) -> Self {
        Self::Success { value }
    }
}

impl ResultEnvelope {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Success {
            value: Payload::text(s),
        }
    }

    pub fn success(value: Payload) -> Self {
        Self::Success { value }
    }

    pub fn failure(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            cause: cause.into(),
            kind: None,
        }
    }

    /// Tag a failure with its class. Successes are returned unchanged.
    pub fn with_kind(self, k: ErrorKind) -> Self {
        match self {
            Self::Failure { message, cause, .. } => Self::Failure {
                message,
                cause,
                kind: Some(k),
            },
            ok => ok,
        }
    }

    pub fn busy() -> Self {
        Self::text(BUSY_MESSAGE)
    }

    /// Failure whose message is the error's own speakable sentence.
    pub fn from_error(err: &Error) -> Self {
        Self::failure(err.spoken(), err.to_string()).with_kind(err.kind())
    }

    /// Failure with a caller-chosen message, keeping the error as the cause. Corrective
    /// errors (bad input, nothing found) keep their own message.
    pub fn from_error_with(message: impl Into<String>, err: &Error) -> Self {
        match err {
            Error::InvalidArgument(_) | Error::NotFound(_) => Self::from_error(err),
            _ => Self::failure(message, err.to_string()).with_kind(err.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failure { kind, .. } => *kind,
            Self::Success { .. } => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Success {
                value: Payload::Text(s),
            } => Some(s),
            _ => None,
        }
    }

    /// What the voice pipeline should say.
    pub fn speech_text(&self) -> String {
        match self {
            Self::Success {
                value: Payload::Text(s),
            } => s.clone(),
            Self::Success {
                value: Payload::Structured(m),
            } => match m.get("formatted_response").and_then(|v| v.as_str()) {
                Some(s) => s.to_string(),
                None => serde_json::Value::Object(m.clone()).to_string(),
            },
            Self::Failure { message, .. } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_a_success_not_an_error() {
        let b = ResultEnvelope::busy();
        assert!(b.is_success());
        assert_eq!(b.as_text(), Some(BUSY_MESSAGE));
    }

    #[test]
    fn serializes_with_status_tag() {
        let v = serde_json::to_value(ResultEnvelope::text("hi")).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["value"], "hi");

        let v = serde_json::to_value(ResultEnvelope::failure("Sorry.", "boom")).unwrap();
        assert_eq!(v["status"], "failure");
        assert_eq!(v["message"], "Sorry.");
        assert_eq!(v["cause"], "boom");
        assert!(v.get("kind").is_none());

        let back: ResultEnvelope = serde_json::from_value(v).unwrap();
        assert!(!back.is_success());
        assert_eq!(back.error_kind(), None);
    }

    #[test]
    fn failures_from_errors_carry_their_kind() {
        let env = ResultEnvelope::from_error(&Error::Timeout("10s".into()));
        assert_eq!(env.error_kind(), Some(ErrorKind::TransientNetwork));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["kind"], "transient_network");

        let env = ResultEnvelope::from_error_with("Sorry.", &Error::NotConfigured("no key".into()));
        assert_eq!(env.error_kind(), Some(ErrorKind::Configuration));
        assert_eq!(ResultEnvelope::text("fine").with_kind(ErrorKind::NotFound).error_kind(), None);
    }

    #[test]
    fn structured_payload_speaks_formatted_response() {
        let env = ResultEnvelope::success(Payload::structured(&serde_json::json!({
            "distance": 3.2,
            "formatted_response": "Head north.",
        })));
        assert_eq!(env.speech_text(), "Head north.");
    }

    #[test]
    fn failure_speech_omits_cause() {
        let err = Error::Upstream("HTTP 502 from chat.completions".into());
        let env = ResultEnvelope::from_error_with("Sorry, I encountered an error while searching.", &err);
        assert_eq!(env.speech_text(), "Sorry, I encountered an error while searching.");
        match env {
            ResultEnvelope::Failure { cause, .. } => assert!(cause.contains("502")),
            ResultEnvelope::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn corrective_error_keeps_its_message() {
        let err = Error::InvalidArgument("Please specify a result number between 1 and 2.".into());
        let env = ResultEnvelope::from_error_with("ignored", &err);
        assert_eq!(env.speech_text(), "Please specify a result number between 1 and 2.");
    }
}
