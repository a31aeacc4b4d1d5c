//! Protocol types for client-daemon communication.
//!
//! One JSON line per request, one per response. Requests name an endpoint by
//! its path string (so an unmatched path still parses and can be answered
//! with an `UnknownEndpoint` error envelope, never a transport failure) and
//! optionally carry a flat key-value payload. Requests are stateless; nothing
//! identifies the caller across requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PortalError;

/// A request from client to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Endpoint path, e.g. `a11y_tree` or `keyboard/input`.
    pub endpoint: String,
    /// Key-value payload for write endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
}

impl Request {
    pub fn query(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload: None,
        }
    }

    pub fn write(endpoint: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload: Some(payload),
        }
    }
}

/// The fixed endpoint set the dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Ping,
    A11yTree,
    PhoneState,
    State,
    KeyboardInput,
    KeyboardClear,
    KeyboardKey,
    KeyboardSetText,
    OverlayOffset,
    Shutdown,
}

impl Endpoint {
    /// Match a request path against the endpoint table.
    ///
    /// A single leading slash is tolerated. Returns None for anything
    /// unmatched, including unknown `keyboard/...` actions.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.strip_prefix('/').unwrap_or(path);
        match path {
            "ping" => Some(Endpoint::Ping),
            "a11y_tree" => Some(Endpoint::A11yTree),
            "phone_state" => Some(Endpoint::PhoneState),
            "state" => Some(Endpoint::State),
            "keyboard/input" => Some(Endpoint::KeyboardInput),
            "keyboard/clear" => Some(Endpoint::KeyboardClear),
            "keyboard/key" => Some(Endpoint::KeyboardKey),
            "keyboard/set_text" => Some(Endpoint::KeyboardSetText),
            "overlay_offset" => Some(Endpoint::OverlayOffset),
            "shutdown" => Some(Endpoint::Shutdown),
            _ => None,
        }
    }

    /// Whether this endpoint mutates state (and reports a [`WriteReceipt`]).
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Endpoint::KeyboardInput
                | Endpoint::KeyboardClear
                | Endpoint::KeyboardKey
                | Endpoint::KeyboardSetText
                | Endpoint::OverlayOffset
        )
    }
}

/// The uniform response envelope.
///
/// Exactly one of `data`/`error` exists by construction; the serialized form
/// is `{"status":"success","data":...}` or `{"status":"error","error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    Success { data: Value },
    Error { error: String },
}

impl ResponseEnvelope {
    pub fn success(data: impl Into<Value>) -> Self {
        ResponseEnvelope::Success { data: data.into() }
    }

    /// Convert an error into an envelope. The rendered message keeps the
    /// `[CODE]` prefix so callers can branch on the failure kind.
    pub fn failure(err: &PortalError) -> Self {
        ResponseEnvelope::Error {
            error: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }
}

impl From<Result<Value, PortalError>> for ResponseEnvelope {
    fn from(result: Result<Value, PortalError>) -> Self {
        match result {
            Ok(data) => ResponseEnvelope::Success { data },
            Err(err) => ResponseEnvelope::failure(&err),
        }
    }
}

/// Outcome of a write endpoint, expressed as a status + message pair.
///
/// Write results are additionally rendered as a percent-encoded query-string
/// fragment (`status=success&message=...`) suitable for embedding in a reply
/// locator; that rendered form travels as the envelope's `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub success: bool,
    pub message: String,
}

impl WriteReceipt {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Render as `status=<s>&message=<percent-encoded message>`.
    pub fn as_query_string(&self) -> String {
        let status = if self.success { "success" } else { "error" };
        format!(
            "status={}&message={}",
            status,
            urlencoding::encode(&self.message)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_table_matches_paths() {
        assert_eq!(Endpoint::parse("ping"), Some(Endpoint::Ping));
        assert_eq!(Endpoint::parse("/a11y_tree"), Some(Endpoint::A11yTree));
        assert_eq!(Endpoint::parse("phone_state"), Some(Endpoint::PhoneState));
        assert_eq!(Endpoint::parse("state"), Some(Endpoint::State));
        assert_eq!(
            Endpoint::parse("keyboard/input"),
            Some(Endpoint::KeyboardInput)
        );
        assert_eq!(
            Endpoint::parse("keyboard/set_text"),
            Some(Endpoint::KeyboardSetText)
        );
        assert_eq!(
            Endpoint::parse("overlay_offset"),
            Some(Endpoint::OverlayOffset)
        );
    }

    #[test]
    fn unknown_paths_do_not_match() {
        assert_eq!(Endpoint::parse("nope"), None);
        assert_eq!(Endpoint::parse("keyboard/fly"), None);
        assert_eq!(Endpoint::parse(""), None);
    }

    #[test]
    fn write_endpoints_are_classified() {
        assert!(Endpoint::KeyboardInput.is_write());
        assert!(Endpoint::OverlayOffset.is_write());
        assert!(!Endpoint::Ping.is_write());
        assert!(!Endpoint::State.is_write());
    }

    #[test]
    fn success_envelope_has_data_and_no_error() {
        let json = serde_json::to_string(&ResponseEnvelope::success("pong")).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"data\":\"pong\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn error_envelope_has_error_and_no_data() {
        let err = PortalError::unknown_endpoint("/bogus");
        let json = serde_json::to_string(&ResponseEnvelope::failure(&err)).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("Unknown endpoint: /bogus"));
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = ResponseEnvelope::success(json!({"a11y_tree": []}));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ResponseEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn request_without_payload_omits_the_field() {
        let json = serde_json::to_string(&Request::query("ping")).unwrap();
        assert_eq!(json, "{\"endpoint\":\"ping\"}");
    }

    #[test]
    fn receipt_percent_encodes_messages() {
        let receipt = WriteReceipt::success("Text set - 'hello world'");
        let qs = receipt.as_query_string();
        assert!(qs.starts_with("status=success&message="));
        assert!(qs.contains("hello%20world"));
        assert!(!qs.contains(' '));

        let failure = WriteReceipt::error("No offset provided");
        assert!(failure.as_query_string().starts_with("status=error&message="));
    }
}
