//! AI-friendly error types with suggestions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for protocol responses.
///
/// Every failure a dispatcher handler can produce maps to exactly one code,
/// so callers can branch on the kind instead of sniffing message prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CollaboratorUnavailable,
    DecodeError,
    NoInputTarget,
    UnknownEndpoint,
    SurfaceAttachFailure,
    TreeTooDeep,
    InvalidInput,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::CollaboratorUnavailable => write!(f, "COLLABORATOR_UNAVAILABLE"),
            ErrorCode::DecodeError => write!(f, "DECODE_ERROR"),
            ErrorCode::NoInputTarget => write!(f, "NO_INPUT_TARGET"),
            ErrorCode::UnknownEndpoint => write!(f, "UNKNOWN_ENDPOINT"),
            ErrorCode::SurfaceAttachFailure => write!(f, "SURFACE_ATTACH_FAILURE"),
            ErrorCode::TreeTooDeep => write!(f, "TREE_TOO_DEEP"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// An error with AI-friendly context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for PortalError {}

impl PortalError {
    /// A collaborator (accessibility provider, keyboard bridge, overlay) is
    /// not reachable from the daemon.
    pub fn collaborator_unavailable(collaborator: &str) -> Self {
        Self {
            code: ErrorCode::CollaboratorUnavailable,
            message: format!("{} not available", collaborator),
            suggestion: Some(format!(
                "Ensure the {} is connected to the daemon and try again",
                collaborator
            )),
        }
    }

    /// An encoded text payload could not be decoded.
    pub fn decode_error(encoding: &str, detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::DecodeError,
            message: format!("Invalid {} encoding: {}", encoding, detail.into()),
            suggestion: Some(format!(
                "Encode the text payload as {} before sending it",
                encoding
            )),
        }
    }

    /// No focused input field to deliver text or key events to.
    pub fn no_input_target() -> Self {
        Self {
            code: ErrorCode::NoInputTarget,
            message: "No focused input element found".to_string(),
            suggestion: Some(
                "Focus a text field on the device before sending keyboard actions".into(),
            ),
        }
    }

    /// The request path did not match any known endpoint.
    ///
    /// The literal unmatched path is embedded in the message.
    pub fn unknown_endpoint(path: &str) -> Self {
        Self {
            code: ErrorCode::UnknownEndpoint,
            message: format!("Unknown endpoint: {}", path),
            suggestion: Some(
                "Valid endpoints: ping, a11y_tree, phone_state, state, keyboard/input, \
                 keyboard/clear, keyboard/key, keyboard/set_text, overlay_offset"
                    .into(),
            ),
        }
    }

    /// The overlay surface could not be attached.
    pub fn surface_attach_failure(detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::SurfaceAttachFailure,
            message: format!("Overlay surface attach failed: {}", detail.into()),
            suggestion: Some(
                "Check that the overlay frame directory exists and is writable".into(),
            ),
        }
    }

    /// The element tree exceeded the serializer's depth bound.
    pub fn tree_too_deep(max_depth: usize) -> Self {
        Self {
            code: ErrorCode::TreeTooDeep,
            message: format!("Element tree exceeds maximum depth of {}", max_depth),
            suggestion: Some(
                "The UI provider produced a pathologically deep tree; raise --max-tree-depth \
                 if the hierarchy is legitimately this deep"
                    .into(),
            ),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            suggestion: Some("Check the request payload and try again".into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InternalError,
            message: message.into(),
            suggestion: Some("This is an internal error. Please report it if it persists.".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All error constructors must provide a suggestion.
    /// This is critical for AI-friendly error messages.
    fn assert_has_suggestion(err: &PortalError, context: &str) {
        assert!(
            err.suggestion.is_some(),
            "{} should have a suggestion, but got None",
            context
        );
    }

    #[test]
    fn collaborator_unavailable_has_suggestion() {
        let err = PortalError::collaborator_unavailable("accessibility provider");
        assert_has_suggestion(&err, "collaborator_unavailable");
        assert!(err.message.contains("accessibility provider"));
    }

    #[test]
    fn decode_error_names_the_encoding() {
        let err = PortalError::decode_error("base64", "bad padding");
        assert_has_suggestion(&err, "decode_error");
        assert!(err.message.contains("base64"));
        assert!(err.message.contains("bad padding"));
    }

    #[test]
    fn unknown_endpoint_embeds_literal_path() {
        let err = PortalError::unknown_endpoint("/bogus/path");
        assert_has_suggestion(&err, "unknown_endpoint");
        assert!(err.message.contains("Unknown endpoint: /bogus/path"));
    }

    #[test]
    fn tree_too_deep_names_the_bound() {
        let err = PortalError::tree_too_deep(64);
        assert_has_suggestion(&err, "tree_too_deep");
        assert!(err.message.contains("64"));
    }

    #[test]
    fn keyboard_failure_kinds_are_distinct() {
        // Callers must be able to branch on these three without string games.
        let decode = PortalError::decode_error("hex", "odd length");
        let no_target = PortalError::no_input_target();
        let unavailable = PortalError::collaborator_unavailable("keyboard bridge");
        assert_ne!(decode.code, no_target.code);
        assert_ne!(decode.code, unavailable.code);
        assert_ne!(no_target.code, unavailable.code);
    }

    #[test]
    fn display_format_with_suggestion() {
        let err = PortalError::no_input_target();
        let display = format!("{}", err);
        assert!(display.contains("[NO_INPUT_TARGET]"));
        assert!(display.contains("(hint:"));
    }

    #[test]
    fn json_round_trip() {
        let err = PortalError::surface_attach_failure("permission denied");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("SURFACE_ATTACH_FAILURE"));

        let back: PortalError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
