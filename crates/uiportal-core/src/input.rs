//! Input payload decoding for keyboard endpoints.
//!
//! Text reaches the daemon opaquely encoded: base64 on the keyboard-bridge
//! path, hex on the direct focused-element path. Decoding happens here, at
//! the dispatcher boundary, so a malformed payload becomes a
//! [`PortalError::decode_error`] the caller can distinguish from "no focused
//! field" and "bridge unavailable".

use base64::{engine::general_purpose, Engine as _};

use crate::error::PortalError;

/// Decode a base64-encoded UTF-8 text payload.
pub fn decode_base64_text(payload: &str) -> Result<String, PortalError> {
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| PortalError::decode_error("base64", e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|_| PortalError::decode_error("base64", "decoded bytes are not valid UTF-8"))
}

/// Decode a hex-encoded UTF-8 text payload.
pub fn decode_hex_text(payload: &str) -> Result<String, PortalError> {
    let bytes = hex::decode(payload.trim())
        .map_err(|e| PortalError::decode_error("hex", e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|_| PortalError::decode_error("hex", "decoded bytes are not valid UTF-8"))
}

/// Map a named key to its Android key code.
///
/// The wire protocol carries numeric codes only; this mapping exists so CLI
/// users can write `uiportal key Enter` instead of memorizing code 66.
/// Returns None for unrecognized names.
pub fn key_code_for_name(name: &str) -> Option<i32> {
    let code = match name.to_ascii_lowercase().as_str() {
        "home" => 3,
        "back" => 4,
        "up" => 19,
        "down" => 20,
        "left" => 21,
        "right" => 22,
        "volumeup" | "volume_up" => 24,
        "volumedown" | "volume_down" => 25,
        "power" => 26,
        "tab" => 61,
        "space" => 62,
        "enter" => 66,
        "delete" | "del" | "backspace" => 67,
        "escape" | "esc" => 111,
        "menu" => 82,
        "appswitch" | "app_switch" | "recents" => 187,
        _ => return None,
    };
    Some(code)
}

/// Resolve a key argument: either a named key or a raw numeric code.
pub fn parse_key(arg: &str) -> Result<i32, PortalError> {
    if let Ok(code) = arg.parse::<i32>() {
        return Ok(code);
    }
    key_code_for_name(arg).ok_or_else(|| {
        PortalError::invalid_input(format!(
            "Unknown key: '{}'. Try a named key like Enter, Tab, Back, Home, or a numeric key code",
            arg
        ))
    })
}
