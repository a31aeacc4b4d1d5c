//! Collaborator interfaces consumed by the dispatcher.
//!
//! The UI-accessibility walker and the input-method bridge live outside this
//! crate. The dispatcher receives them as trait objects at construction
//! (explicit dependency injection, no process-wide singletons), so a host
//! process embeds real implementations while the stand-alone binary runs
//! with disconnected defaults that answer "unavailable".

use std::sync::Arc;

use uiportal_core::error::PortalError;
use uiportal_core::tree::{ElementNode, PhoneState};

/// A focused input element the provider located, with text-retrieval and
/// set-text capability.
pub trait FocusTarget: Send {
    /// Current text content of the focused element, if readable.
    fn text(&self) -> Option<String>;

    /// Replace the element's text. Returns false if the action was rejected.
    fn set_text(&mut self, text: &str) -> bool;
}

/// The UI-accessibility walker.
///
/// Methods fail with [`PortalError::collaborator_unavailable`] when the
/// walker cannot reach the device; the dispatcher forwards that as an error
/// envelope without further wrapping.
pub trait AccessibilityProvider: Send + Sync {
    /// Capture the forest of currently visible UI elements.
    fn visible_elements(&self) -> Result<Vec<ElementNode>, PortalError>;

    /// Capture device and focus state.
    fn phone_state(&self) -> Result<PhoneState, PortalError>;

    /// Locate the element holding input focus, if any.
    fn find_focus(&self) -> Result<Option<Box<dyn FocusTarget>>, PortalError>;
}

/// The on-screen keyboard bridge. Receives already-decoded text.
pub trait InputBridge: Send + Sync {
    /// Whether the bridge itself is reachable (the IME is running).
    fn is_connected(&self) -> bool;

    /// Whether the keyboard currently has an input connection to a focused
    /// field. Distinct from [`InputBridge::is_connected`]: a running IME with
    /// no focused field answers true/false respectively.
    fn has_input_connection(&self) -> bool;

    /// Commit text into the focused field, appending or replacing.
    fn input_text(&self, text: &str, append: bool) -> bool;

    /// Clear all text in the focused field.
    fn clear_text(&self) -> bool;

    /// Send a key event by key code.
    fn send_key_event(&self, key_code: i32) -> bool;
}

/// Provider stand-in for a daemon with no walker connected.
pub struct DisconnectedProvider;

impl AccessibilityProvider for DisconnectedProvider {
    fn visible_elements(&self) -> Result<Vec<ElementNode>, PortalError> {
        Err(PortalError::collaborator_unavailable("Accessibility provider"))
    }

    fn phone_state(&self) -> Result<PhoneState, PortalError> {
        Err(PortalError::collaborator_unavailable("Accessibility provider"))
    }

    fn find_focus(&self) -> Result<Option<Box<dyn FocusTarget>>, PortalError> {
        Err(PortalError::collaborator_unavailable("Accessibility provider"))
    }
}

/// Bridge stand-in for a daemon with no IME connected.
pub struct DisconnectedBridge;

impl InputBridge for DisconnectedBridge {
    fn is_connected(&self) -> bool {
        false
    }

    fn has_input_connection(&self) -> bool {
        false
    }

    fn input_text(&self, _text: &str, _append: bool) -> bool {
        false
    }

    fn clear_text(&self) -> bool {
        false
    }

    fn send_key_event(&self, _key_code: i32) -> bool {
        false
    }
}

/// Disconnected defaults for the stand-alone binary.
pub fn disconnected() -> (Arc<dyn AccessibilityProvider>, Arc<dyn InputBridge>) {
    (Arc::new(DisconnectedProvider), Arc::new(DisconnectedBridge))
}
