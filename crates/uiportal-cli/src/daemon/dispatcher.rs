//! Command/query dispatcher.
//!
//! Maps each inbound endpoint to exactly one handler and terminates every
//! path in exactly one [`ResponseEnvelope`]. This is the single point where
//! the process-boundary contract is enforced: collaborator failures,
//! malformed payloads, unknown endpoints, and even handler panics all become
//! error envelopes; nothing escapes to the transport as a fault.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, error};

use uiportal_core::error::PortalError;
use uiportal_core::input::{decode_base64_text, decode_hex_text};
use uiportal_core::protocol::{Endpoint, Request, ResponseEnvelope, WriteReceipt};
use uiportal_core::tree::{serialize_forest, visit_snapshots, ElementSnapshot};

use crate::daemon::providers::{AccessibilityProvider, InputBridge};
use crate::overlay::OverlayHandle;

pub struct Dispatcher {
    provider: Arc<dyn AccessibilityProvider>,
    bridge: Arc<dyn InputBridge>,
    overlay: OverlayHandle,
    max_tree_depth: usize,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn AccessibilityProvider>,
        bridge: Arc<dyn InputBridge>,
        overlay: OverlayHandle,
        max_tree_depth: usize,
    ) -> Self {
        Self {
            provider,
            bridge,
            overlay,
            max_tree_depth,
        }
    }

    /// Dispatch one request. Infallible by contract: always an envelope.
    pub fn dispatch(&self, request: &Request) -> ResponseEnvelope {
        debug!("Dispatching endpoint: {}", request.endpoint);
        match catch_unwind(AssertUnwindSafe(|| self.route(request))) {
            Ok(result) => ResponseEnvelope::from(result),
            Err(_) => {
                error!("Handler for '{}' panicked", request.endpoint);
                ResponseEnvelope::failure(&PortalError::internal(
                    "Handler panicked; see daemon logs",
                ))
            }
        }
    }

    fn route(&self, request: &Request) -> Result<Value, PortalError> {
        let Some(endpoint) = Endpoint::parse(&request.endpoint) else {
            return Err(PortalError::unknown_endpoint(&request.endpoint));
        };
        let payload = request.payload.as_ref();
        match endpoint {
            Endpoint::Ping => Ok(Value::String("pong".to_string())),
            Endpoint::A11yTree => self.a11y_tree(),
            Endpoint::PhoneState => self.phone_state(),
            Endpoint::State => self.state(),
            Endpoint::KeyboardInput => self.keyboard_input(payload),
            Endpoint::KeyboardClear => self.keyboard_clear(),
            Endpoint::KeyboardKey => self.keyboard_key(payload),
            Endpoint::KeyboardSetText => self.keyboard_set_text(payload),
            Endpoint::OverlayOffset => self.overlay_offset(payload),
            // The transport server observes this endpoint and begins shutdown;
            // the acknowledgement envelope still comes from here.
            Endpoint::Shutdown => Ok(Value::String("Daemon shutting down".to_string())),
        }
    }

    /// Capture, serialize, and visualize the current element forest.
    fn capture_tree(&self) -> Result<Vec<ElementSnapshot>, PortalError> {
        let forest = self.provider.visible_elements()?;
        let snapshots = serialize_forest(&forest, self.max_tree_depth)?;
        self.visualize(&snapshots);
        Ok(snapshots)
    }

    /// Replace the overlay's annotations with this snapshot, reusing the
    /// serializer's indices so drawn labels match the serialized tree.
    fn visualize(&self, snapshots: &[ElementSnapshot]) {
        self.overlay.clear_elements();
        visit_snapshots(snapshots, &mut |snapshot, depth| {
            self.overlay.add_element(
                snapshot.bounds,
                &snapshot.class_name,
                &snapshot.text,
                depth as i32,
                None,
                Some(snapshot.index),
            );
        });
        if !self.overlay.refresh_overlay() {
            debug!("Overlay not running, skipping visualization refresh");
        }
    }

    fn a11y_tree(&self) -> Result<Value, PortalError> {
        let snapshots = self.capture_tree()?;
        serde_json::to_value(&snapshots)
            .map_err(|e| PortalError::internal(format!("tree serialization failed: {}", e)))
    }

    fn phone_state(&self) -> Result<Value, PortalError> {
        let state = self.provider.phone_state()?;
        serde_json::to_value(&state)
            .map_err(|e| PortalError::internal(format!("state serialization failed: {}", e)))
    }

    fn state(&self) -> Result<Value, PortalError> {
        let tree = self.capture_tree()?;
        let phone_state = self.provider.phone_state()?;
        Ok(json!({
            "a11y_tree": tree,
            "phone_state": phone_state,
        }))
    }

    fn keyboard_input(&self, payload: Option<&Map<String, Value>>) -> Result<Value, PortalError> {
        if !self.bridge.is_connected() {
            return Err(PortalError::collaborator_unavailable("Keyboard bridge"));
        }
        if !self.bridge.has_input_connection() {
            return Err(PortalError::no_input_target());
        }
        let encoded = payload_str(payload, "base64_text")?;
        let text = decode_base64_text(encoded)?;
        let append = payload_bool(payload, "append");
        if self.bridge.input_text(&text, append) {
            let mode = if append { "appended" } else { "set" };
            Ok(receipt(format!("Text {} via keyboard - '{}'", mode, text)))
        } else {
            Err(PortalError::internal("Keyboard bridge rejected text input"))
        }
    }

    fn keyboard_clear(&self) -> Result<Value, PortalError> {
        if !self.bridge.is_connected() {
            return Err(PortalError::collaborator_unavailable("Keyboard bridge"));
        }
        if !self.bridge.has_input_connection() {
            return Err(PortalError::no_input_target());
        }
        if self.bridge.clear_text() {
            Ok(receipt("Text cleared via keyboard".to_string()))
        } else {
            Err(PortalError::internal("Keyboard bridge rejected clear"))
        }
    }

    fn keyboard_key(&self, payload: Option<&Map<String, Value>>) -> Result<Value, PortalError> {
        if !self.bridge.is_connected() {
            return Err(PortalError::collaborator_unavailable("Keyboard bridge"));
        }
        if !self.bridge.has_input_connection() {
            return Err(PortalError::no_input_target());
        }
        let key_code = payload_i32(payload, "key_code")?;
        if self.bridge.send_key_event(key_code) {
            Ok(receipt(format!(
                "Key event sent via keyboard - code: {}",
                key_code
            )))
        } else {
            Err(PortalError::internal("Keyboard bridge rejected key event"))
        }
    }

    /// Direct text set on the focused element, bypassing the IME.
    fn keyboard_set_text(
        &self,
        payload: Option<&Map<String, Value>>,
    ) -> Result<Value, PortalError> {
        let encoded = payload_str(payload, "hex_text")?;
        let text = decode_hex_text(encoded)?;
        let append = payload_bool(payload, "append");

        let mut target = self
            .provider
            .find_focus()?
            .ok_or_else(PortalError::no_input_target)?;

        let final_text = if append {
            format!("{}{}", target.text().unwrap_or_default(), text)
        } else {
            text.clone()
        };
        if target.set_text(&final_text) {
            let mode = if append { "appended" } else { "set" };
            Ok(receipt(format!("Text {} - '{}'", mode, text)))
        } else {
            Err(PortalError::internal("Focused element rejected text input"))
        }
    }

    fn overlay_offset(&self, payload: Option<&Map<String, Value>>) -> Result<Value, PortalError> {
        let offset = payload_i32(payload, "offset")?;
        if self.overlay.set_position_offset_y(offset) {
            Ok(receipt(format!("Overlay offset updated to {}", offset)))
        } else {
            Err(PortalError::collaborator_unavailable("Overlay"))
        }
    }
}

/// Render a successful write outcome in its reply-locator form.
fn receipt(message: String) -> Value {
    Value::String(WriteReceipt::success(message).as_query_string())
}

fn payload_str<'a>(
    payload: Option<&'a Map<String, Value>>,
    key: &str,
) -> Result<&'a str, PortalError> {
    payload
        .and_then(|map| map.get(key))
        .and_then(Value::as_str)
        .ok_or_else(|| PortalError::invalid_input(format!("No {} provided", key)))
}

fn payload_i32(payload: Option<&Map<String, Value>>, key: &str) -> Result<i32, PortalError> {
    let value = payload
        .and_then(|map| map.get(key))
        .and_then(Value::as_i64)
        .ok_or_else(|| PortalError::invalid_input(format!("No {} provided", key)))?;
    i32::try_from(value)
        .map_err(|_| PortalError::invalid_input(format!("{} out of range: {}", key, value)))
}

fn payload_bool(payload: Option<&Map<String, Value>>, key: &str) -> bool {
    payload
        .and_then(|map| map.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
