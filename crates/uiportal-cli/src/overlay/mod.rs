//! Live overlay visualization: annotated rectangles over the device UI.
//!
//! The overlay is split into a thread-safe [`registry`] of annotated
//! rectangles (the write side) and a render [`engine`] owning the drawable
//! surface (the read side). [`OverlayHandle`] is the public face exposed to
//! the dispatcher and to any owner component that wants to visualize a
//! freshly captured snapshot: registry mutations execute inline, surface
//! operations are marshalled onto the render thread.

pub mod draw;
pub mod engine;
pub mod registry;
pub mod surface;

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use uiportal_core::geometry::Rect;

use crate::overlay::engine::{Engine, EngineCommand, EngineShared, SurfaceState};
use crate::overlay::registry::{OverlayRegistry, Rgb};
use crate::overlay::surface::SurfaceFactory;

/// Overlay tuning knobs.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Frame dimensions in pixels.
    pub surface_size: (u32, u32),
    /// How long to wait after attach before declaring the surface ready.
    pub settle_delay: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            surface_size: (1080, 2400),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Start the overlay engine on its own render thread.
pub fn start(config: OverlayConfig, factory: SurfaceFactory) -> OverlayHandle {
    let registry = Arc::new(OverlayRegistry::new());
    let shared = Arc::new(EngineShared::new());
    let (tx, rx) = mpsc::channel();

    let engine = Engine::new(
        registry.clone(),
        factory,
        config.settle_delay,
        shared.clone(),
    );
    std::thread::Builder::new()
        .name("uiportal-overlay".to_string())
        .spawn(move || engine.run(rx))
        .expect("failed to spawn overlay render thread");

    OverlayHandle {
        registry,
        tx,
        shared,
    }
}

/// Handle to the overlay, safe to call from any thread.
///
/// Surface operations return `false` when the render thread is gone, which
/// the dispatcher reports as the overlay collaborator being unavailable.
#[derive(Clone)]
pub struct OverlayHandle {
    registry: Arc<OverlayRegistry>,
    tx: Sender<EngineCommand>,
    shared: Arc<EngineShared>,
}

impl OverlayHandle {
    pub fn show_overlay(&self) -> bool {
        self.tx.send(EngineCommand::Show).is_ok()
    }

    pub fn hide_overlay(&self) -> bool {
        self.tx.send(EngineCommand::Hide).is_ok()
    }

    pub fn refresh_overlay(&self) -> bool {
        self.tx.send(EngineCommand::Refresh).is_ok()
    }

    /// Register the readiness callback. Fires after the surface settles; if
    /// the surface is already ready it fires immediately (on the render
    /// thread either way).
    pub fn set_on_ready_callback(&self, callback: impl Fn() + Send + Sync + 'static) -> bool {
        self.tx
            .send(EngineCommand::SetReadyCallback(Arc::new(callback)))
            .is_ok()
    }

    /// Append an annotation; batched, does not redraw. Returns the index the
    /// registry assigned.
    pub fn add_element(
        &self,
        rect: Rect,
        kind: &str,
        text: &str,
        depth: i32,
        color: Option<Rgb>,
        index: Option<i32>,
    ) -> i32 {
        self.registry.add_element(rect, kind, text, depth, color, index)
    }

    pub fn clear_elements(&self) {
        self.registry.clear_elements();
    }

    pub fn element_count(&self) -> usize {
        self.registry.element_count()
    }

    pub fn position_offset_y(&self) -> i32 {
        self.registry.offset_y()
    }

    /// Re-correct every stored rectangle under the new vertical offset and
    /// request a redraw.
    pub fn set_position_offset_y(&self, offset: i32) -> bool {
        self.registry.set_offset_y(offset);
        self.refresh_overlay()
    }

    /// Current lifecycle state of the drawable surface.
    pub fn surface_state(&self) -> SurfaceState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state() == SurfaceState::Ready
    }

    /// Stop the render thread. Used on daemon shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::overlay::surface::mock::MockSurface;

    fn test_config() -> OverlayConfig {
        OverlayConfig {
            surface_size: (320, 640),
            settle_delay: Duration::from_millis(20),
        }
    }

    /// Poll until `predicate` holds or the timeout elapses.
    fn wait_until(predicate: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn show_settles_into_ready_and_fires_callback() {
        let (_state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        handle.set_on_ready_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));
        assert!(wait_until(
            || fired.load(Ordering::SeqCst) == 1,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn late_subscriber_fires_immediately() {
        let (_state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        handle.set_on_ready_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(wait_until(
            || fired.load(Ordering::SeqCst) == 1,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn hide_cancels_pending_ready() {
        let (_state, factory) = MockSurface::scripted();
        let handle = start(
            OverlayConfig {
                settle_delay: Duration::from_millis(60),
                ..test_config()
            },
            factory,
        );

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        handle.set_on_ready_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.show_overlay();
        handle.hide_overlay();

        // The stale readiness check must not fire after the hide.
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.surface_state(), SurfaceState::Absent);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // A fresh show still becomes ready.
        handle.show_overlay();
        assert!(wait_until(
            || fired.load(Ordering::SeqCst) == 1,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn attach_failure_is_retried_once() {
        let (state, factory) = MockSurface::scripted();
        state.attach_failures.store(1, Ordering::SeqCst);
        let handle = start(test_config(), factory);

        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));
        assert_eq!(state.attach_attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn persistent_attach_failure_is_non_fatal_and_self_heals() {
        let (state, factory) = MockSurface::scripted();
        state.attach_failures.store(2, Ordering::SeqCst);
        let handle = start(test_config(), factory);

        handle.show_overlay();
        assert!(wait_until(
            || state.attach_attempts.load(Ordering::SeqCst) == 2,
            Duration::from_secs(2)
        ));
        assert!(wait_until(
            || handle.surface_state() == SurfaceState::Absent,
            Duration::from_secs(2)
        ));

        // Both scripted failures are consumed; the next refresh self-heals.
        handle.refresh_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));
    }

    #[test]
    fn refresh_paints_entries_sorted_by_depth() {
        let (state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));

        // Same bounds, different depths: the deeper entry must paint last.
        let bounds = Rect::new(10, 10, 110, 90);
        handle.add_element(bounds, "Frame", "parent", 0, None, None);
        handle.add_element(bounds, "Button", "child", 5, None, None);
        handle.refresh_overlay();

        assert!(wait_until(
            || !state.frames.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        ));
        let frames = state.frames.lock().unwrap();
        let frame = frames.last().unwrap();
        let border = *frame.get_pixel(10, 50); // left edge, clear of the label
        let child_color = crate::overlay::registry::color_for_index(1);
        assert_eq!(border[0], child_color.r);
        assert_eq!(border[1], child_color.g);
        assert_eq!(border[2], child_color.b);
    }

    #[test]
    fn degenerate_entries_are_skipped_but_pass_succeeds() {
        let (state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));

        handle.add_element(Rect::new(50, 50, 50, 120), "View", "zero width", 0, None, None);
        handle.add_element(Rect::new(10, 10, 110, 90), "Button", "ok", 0, None, None);
        handle.refresh_overlay();

        assert!(wait_until(
            || !state.frames.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        ));
        let frames = state.frames.lock().unwrap();
        let frame = frames.last().unwrap();
        // The healthy entry still painted its border.
        assert!(frame.get_pixel(10, 50)[3] > 0);
        // Nothing painted along the degenerate entry's would-be column
        // outside the healthy rect.
        assert_eq!(frame.get_pixel(50, 110)[3], 0);
    }

    #[test]
    fn refresh_with_no_surface_self_heals() {
        let (_state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        handle.refresh_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));
    }

    #[test]
    fn surface_operations_fail_after_shutdown() {
        let (_state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);

        handle.shutdown();
        assert!(wait_until(
            || !handle.refresh_overlay(),
            Duration::from_secs(2)
        ));
        assert!(!handle.set_position_offset_y(10));
    }

    #[test]
    fn offset_translates_painted_rectangles() {
        let (state, factory) = MockSurface::scripted();
        let handle = start(test_config(), factory);
        handle.show_overlay();
        assert!(wait_until(|| handle.is_ready(), Duration::from_secs(2)));

        handle.add_element(Rect::new(20, 100, 120, 180), "View", "", 0, None, None);
        handle.set_position_offset_y(-50);

        assert!(wait_until(
            || !state.frames.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        ));
        let frames = state.frames.lock().unwrap();
        let frame = frames.last().unwrap();
        // Border now sits 50px higher.
        assert!(frame.get_pixel(20, 90)[3] > 0);
        assert_eq!(frame.get_pixel(20, 140)[3], 0);
    }
}
