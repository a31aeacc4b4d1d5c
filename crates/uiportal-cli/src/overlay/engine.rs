//! Overlay rendering engine.
//!
//! A dedicated render thread owns the drawable surface; every surface
//! mutation (create, attach, detach, paint) happens there. Callers talk to
//! the thread through [`EngineCommand`]s sent from
//! [`OverlayHandle`](crate::overlay::OverlayHandle).
//!
//! Surface lifecycle is an explicit state machine:
//!
//! ```text
//! Absent -> Creating -> Attached -> Ready
//!    ^         |            |
//!    +---------+------------+   (attach failure / hide / structural detach)
//! ```
//!
//! After a successful attach the engine schedules a readiness check one
//! settle delay later. A generation counter invalidates checks superseded by
//! a hide/show cycle, so a stale delayed check can never race a newer
//! surface. A failed check triggers at most one recreation attempt; after
//! that the engine gives up until the next show or refresh self-heals it.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::overlay::draw::{
    draw_bitmap_text, draw_rect_outline, fill_rect_alpha, rgba, text_height, text_width,
};
use crate::overlay::registry::{OverlayEntry, OverlayRegistry};
use crate::overlay::surface::{DrawSurface, SurfaceFactory};

/// Border stroke width in pixels.
const STROKE_WIDTH: u32 = 2;
/// Integer scale factor for the 8x8 label glyphs.
const LABEL_SCALE: u32 = 2;
/// Padding around the index label, pixels.
const LABEL_PADDING: i32 = 4;
/// Alpha of the label background tint.
const LABEL_BG_ALPHA: u8 = 200;

/// Retained readiness callback; may fire more than once across show cycles.
pub type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Commands marshalled onto the render thread.
pub(crate) enum EngineCommand {
    Show,
    Hide,
    Refresh,
    SetReadyCallback(ReadyCallback),
    Shutdown,
}

/// Where the drawable surface currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Absent,
    Creating,
    Attached,
    Ready,
}

/// State mirror readable from any thread.
pub(crate) struct EngineShared {
    state: Mutex<SurfaceState>,
}

impl EngineShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState::Absent),
        }
    }

    pub(crate) fn state(&self) -> SurfaceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, state: SurfaceState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// A scheduled post-attach readiness check.
struct PendingReady {
    due: Instant,
    generation: u64,
    /// True when this attach was already the one permitted recreation.
    recreated: bool,
}

pub(crate) struct Engine {
    registry: Arc<OverlayRegistry>,
    factory: SurfaceFactory,
    settle_delay: Duration,
    surface: Option<Box<dyn DrawSurface>>,
    ready_callback: Option<ReadyCallback>,
    pending_ready: Option<PendingReady>,
    generation: u64,
    shared: Arc<EngineShared>,
}

impl Engine {
    pub(crate) fn new(
        registry: Arc<OverlayRegistry>,
        factory: SurfaceFactory,
        settle_delay: Duration,
        shared: Arc<EngineShared>,
    ) -> Self {
        Self {
            registry,
            factory,
            settle_delay,
            surface: None,
            ready_callback: None,
            pending_ready: None,
            generation: 0,
            shared,
        }
    }

    /// Render loop. Exits when all handles are dropped or on `Shutdown`.
    pub(crate) fn run(mut self, rx: Receiver<EngineCommand>) {
        loop {
            let command = match self.pending_ready.as_ref().map(|p| p.due) {
                Some(due) => {
                    let now = Instant::now();
                    if due <= now {
                        None
                    } else {
                        match rx.recv_timeout(due - now) {
                            Ok(command) => Some(command),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                }
                None => match rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(EngineCommand::Show) => self.show(),
                Some(EngineCommand::Hide) => self.hide(),
                Some(EngineCommand::Refresh) => self.refresh(),
                Some(EngineCommand::SetReadyCallback(callback)) => {
                    let already_ready = self.shared.state() == SurfaceState::Ready;
                    self.ready_callback = Some(callback.clone());
                    if already_ready {
                        callback();
                    }
                }
                Some(EngineCommand::Shutdown) => break,
                None => self.run_pending_ready_check(),
            }
        }

        if let Some(mut surface) = self.surface.take() {
            surface.detach();
        }
        self.shared.set(SurfaceState::Absent);
    }

    fn fire_ready(&self) {
        if let Some(callback) = &self.ready_callback {
            callback();
        }
    }

    fn show(&mut self) {
        if let Some(surface) = self.surface.as_ref() {
            if surface.is_attached() {
                debug!("Overlay already exists and is attached");
                if self.shared.state() != SurfaceState::Ready {
                    self.shared.set(SurfaceState::Ready);
                    self.pending_ready = None;
                    self.fire_ready();
                }
                return;
            }
            warn!("Overlay exists but is not attached, recreating");
            self.hide();
        }
        self.create_and_attach(true);
    }

    fn create_and_attach(&mut self, first_attempt: bool) {
        self.shared.set(SurfaceState::Creating);
        self.generation += 1;
        let mut surface = (self.factory)();
        match surface.attach() {
            Ok(()) => {
                self.surface = Some(surface);
                self.shared.set(SurfaceState::Attached);
                self.pending_ready = Some(PendingReady {
                    due: Instant::now() + self.settle_delay,
                    generation: self.generation,
                    recreated: !first_attempt,
                });
                debug!(
                    "Overlay surface attached, readiness check in {:?}",
                    self.settle_delay
                );
            }
            Err(e) => {
                warn!("Error creating overlay: {}", e);
                self.surface = None;
                self.pending_ready = None;
                self.shared.set(SurfaceState::Absent);
                if first_attempt {
                    debug!("Retrying overlay creation once");
                    self.create_and_attach(false);
                }
            }
        }
    }

    fn hide(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.detach();
            debug!("Overlay removed");
        }
        // Invalidate any in-flight readiness check.
        self.generation += 1;
        self.pending_ready = None;
        self.shared.set(SurfaceState::Absent);
    }

    fn run_pending_ready_check(&mut self) {
        let Some(pending) = self.pending_ready.take() else {
            return;
        };
        if pending.generation != self.generation {
            // Superseded by a hide/show cycle after this check was scheduled.
            return;
        }
        if self.shared.state() == SurfaceState::Ready {
            return;
        }
        let attached = self
            .surface
            .as_ref()
            .map(|s| s.is_attached())
            .unwrap_or(false);
        if attached {
            self.shared.set(SurfaceState::Ready);
            self.fire_ready();
        } else if pending.recreated {
            warn!("Overlay not attached after recreation, giving up until next show");
            self.hide();
        } else {
            warn!("Overlay not properly attached after settle delay, recreating");
            self.hide();
            self.create_and_attach(false);
        }
    }

    fn refresh(&mut self) {
        if self.surface.is_none() {
            debug!("Cannot refresh overlay without a surface, showing first");
            self.show();
        }
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if !surface.is_attached() {
            warn!("Overlay surface detached, skipping redraw");
            return;
        }
        render_pass(&self.registry, surface.as_mut());
    }
}

/// One redraw: freeze the registry, sort by depth, paint every entry.
fn render_pass(registry: &OverlayRegistry, surface: &mut dyn DrawSurface) {
    let mut entries = registry.snapshot();
    let (width, height) = surface.size();
    let mut frame = RgbaImage::new(width, height);

    // Parents first so child borders are not occluded. Stable sort keeps
    // insertion order within a depth level.
    entries.sort_by_key(|e| e.depth);
    for entry in &entries {
        draw_entry(&mut frame, entry);
    }

    if let Err(e) = surface.present(&frame) {
        warn!("Overlay frame present failed: {}", e);
    }
}

fn draw_entry(frame: &mut RgbaImage, entry: &OverlayEntry) {
    if entry.rect.is_empty() {
        warn!(
            "Skipping element {} with invalid bounds ({})",
            entry.index, entry.rect
        );
        return;
    }

    let stroke = rgba(entry.color, 255);
    draw_rect_outline(
        frame,
        entry.rect.left,
        entry.rect.top,
        entry.rect.right,
        entry.rect.bottom,
        stroke,
        STROKE_WIDTH,
    );

    // Index label in the top-right corner, over a background tinted to match
    // the border color.
    let label = entry.index.to_string();
    let label_width = text_width(&label, LABEL_SCALE) as i32;
    let label_height = text_height(LABEL_SCALE) as i32;
    let text_x = entry.rect.right - label_width - LABEL_PADDING;
    let text_y = entry.rect.top + LABEL_PADDING;
    fill_rect_alpha(
        frame,
        text_x - LABEL_PADDING,
        text_y - LABEL_PADDING,
        text_x + label_width + LABEL_PADDING,
        text_y + label_height + LABEL_PADDING,
        rgba(entry.color, LABEL_BG_ALPHA),
    );
    draw_bitmap_text(
        frame,
        text_x,
        text_y,
        &label,
        Rgba([255, 255, 255, 255]),
        LABEL_SCALE,
    );
}
