//! Mutable registry of annotated element rectangles.
//!
//! The registry is the single shared resource between the write path (the
//! dispatcher and any owner component feeding a fresh UI snapshot) and the
//! render path. One mutex guards entries, the auto-increment index counter,
//! and the current vertical offset together, so offset restitching is atomic
//! with respect to concurrent adds. The render thread never iterates the
//! live list; it takes a defensive copy via [`OverlayRegistry::snapshot`].

use std::sync::Mutex;

use uiportal_core::geometry::Rect;

/// An RGB color, full opacity implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Eight visually distinct annotation colors.
pub const PALETTE: [Rgb; 8] = [
    Rgb::new(0, 122, 255),  // blue
    Rgb::new(255, 45, 85),  // red
    Rgb::new(52, 199, 89),  // green
    Rgb::new(255, 149, 0),  // orange
    Rgb::new(175, 82, 222), // purple
    Rgb::new(255, 204, 0),  // yellow
    Rgb::new(90, 200, 250), // light blue
    Rgb::new(88, 86, 214),  // indigo
];

/// Color assignment is a pure function of the element index.
pub fn color_for_index(index: i32) -> Rgb {
    PALETTE[index.rem_euclid(PALETTE.len() as i32) as usize]
}

/// One annotated rectangle awaiting paint.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
    /// Stored already corrected by the vertical offset in force at add time.
    pub rect: Rect,
    pub kind: String,
    pub text: String,
    pub depth: i32,
    pub color: Rgb,
    pub index: i32,
}

struct RegistryInner {
    entries: Vec<OverlayEntry>,
    next_index: i32,
    offset_y: i32,
}

/// Thread-safe element annotation store.
pub struct OverlayRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for OverlayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: Vec::new(),
                next_index: 0,
                offset_y: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A panicked writer leaves entries structurally intact (Vec push is
        // the last mutation), so recover rather than poison the render loop.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an annotation. The rectangle is corrected by the current
    /// vertical offset before storage; color defaults to
    /// `palette[index mod 8]` when not explicit. Returns the assigned index.
    ///
    /// Deliberately does not trigger a redraw: callers batch a whole snapshot
    /// of adds, then call refresh once.
    pub fn add_element(
        &self,
        rect: Rect,
        kind: &str,
        text: &str,
        depth: i32,
        color: Option<Rgb>,
        index: Option<i32>,
    ) -> i32 {
        let mut inner = self.lock();
        let assigned = match index {
            Some(explicit) => {
                inner.next_index = inner.next_index.max(explicit + 1);
                explicit
            }
            None => {
                let i = inner.next_index;
                inner.next_index += 1;
                i
            }
        };
        let corrected = rect.offset(0, inner.offset_y);
        inner.entries.push(OverlayEntry {
            rect: corrected,
            kind: kind.to_string(),
            text: text.to_string(),
            depth,
            color: color.unwrap_or_else(|| color_for_index(assigned)),
            index: assigned,
        });
        assigned
    }

    /// Empty the registry and reset the auto-increment counter to 0.
    pub fn clear_elements(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.next_index = 0;
    }

    pub fn element_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn offset_y(&self) -> i32 {
        self.lock().offset_y
    }

    /// Move every stored rectangle from the old vertical offset to `new`:
    /// strip the old correction, apply the new one. Color, index, and depth
    /// are untouched; the net effect is a pure vertical translation. The
    /// whole restitch happens under one lock, so no redraw can observe a
    /// half-corrected registry.
    pub fn set_offset_y(&self, new: i32) {
        let mut inner = self.lock();
        let old = inner.offset_y;
        for entry in &mut inner.entries {
            entry.rect = entry.rect.offset(0, -old).offset(0, new);
        }
        inner.offset_y = new;
    }

    /// Defensive copy for a render pass. The pass sees the registry frozen
    /// at this moment; later mutation does not interfere.
    pub fn snapshot(&self) -> Vec<OverlayEntry> {
        self.lock().entries.clone()
    }
}
