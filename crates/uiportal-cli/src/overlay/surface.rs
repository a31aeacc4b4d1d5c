//! Drawable surface abstraction for the overlay engine.
//!
//! The engine owns exactly one surface at a time and is the only component
//! holding a reference to it. Surfaces are recreated through a factory so a
//! failed attach can be retried with a fresh instance.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::debug;
use uiportal_core::error::PortalError;

/// A surface the overlay engine can attach, paint, and detach.
///
/// All calls happen on the render thread; implementations do not need
/// internal locking.
pub trait DrawSurface: Send {
    /// Attach the surface so frames become visible. Idempotent.
    fn attach(&mut self) -> Result<(), PortalError>;

    /// Detach and release the surface. Idempotent.
    fn detach(&mut self);

    /// Whether the surface is still structurally attached. May flip to
    /// false behind the engine's back (e.g. the sink was torn down); the
    /// engine re-verifies on every show.
    fn is_attached(&self) -> bool;

    /// Frame dimensions in pixels.
    fn size(&self) -> (u32, u32);

    /// Publish a finished frame.
    fn present(&mut self, frame: &RgbaImage) -> Result<(), PortalError>;
}

/// Factory for fresh surfaces, used on create and on recreate-after-failure.
pub type SurfaceFactory = Box<dyn Fn() -> Box<dyn DrawSurface> + Send>;

/// Production surface: publishes each frame as a PNG at a fixed path.
///
/// Viewers (or a compositor picking the file up) watch the path; writes go
/// through a temp file and an atomic rename so no reader observes a torn
/// frame.
pub struct PngSurface {
    path: PathBuf,
    size: (u32, u32),
    attached: bool,
}

impl PngSurface {
    pub fn new(path: impl Into<PathBuf>, size: (u32, u32)) -> Self {
        Self {
            path: path.into(),
            size,
            attached: false,
        }
    }

    /// A factory producing surfaces at the given path and size.
    pub fn factory(path: impl AsRef<Path>, size: (u32, u32)) -> SurfaceFactory {
        let path = path.as_ref().to_path_buf();
        Box::new(move || Box::new(PngSurface::new(path.clone(), size)))
    }
}

impl DrawSurface for PngSurface {
    fn attach(&mut self) -> Result<(), PortalError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PortalError::surface_attach_failure(format!(
                    "cannot create frame directory {:?}: {}",
                    parent, e
                ))
            })?;
        }
        self.attached = true;
        debug!("Overlay surface attached at {:?}", self.path);
        Ok(())
    }

    fn detach(&mut self) {
        if self.attached {
            self.attached = false;
            // Leave no stale frame behind; a missing file reads as "hidden".
            let _ = std::fs::remove_file(&self.path);
            debug!("Overlay surface detached");
        }
    }

    fn is_attached(&self) -> bool {
        self.attached && self.path.parent().map(Path::is_dir).unwrap_or(true)
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn present(&mut self, frame: &RgbaImage) -> Result<(), PortalError> {
        let tmp = self.path.with_extension("png.tmp");
        frame
            .save_with_format(&tmp, image::ImageFormat::Png)
            .map_err(|e| PortalError::internal(format!("frame encode failed: {}", e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| PortalError::internal(format!("frame publish failed: {}", e)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_surface_attach_creates_directory_and_present_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames").join("overlay.png");
        let mut surface = PngSurface::new(&path, (32, 16));

        surface.attach().unwrap();
        assert!(surface.is_attached());

        let frame = RgbaImage::new(32, 16);
        surface.present(&frame).unwrap();
        assert!(path.exists());
        // No torn temp file left behind
        assert!(!path.with_extension("png.tmp").exists());
    }

    #[test]
    fn png_surface_detach_removes_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.png");
        let mut surface = PngSurface::new(&path, (8, 8));

        surface.attach().unwrap();
        surface.present(&RgbaImage::new(8, 8)).unwrap();
        surface.detach();

        assert!(!surface.is_attached());
        assert!(!path.exists());
    }
}
