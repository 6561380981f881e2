//! The capture capability boundary and the backend registry.
//!
//! Each platform pixel source (framebuffer device, desktop
//! duplication, X11) is one [`CaptureBackend`] implementation.
//! Rather than selecting a variant with build flags, the registry is
//! populated at startup from a table of `(PlatformTag, constructor)`
//! entries: absence of a platform variant is a registration-time
//! fact, and requesting an unregistered variant falls back to the
//! default one.

use std::time::Duration;

use tracing::warn;

use crate::error::GlowError;
use crate::types::{Region, Rgb};

// ── CaptureBackend ───────────────────────────────────────────────

/// A concrete pixel-source driver.
///
/// Only one backend is active at a time and backends need not be
/// reentrant; the scheduler fully stops the outgoing backend before
/// activating the incoming one.
pub trait CaptureBackend: Send {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Connect to the pixel source.
    fn open(&mut self) -> Result<(), GlowError>;

    /// Release the pixel source.
    fn close(&mut self);

    /// Capture one frame and reduce every region to a color.
    ///
    /// Returns one color per region, index-aligned. Disabled regions
    /// report black without consuming a captured sample. A failure
    /// means the whole cycle produced nothing; the scheduler skips
    /// forwarding and retries on the next tick.
    fn capture_all(&mut self, regions: &[Region]) -> Result<Vec<Rgb>, GlowError>;

    /// Desired poll interval, for backends that pace themselves.
    /// Timer-driven backends ignore it; the scheduler owns the timer.
    fn set_grab_interval(&mut self, _interval: Duration) {}
}

// ── PlatformTag ──────────────────────────────────────────────────

/// Identifies a capture backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformTag {
    /// Linux framebuffer device (`/dev/fb*`).
    Framebuffer,
    /// Windows desktop duplication.
    DesktopDuplication,
    /// X11 root-window capture.
    X11,
}

// ── BackendRegistry ──────────────────────────────────────────────

/// Constructor for one backend variant.
pub type BackendCtor = Box<dyn Fn() -> Box<dyn CaptureBackend> + Send + Sync>;

/// Startup-populated table of available backend variants.
///
/// The first registered entry is the fallback used when an
/// unsupported variant is requested.
pub struct BackendRegistry {
    table: Vec<(PlatformTag, BackendCtor)>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Register a variant. Re-registering a tag replaces its entry.
    pub fn register(&mut self, tag: PlatformTag, ctor: BackendCtor) {
        if let Some(entry) = self.table.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = ctor;
        } else {
            self.table.push((tag, ctor));
        }
    }

    /// Whether a variant is available.
    pub fn supports(&self, tag: PlatformTag) -> bool {
        self.table.iter().any(|(t, _)| *t == tag)
    }

    /// Construct the backend for `tag`, falling back to the default
    /// variant when `tag` is not registered.
    ///
    /// Returns `None` only when the registry is empty.
    pub fn query(&self, tag: PlatformTag) -> Option<Box<dyn CaptureBackend>> {
        if let Some((_, ctor)) = self.table.iter().find(|(t, _)| *t == tag) {
            return Some(ctor());
        }
        let (fallback, ctor) = self.table.first()?;
        warn!(
            "unsupported capture backend {:?} for this platform, using {:?}",
            tag, fallback
        );
        Some(ctor())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry shipped with this crate: the framebuffer variant,
/// reading `/dev/fb0`.
pub fn default_registry() -> BackendRegistry {
    use crate::grab::framebuffer::{FbDevice, FramebufferGrabber};

    let mut registry = BackendRegistry::new();
    registry.register(
        PlatformTag::Framebuffer,
        Box::new(|| Box::new(FramebufferGrabber::new(Box::new(FbDevice::default())))),
    );
    registry
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedBackend(&'static str);

    impl CaptureBackend for NamedBackend {
        fn name(&self) -> &'static str {
            self.0
        }
        fn open(&mut self) -> Result<(), GlowError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn capture_all(&mut self, regions: &[Region]) -> Result<Vec<Rgb>, GlowError> {
            Ok(vec![Rgb::BLACK; regions.len()])
        }
    }

    #[test]
    fn query_returns_registered_variant() {
        let mut registry = BackendRegistry::new();
        registry.register(PlatformTag::Framebuffer, Box::new(|| Box::new(NamedBackend("fb"))));
        registry.register(PlatformTag::X11, Box::new(|| Box::new(NamedBackend("x11"))));

        assert_eq!(registry.query(PlatformTag::X11).unwrap().name(), "x11");
        assert_eq!(registry.query(PlatformTag::Framebuffer).unwrap().name(), "fb");
    }

    #[test]
    fn unsupported_tag_falls_back_to_default() {
        let mut registry = BackendRegistry::new();
        registry.register(PlatformTag::Framebuffer, Box::new(|| Box::new(NamedBackend("fb"))));

        assert!(!registry.supports(PlatformTag::DesktopDuplication));
        let backend = registry.query(PlatformTag::DesktopDuplication).unwrap();
        assert_eq!(backend.name(), "fb");
    }

    #[test]
    fn empty_registry_yields_none() {
        let registry = BackendRegistry::new();
        assert!(registry.query(PlatformTag::Framebuffer).is_none());
    }

    #[test]
    fn default_registry_has_framebuffer() {
        let registry = default_registry();
        assert!(registry.supports(PlatformTag::Framebuffer));
    }
}
