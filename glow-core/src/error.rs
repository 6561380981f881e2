//! Domain-specific error types for the glow pipeline.
//!
//! All fallible operations return `Result<T, GlowError>`.
//! Capture errors mean "this cycle produced no frame" and are retried
//! on the next tick; device errors surface only after the immediate
//! retry and reopen paths are exhausted.

use thiserror::Error;

/// The canonical error type for the glow pipeline.
#[derive(Debug, Error)]
pub enum GlowError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The active backend could not produce a frame this cycle.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The source reported a color depth the averager cannot decode.
    #[error("unsupported pixel depth: {bits_per_pixel} bpp")]
    UnsupportedPixelFormat { bits_per_pixel: u32 },

    // ── Device Errors ────────────────────────────────────────────
    /// Enumeration found no attached device units.
    #[error("no LED device units found")]
    DeviceNotFound,

    /// A transport operation failed after retry and reopen.
    #[error("device I/O failed on unit {unit}")]
    DeviceIo { unit: usize },

    /// Caller supplied more colors than the attached units can hold.
    #[error("{count} colors exceed device capacity {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },

    // ── Infrastructure Errors ────────────────────────────────────
    /// The OS I/O layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The USB stack reported an error during enumeration.
    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),
}
