//! # glow-core
//!
//! Core library for the glow ambient-LED daemon.
//!
//! This crate contains:
//! - **Types**: `Rgb`, `Rect`, `Region`, `PixelFormat`, `ScreenInfo`
//! - **Grab**: screen capture backends, region clipping, pixel
//!   averaging, and the `GrabScheduler` driving the capture cycle
//! - **Device**: the LED controller protocol — `CommandFrame`
//!   packing, the `DeviceTransport` seam, the `UsbTransport` HID
//!   implementation, and the `LedDevice` driver with retry and
//!   keepalive
//! - **Error**: `GlowError` — typed, `thiserror`-based error
//!   hierarchy
//!
//! The flow is one-directional: a capture backend fills pixel
//! buffers, the scheduler averages them into one color per region
//! and publishes `GrabEvent`s, and the daemon forwards each color
//! sequence to the `LedDevice`.

pub mod device;
pub mod error;
pub mod grab;
pub mod types;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use device::{
    CommandFrame, DeviceConfig, DeviceTransport, LEDS_PER_UNIT, LedDevice, REPORT_SIZE,
    UnitHandle, UsbTransport,
};
pub use error::GlowError;
pub use grab::{
    BackendRegistry, CaptureBackend, FbDevice, FramebufferGrabber, FramebufferSource, GrabCommand,
    GrabEvent, GrabScheduler, PlatformTag, average_colors, average_region, clip_and_align,
    default_registry,
};
pub use types::{PixelFormat, Rect, Region, Rgb, ScreenInfo};
