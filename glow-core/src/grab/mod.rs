//! Screen-region capture: pixels in, one color per LED out.
//!
//! ```text
//! FramebufferSource ──► FramebufferGrabber ─┐
//!                                           │ capture_all(regions)
//! (other CaptureBackend variants) ──────────┤
//!                                           ▼
//!                                    GrabScheduler ──► GrabEvent
//!                                    (policy, change     (colors,
//!                                     detection, rate)    rate)
//! ```
//!
//! | Module       | Purpose                                        |
//! |--------------|------------------------------------------------|
//! | `average`    | Region-to-color reduction over raw pixels      |
//! | `geometry`   | Clipping + width alignment of capture rects    |
//! | `backend`    | Capture capability trait + variant registry    |
//! | `framebuffer`| Linux framebuffer-device backend               |
//! | `scheduler`  | Timer loop, policies, change detection         |

pub mod average;
pub mod backend;
pub mod framebuffer;
pub mod geometry;
pub mod scheduler;

// ── Re-exports ───────────────────────────────────────────────────

pub use average::{AverageResult, average_colors, average_region};
pub use backend::{BackendCtor, BackendRegistry, CaptureBackend, PlatformTag, default_registry};
pub use framebuffer::{FbDevice, FramebufferGrabber, FramebufferSource};
pub use geometry::clip_and_align;
pub use scheduler::{GrabCommand, GrabEvent, GrabScheduler};
