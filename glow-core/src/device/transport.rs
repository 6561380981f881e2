//! The packet-oriented transport boundary to physical device units.
//!
//! The protocol layer never talks to USB directly; it sees a set of
//! opaque [`UnitHandle`]s and fixed 61-byte control transfers in each
//! direction. Timeouts are the transport's responsibility.

use async_trait::async_trait;

use crate::device::frame::REPORT_SIZE;
use crate::error::GlowError;

// ── UnitHandle ───────────────────────────────────────────────────

/// Opaque handle to one physical device unit.
///
/// Handles are only valid for the enumeration that produced them; a
/// reopen invalidates all previously returned handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(usize);

impl UnitHandle {
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    pub const fn id(self) -> usize {
        self.0
    }
}

// ── DeviceTransport ──────────────────────────────────────────────

/// A control-transfer channel to a set of physical units.
#[async_trait]
pub trait DeviceTransport: Send {
    /// Enumerate and claim every attached unit.
    ///
    /// An empty list is not an error at this layer; the protocol
    /// treats it as "device not found".
    async fn open_all(&mut self) -> Result<Vec<UnitHandle>, GlowError>;

    /// Send one 61-byte report to a unit. Returns `false` on any
    /// transfer failure; retry policy lives above this boundary.
    async fn control_write(&mut self, unit: UnitHandle, report: &[u8; REPORT_SIZE]) -> bool;

    /// Read one 61-byte report from a unit.
    async fn control_read(&mut self, unit: UnitHandle) -> Option<[u8; REPORT_SIZE]>;

    /// Release every claimed unit.
    async fn close_all(&mut self);
}
