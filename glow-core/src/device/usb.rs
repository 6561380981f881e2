//! USB transport to the LED controller hardware.
//!
//! Control transfers follow the HID class protocol the device
//! firmware speaks: `SET_REPORT` out, `GET_REPORT` in, feature
//! report 2, fixed 61-byte buffers, 500 ms deadline per transfer.
//! Deadlines keep each call bounded, so the async trait methods run
//! the transfers inline.

use std::time::Duration;

use async_trait::async_trait;
use rusb::{DeviceHandle, GlobalContext};
use tracing::{debug, warn};

use crate::device::frame::REPORT_SIZE;
use crate::device::transport::{DeviceTransport, UnitHandle};
use crate::error::GlowError;

/// USB identity of the LED controller.
pub const USB_VENDOR_ID: u16 = 0x03EB;
pub const USB_PRODUCT_ID: u16 = 0x204F;

const REQ_SET_REPORT: u8 = 0x09;
const REQ_GET_REPORT: u8 = 0x01;
/// wValue: feature report, report id 2.
const REPORT_VALUE: u16 = 2 << 8;
const TRANSFER_TIMEOUT: Duration = Duration::from_millis(500);

// ── UsbTransport ─────────────────────────────────────────────────

/// rusb-backed [`DeviceTransport`] over all attached controller
/// units.
pub struct UsbTransport {
    handles: Vec<DeviceHandle<GlobalContext>>,
}

impl UsbTransport {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    fn handle(&self, unit: UnitHandle) -> Option<&DeviceHandle<GlobalContext>> {
        self.handles.get(unit.id())
    }
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceTransport for UsbTransport {
    async fn open_all(&mut self) -> Result<Vec<UnitHandle>, GlowError> {
        self.handles.clear();

        let devices = rusb::devices()?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };
            if descriptor.vendor_id() != USB_VENDOR_ID
                || descriptor.product_id() != USB_PRODUCT_ID
            {
                continue;
            }

            match device.open() {
                Ok(mut handle) => {
                    // The kernel HID driver claims the interface by default.
                    let _ = handle.set_auto_detach_kernel_driver(true);
                    if let Err(e) = handle.claim_interface(0) {
                        warn!("failed to claim unit interface: {e}");
                        continue;
                    }
                    self.handles.push(handle);
                }
                Err(e) => warn!("failed to open unit: {e}"),
            }
        }

        debug!("opened {} device unit(s)", self.handles.len());
        Ok((0..self.handles.len()).map(UnitHandle::new).collect())
    }

    async fn control_write(&mut self, unit: UnitHandle, report: &[u8; REPORT_SIZE]) -> bool {
        let Some(handle) = self.handle(unit) else {
            return false;
        };
        let request_type = rusb::request_type(
            rusb::Direction::Out,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );
        match handle.write_control(
            request_type,
            REQ_SET_REPORT,
            REPORT_VALUE,
            0,
            report,
            TRANSFER_TIMEOUT,
        ) {
            Ok(written) => written > 0,
            Err(e) => {
                debug!("control write to unit {} failed: {e}", unit.id());
                false
            }
        }
    }

    async fn control_read(&mut self, unit: UnitHandle) -> Option<[u8; REPORT_SIZE]> {
        let handle = self.handle(unit)?;
        let request_type = rusb::request_type(
            rusb::Direction::In,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );
        let mut report = [0u8; REPORT_SIZE];
        match handle.read_control(
            request_type,
            REQ_GET_REPORT,
            REPORT_VALUE,
            0,
            &mut report,
            TRANSFER_TIMEOUT,
        ) {
            Ok(read) if read > 0 => Some(report),
            Ok(_) => None,
            Err(e) => {
                debug!("control read from unit {} failed: {e}", unit.id());
                None
            }
        }
    }

    async fn close_all(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.release_interface(0);
        }
    }
}
