//! LED hardware layer.
//!
//! Split in three: [`frame`] builds the fixed-size command reports,
//! [`transport`] abstracts the physical channel (USB control
//! transfers in production, mocks in tests), and [`protocol`]
//! drives a set of units through that channel with chunking, retry
//! and keepalive.

pub mod frame;
pub mod protocol;
pub mod transport;
pub mod usb;

pub use frame::{CommandFrame, LEDS_PER_UNIT, PING_INTERVAL_MS, REPORT_SIZE};
pub use protocol::{DeviceConfig, LedDevice};
pub use transport::{DeviceTransport, UnitHandle};
pub use usb::UsbTransport;
