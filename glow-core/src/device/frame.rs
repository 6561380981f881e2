//! Command framing for the LED controller.
//!
//! Every transfer is one fixed 61-byte report: byte 0 carries the
//! command opcode, bytes 1..=60 the payload. One UPDATE_LEDS frame
//! holds up to [`LEDS_PER_UNIT`] colors at 6 bytes each: the three
//! high bytes of the 12-bit channel values, then the three low
//! nibbles. Device revisions before 6 consume only the high bytes,
//! which keeps the layout backward compatible.

use crate::types::Rgb;

/// Fixed report size in both directions.
pub const REPORT_SIZE: usize = 61;

/// LED capacity of one physical device unit.
pub const LEDS_PER_UNIT: usize = 10;

/// Keepalive interval for the ping cycle.
pub const PING_INTERVAL_MS: u64 = 1000;

/// Byte offsets of the firmware version in a read report.
pub const INDEX_FW_VER_MAJOR: usize = 1;
pub const INDEX_FW_VER_MINOR: usize = 2;

/// Command opcodes understood by the device firmware. Values are
/// fixed by the hardware.
pub mod cmd {
    pub const UPDATE_LEDS: u8 = 1;
    pub const OFF_ALL: u8 = 2;
    pub const SET_TIMER_OPTIONS: u8 = 3;
    pub const SET_PWM_LEVEL_MAX_VALUE: u8 = 4;
    pub const SET_SMOOTH_SLOWDOWN: u8 = 5;
    pub const NOP: u8 = 0x0F;
}

// ── CommandFrame ─────────────────────────────────────────────────

/// One opcode-plus-payload report, built up and flushed per device
/// unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    buf: [u8; REPORT_SIZE],
    cursor: usize,
}

impl CommandFrame {
    /// A zero-payload frame carrying `opcode`.
    pub fn new(opcode: u8) -> Self {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0] = opcode;
        Self { buf, cursor: 1 }
    }

    /// Zero the payload and restart packing at offset 0, keeping the
    /// opcode.
    pub fn clear(&mut self) {
        let opcode = self.buf[0];
        self.buf = [0u8; REPORT_SIZE];
        self.buf[0] = opcode;
        self.cursor = 1;
    }

    /// Append one color as two nibble-groups per channel.
    ///
    /// The 8-bit channels are widened to 12 bits; the high byte goes
    /// first, the low nibble after all three high bytes.
    pub fn push_color(&mut self, color: Rgb) {
        let r12 = (color.r as u16) << 4;
        let g12 = (color.g as u16) << 4;
        let b12 = (color.b as u16) << 4;

        self.push_u8(((r12 & 0x0FF0) >> 4) as u8);
        self.push_u8(((g12 & 0x0FF0) >> 4) as u8);
        self.push_u8(((b12 & 0x0FF0) >> 4) as u8);

        self.push_u8((r12 & 0x000F) as u8);
        self.push_u8((g12 & 0x000F) as u8);
        self.push_u8((b12 & 0x000F) as u8);
    }

    /// Append a single payload byte.
    ///
    /// # Panics
    ///
    /// Panics when the payload would exceed the fixed report size —
    /// a programmer error; unit chunking must flush every
    /// [`LEDS_PER_UNIT`] colors.
    pub fn push_u8(&mut self, value: u8) {
        assert!(self.cursor < REPORT_SIZE, "command frame payload overflow");
        self.buf[self.cursor] = value;
        self.cursor += 1;
    }

    /// Append a little-endian u16.
    pub fn push_u16_le(&mut self, value: u16) {
        self.push_u8((value & 0xFF) as u8);
        self.push_u8((value >> 8) as u8);
    }

    /// Number of colors currently packed (UPDATE_LEDS frames).
    pub fn packed_colors(&self) -> usize {
        (self.cursor - 1) / 6
    }

    pub fn opcode(&self) -> u8 {
        self.buf[0]
    }

    /// The full fixed-size wire buffer.
    pub fn as_bytes(&self) -> &[u8; REPORT_SIZE] {
        &self.buf
    }
}

// ── Tests ────────────────────────────────────────────────────────
