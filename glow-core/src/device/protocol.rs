//! The LED device protocol: framing, unit chunking, retry and
//! keepalive.
//!
//! [`LedDevice`] encodes a color sequence into fixed-size command
//! frames, chunks them across the attached units (one frame per
//! [`LEDS_PER_UNIT`] colors plus a final partial), and pushes them
//! over a [`DeviceTransport`]. A failed write is retried once
//! immediately, then once more after a full close-and-reopen; the
//! unit map is rebuilt on every reopen and never assumed stable
//! across reopens.
//!
//! Frame packing and the saved-colors snapshot are pure in-memory
//! work completed before any transfer starts, so a slow physical
//! write never holds up the next capture cycle; the single-owner
//! daemon loop serializes `set_colors` calls end to end.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::device::frame::{
    CommandFrame, INDEX_FW_VER_MAJOR, INDEX_FW_VER_MINOR, LEDS_PER_UNIT, PING_INTERVAL_MS, cmd,
};
use crate::device::transport::{DeviceTransport, UnitHandle};
use crate::error::GlowError;
use crate::types::Rgb;

// ── DeviceConfig ─────────────────────────────────────────────────

/// Hardware-side settings pushed to every unit on open.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// PWM refresh delay, two-byte payload.
    pub refresh_delay: u16,
    /// Maximum PWM level (color depth).
    pub color_depth: u8,
    /// Firmware-side smoothing slowdown.
    pub smooth_slowdown: u8,
    /// Send a keepalive ping one second after each completed I/O.
    pub ping_every_second: bool,
    /// Overall lighting switch; disabled lighting suppresses pings.
    pub lighting_enabled: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            refresh_delay: 100,
            color_depth: 128,
            smooth_slowdown: 100,
            ping_every_second: true,
            lighting_enabled: true,
        }
    }
}

// ── PingState ────────────────────────────────────────────────────

/// Keepalive sub-state, only meaningful while the device is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PingState {
    Idle,
    Scheduled(Instant),
}

// ── LedDevice ────────────────────────────────────────────────────

/// Protocol driver over one set of physical LED controller units.
pub struct LedDevice<T: DeviceTransport> {
    transport: T,
    /// Unit map, rebuilt at every (re)open. LED `i` belongs to unit
    /// `i / LEDS_PER_UNIT`.
    units: Vec<UnitHandle>,
    /// Snapshot of the last color sequence handed to `set_colors`.
    colors_saved: Vec<Rgb>,
    config: DeviceConfig,
    ping: PingState,
    firmware_version: Option<String>,
}

impl<T: DeviceTransport> LedDevice<T> {
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Self {
            transport,
            units: Vec::new(),
            colors_saved: Vec::new(),
            config,
            ping: PingState::Idle,
            firmware_version: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────

    /// Total LED capacity of the currently attached units.
    pub fn max_leds_count(&self) -> usize {
        self.units.len() * LEDS_PER_UNIT
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn is_open(&self) -> bool {
        !self.units.is_empty()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    /// Deadline of the next keepalive ping, if one is scheduled.
    pub fn next_ping(&self) -> Option<Instant> {
        match self.ping {
            PingState::Scheduled(at) => Some(at),
            PingState::Idle => None,
        }
    }

    pub fn set_lighting_enabled(&mut self, enabled: bool) {
        self.config.lighting_enabled = enabled;
        if !enabled {
            self.ping = PingState::Idle;
        }
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Enumerate and claim the attached units, then push the current
    /// device settings to each and query the firmware version.
    ///
    /// Finding zero units is a non-fatal failure; the caller may
    /// retry later (writes also reopen on demand).
    pub async fn open(&mut self) -> Result<(), GlowError> {
        if !self.units.is_empty() {
            return Ok(());
        }

        self.units = self.transport.open_all().await?;
        if self.units.is_empty() {
            debug!("LED device not found");
            return Err(GlowError::DeviceNotFound);
        }

        debug!("LED device opened with {} unit(s)", self.units.len());
        self.update_device_settings().await;

        // The settings push may itself have gone through the reopen
        // path and lost the device; don't report success with an
        // empty unit map.
        if self.units.is_empty() {
            return Err(GlowError::DeviceNotFound);
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        self.transport.close_all().await;
        self.units.clear();
        self.ping = PingState::Idle;
    }

    /// Push refresh delay, color depth and smoothing to every unit
    /// and refresh the firmware version. Individual failures are
    /// logged; the device stays usable for whatever succeeded.
    pub async fn update_device_settings(&mut self) {
        let config = self.config;
        if let Err(e) = self.set_refresh_delay(config.refresh_delay).await {
            warn!("set_refresh_delay failed: {e}");
        }
        if let Err(e) = self.set_color_depth(config.color_depth).await {
            warn!("set_color_depth failed: {e}");
        }
        if let Err(e) = self.set_smooth_slowdown(config.smooth_slowdown).await {
            warn!("set_smooth_slowdown failed: {e}");
        }
        match self.request_firmware_version().await {
            Ok(version) => debug!("device firmware {version}"),
            Err(e) => warn!("firmware version query failed: {e}"),
        }
    }

    // ── Commands ─────────────────────────────────────────────

    /// Encode `colors` into per-unit UPDATE_LEDS frames and flush
    /// each to its unit.
    ///
    /// More colors than the attached capacity is rejected outright —
    /// nothing is sent. A unit that fails to flush does not stop the
    /// remaining units from receiving their portion; the call
    /// reports failure if any unit failed.
    pub async fn set_colors(&mut self, colors: &[Rgb]) -> Result<(), GlowError> {
        let capacity = self.max_leds_count();
        if colors.len() > capacity {
            warn!(
                "refusing {} colors: device capacity is {capacity}",
                colors.len()
            );
            return Err(GlowError::CapacityExceeded {
                count: colors.len(),
                capacity,
            });
        }

        // Pack-and-snapshot: pure memory work, no transfers yet.
        self.colors_saved = colors.to_vec();
        let frames = pack_unit_frames(colors);

        let mut failed_unit = None;
        for (unit_index, frame) in &frames {
            if !self.write_with_check(*unit_index, frame).await {
                failed_unit.get_or_insert(*unit_index);
            }
        }

        self.after_io(failed_unit.is_none());
        match failed_unit {
            None => Ok(()),
            Some(unit) => Err(GlowError::DeviceIo { unit }),
        }
    }

    /// Flush one zeroed UPDATE_LEDS frame to every unit, regardless
    /// of the currently known color state, and stop the keepalive.
    pub async fn switch_off_leds(&mut self) -> Result<(), GlowError> {
        if self.colors_saved.is_empty() {
            self.colors_saved = vec![Rgb::BLACK; self.max_leds_count()];
        } else {
            self.colors_saved.fill(Rgb::BLACK);
        }

        // Off means off: no keepalive afterwards.
        self.config.lighting_enabled = false;
        self.ping = PingState::Idle;

        let frame = CommandFrame::new(cmd::UPDATE_LEDS);
        self.flush_to_all_units(&frame).await
    }

    /// Two-byte refresh delay, flushed to every unit.
    pub async fn set_refresh_delay(&mut self, value: u16) -> Result<(), GlowError> {
        self.config.refresh_delay = value;
        let mut frame = CommandFrame::new(cmd::SET_TIMER_OPTIONS);
        frame.push_u16_le(value);
        self.flush_to_all_units(&frame).await
    }

    /// Maximum PWM level, flushed to every unit.
    pub async fn set_color_depth(&mut self, value: u8) -> Result<(), GlowError> {
        self.config.color_depth = value;
        let mut frame = CommandFrame::new(cmd::SET_PWM_LEVEL_MAX_VALUE);
        frame.push_u8(value);
        self.flush_to_all_units(&frame).await
    }

    /// Firmware smoothing slowdown, flushed to every unit.
    pub async fn set_smooth_slowdown(&mut self, value: u8) -> Result<(), GlowError> {
        self.config.smooth_slowdown = value;
        let mut frame = CommandFrame::new(cmd::SET_SMOOTH_SLOWDOWN);
        frame.push_u8(value);
        self.flush_to_all_units(&frame).await
    }

    /// Read the firmware version from unit 0.
    pub async fn request_firmware_version(&mut self) -> Result<String, GlowError> {
        if self.units.is_empty() {
            return Err(GlowError::DeviceNotFound);
        }
        match self.read_with_check().await {
            Some(report) => {
                let version = format!(
                    "{}.{}",
                    report[INDEX_FW_VER_MAJOR], report[INDEX_FW_VER_MINOR]
                );
                self.firmware_version = Some(version.clone());
                self.after_io(true);
                Ok(version)
            }
            None => {
                self.after_io(false);
                Err(GlowError::DeviceIo { unit: 0 })
            }
        }
    }

    /// Keepalive NOP to unit 0; reschedules itself on success.
    pub async fn ping(&mut self) -> Result<(), GlowError> {
        let frame = CommandFrame::new(cmd::NOP);
        let ok = match self.units.first().copied() {
            Some(unit) => self.transport.control_write(unit, frame.as_bytes()).await,
            None => false,
        };
        self.after_io(ok);
        if ok {
            Ok(())
        } else {
            Err(GlowError::DeviceIo { unit: 0 })
        }
    }

    // ── Write / read resilience ──────────────────────────────

    /// Flush `frame` to every unit; per-unit failures don't stop the
    /// iteration. Reports the first failed unit, if any.
    async fn flush_to_all_units(&mut self, frame: &CommandFrame) -> Result<(), GlowError> {
        let mut failed_unit = None;
        for unit_index in 0..self.units.len() {
            if !self.write_with_check(unit_index, frame).await {
                failed_unit.get_or_insert(unit_index);
            }
        }
        self.after_io(failed_unit.is_none());
        match failed_unit {
            None => Ok(()),
            Some(unit) => Err(GlowError::DeviceIo { unit }),
        }
    }

    /// Write with the full resilience ladder: immediate retry, then
    /// close-and-reopen, then one final attempt against the fresh
    /// unit map.
    async fn write_with_check(&mut self, unit_index: usize, frame: &CommandFrame) -> bool {
        if let Some(unit) = self.units.get(unit_index).copied() {
            if self.transport.control_write(unit, frame.as_bytes()).await {
                return true;
            }
            if self.transport.control_write(unit, frame.as_bytes()).await {
                return true;
            }
        }

        if !self.try_reopen().await {
            return false;
        }
        match self.units.get(unit_index).copied() {
            Some(unit) => self.transport.control_write(unit, frame.as_bytes()).await,
            None => false,
        }
    }

    /// Read from unit 0 with a reopen fallback.
    async fn read_with_check(&mut self) -> Option<[u8; crate::device::frame::REPORT_SIZE]> {
        if let Some(unit) = self.units.first().copied() {
            if let Some(report) = self.transport.control_read(unit).await {
                return Some(report);
            }
        }
        if !self.try_reopen().await {
            return None;
        }
        let unit = self.units.first().copied()?;
        self.transport.control_read(unit).await
    }

    /// Close everything and re-enumerate. The unit map is replaced;
    /// previous handles are gone.
    async fn try_reopen(&mut self) -> bool {
        self.transport.close_all().await;
        self.units = match self.transport.open_all().await {
            Ok(units) => units,
            Err(e) => {
                debug!("reopen failed: {e}");
                Vec::new()
            }
        };
        if self.units.is_empty() {
            return false;
        }
        debug!("reopen success: {} unit(s)", self.units.len());
        true
    }

    /// Reschedule or suppress the keepalive after an I/O completion.
    /// Only a success with pings enabled and lighting on arms the
    /// timer.
    fn after_io(&mut self, ok: bool) {
        if ok && self.config.ping_every_second && self.config.lighting_enabled {
            self.ping =
                PingState::Scheduled(Instant::now() + Duration::from_millis(PING_INTERVAL_MS));
        } else {
            self.ping = PingState::Idle;
        }
    }
}

// ── Packing ──────────────────────────────────────────────────────

/// Chunk `colors` into `(unit_index, frame)` pairs: one frame per
/// full group of [`LEDS_PER_UNIT`] colors plus a final partial.
fn pack_unit_frames(colors: &[Rgb]) -> Vec<(usize, CommandFrame)> {
    let mut frames = Vec::with_capacity(colors.len().div_ceil(LEDS_PER_UNIT));
    let mut frame = CommandFrame::new(cmd::UPDATE_LEDS);

    for (i, color) in colors.iter().enumerate() {
        frame.push_color(*color);
        if (i + 1) % LEDS_PER_UNIT == 0 || i == colors.len() - 1 {
            frames.push((i / LEDS_PER_UNIT, frame));
            frame = CommandFrame::new(cmd::UPDATE_LEDS);
        }
    }
    frames
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::frame::REPORT_SIZE;
    use async_trait::async_trait;

    /// Scriptable in-memory transport recording every transfer.
    struct MockTransport {
        /// Unit count returned by each successive `open_all`.
        enumerations: Vec<usize>,
        opens: usize,
        closes: usize,
        /// Results to serve for the next writes (defaults to `true`
        /// once exhausted).
        write_results: Vec<bool>,
        /// `(unit id, report)` for every attempted write.
        writes: Vec<(usize, [u8; REPORT_SIZE])>,
        read_report: Option<[u8; REPORT_SIZE]>,
    }

    impl MockTransport {
        fn with_units(units: usize) -> Self {
            Self {
                enumerations: vec![units],
                opens: 0,
                closes: 0,
                write_results: Vec::new(),
                writes: Vec::new(),
                read_report: None,
            }
        }
    }

    #[async_trait]
    impl DeviceTransport for MockTransport {
        async fn open_all(&mut self) -> Result<Vec<UnitHandle>, GlowError> {
            let units = self
                .enumerations
                .get(self.opens)
                .copied()
                .unwrap_or_else(|| *self.enumerations.last().unwrap_or(&0));
            self.opens += 1;
            Ok((0..units).map(UnitHandle::new).collect())
        }

        async fn control_write(&mut self, unit: UnitHandle, report: &[u8; REPORT_SIZE]) -> bool {
            self.writes.push((unit.id(), *report));
            if self.write_results.is_empty() {
                true
            } else {
                self.write_results.remove(0)
            }
        }

        async fn control_read(&mut self, _unit: UnitHandle) -> Option<[u8; REPORT_SIZE]> {
            self.read_report
        }

        async fn close_all(&mut self) {
            self.closes += 1;
        }
    }

    fn quiet_config() -> DeviceConfig {
        DeviceConfig {
            ping_every_second: false,
            ..DeviceConfig::default()
        }
    }

    async fn open_device(mut transport: MockTransport) -> LedDevice<MockTransport> {
        // The settings push during open() queries the firmware; give
        // it a report so setup never takes the reopen path.
        transport.read_report.get_or_insert([0u8; REPORT_SIZE]);
        let mut device = LedDevice::new(transport, quiet_config());
        device.open().await.unwrap();
        // Discard the settings-push traffic from open().
        device.transport.writes.clear();
        device
    }

    #[test]
    fn led_index_maps_to_unit_and_offset() {
        // LED i lives on unit i / K at offset i % K.
        assert_eq!(22 / LEDS_PER_UNIT, 2);
        assert_eq!(22 % LEDS_PER_UNIT, 2);
        let frames = pack_unit_frames(&vec![Rgb::BLACK; 23]);
        assert_eq!(frames.len(), 3);
    }

    #[tokio::test]
    async fn open_with_zero_units_is_device_not_found() {
        let mut transport = MockTransport::with_units(0);
        transport.enumerations = vec![0];
        let mut device = LedDevice::new(transport, quiet_config());
        assert!(matches!(
            device.open().await,
            Err(GlowError::DeviceNotFound)
        ));
        assert!(!device.is_open());
    }

    #[tokio::test]
    async fn open_fails_when_settings_probe_loses_the_device() {
        let mut transport = MockTransport::with_units(1);
        // No read report: the firmware query fails, reopens, and the
        // reopen finds nothing.
        transport.enumerations = vec![1, 0];
        let mut device = LedDevice::new(transport, quiet_config());

        assert!(matches!(
            device.open().await,
            Err(GlowError::DeviceNotFound)
        ));
        assert!(!device.is_open());
    }

    #[tokio::test]
    async fn open_pushes_settings_and_queries_firmware() {
        let mut transport = MockTransport::with_units(2);
        let mut report = [0u8; REPORT_SIZE];
        report[INDEX_FW_VER_MAJOR] = 5;
        report[INDEX_FW_VER_MINOR] = 3;
        transport.read_report = Some(report);

        let mut device = LedDevice::new(transport, quiet_config());
        device.open().await.unwrap();

        assert_eq!(device.firmware_version(), Some("5.3"));
        // Three setting commands, each flushed to both units.
        let opcodes: Vec<u8> = device.transport.writes.iter().map(|(_, r)| r[0]).collect();
        assert_eq!(
            opcodes,
            vec![
                cmd::SET_TIMER_OPTIONS,
                cmd::SET_TIMER_OPTIONS,
                cmd::SET_PWM_LEVEL_MAX_VALUE,
                cmd::SET_PWM_LEVEL_MAX_VALUE,
                cmd::SET_SMOOTH_SLOWDOWN,
                cmd::SET_SMOOTH_SLOWDOWN,
            ]
        );
    }

    #[tokio::test]
    async fn set_colors_chunks_across_units() {
        // 23 configured LEDs over 3 physical units (capacity 30).
        let mut device = open_device(MockTransport::with_units(3)).await;
        let colors: Vec<Rgb> = (0..23).map(|i| Rgb::new(i as u8, 0, 0)).collect();

        device.set_colors(&colors).await.unwrap();

        let writes = &device.transport.writes;
        assert_eq!(writes.len(), 3);
        assert_eq!(
            writes.iter().map(|(unit, _)| *unit).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // First frame: 10 packed colors; last frame: 3 colors then
        // zero padding.
        assert_eq!(writes[0].1[0], cmd::UPDATE_LEDS);
        assert_eq!(writes[0].1[1], 0); // LED 0 red high byte
        assert_eq!(writes[1].1[1], 10); // LED 10 red high byte
        assert_eq!(writes[2].1[1], 20); // LED 20 red high byte
        assert_eq!(writes[2].1[1 + 3 * 6], 0); // padding past LED 22
    }

    #[tokio::test]
    async fn over_capacity_is_rejected_without_writes() {
        let mut device = open_device(MockTransport::with_units(3)).await;
        let colors = vec![Rgb::new(1, 1, 1); 40];

        let result = device.set_colors(&colors).await;
        assert!(matches!(
            result,
            Err(GlowError::CapacityExceeded {
                count: 40,
                capacity: 30
            })
        ));
        assert!(device.transport.writes.is_empty());
    }

    #[tokio::test]
    async fn write_fails_twice_then_reopen_then_success() {
        let mut device = open_device(MockTransport::with_units(1)).await;
        // Two failures force the reopen; the post-reopen write
        // succeeds by default.
        device.transport.write_results = vec![false, false];

        device.set_colors(&[Rgb::new(1, 2, 3)]).await.unwrap();

        assert_eq!(device.transport.writes.len(), 3);
        assert_eq!(device.transport.closes, 1);
        assert_eq!(device.transport.opens, 2);
    }

    #[tokio::test]
    async fn reopen_with_no_units_fails_permanently() {
        let mut transport = MockTransport::with_units(1);
        transport.enumerations = vec![1, 0]; // reopen finds nothing
        let mut device = open_device(transport).await;
        device.transport.write_results = vec![false, false];

        let result = device.set_colors(&[Rgb::new(1, 2, 3)]).await;
        assert!(matches!(result, Err(GlowError::DeviceIo { unit: 0 })));
        assert_eq!(device.transport.writes.len(), 2);
    }

    #[tokio::test]
    async fn one_failing_unit_does_not_stop_the_others() {
        let mut transport = MockTransport::with_units(3);
        // Unit 0's ladder fails completely (write, retry, post-reopen
        // write); units 1 and 2 then succeed.
        transport.enumerations = vec![3, 3];
        let mut device = open_device(transport).await;
        device.transport.write_results = vec![false, false, false];

        let colors = vec![Rgb::new(9, 9, 9); 30];
        let result = device.set_colors(&colors).await;

        assert!(matches!(result, Err(GlowError::DeviceIo { unit: 0 })));
        let units: Vec<usize> = device.transport.writes.iter().map(|(u, _)| *u).collect();
        // 0 three times (ladder), then 1 and 2 once each.
        assert_eq!(units, vec![0, 0, 0, 1, 2]);
    }

    #[tokio::test]
    async fn switch_off_zeroes_every_unit_and_stops_ping() {
        let mut transport = MockTransport::with_units(2);
        transport.read_report = Some([0u8; REPORT_SIZE]);
        let mut device = LedDevice::new(
            transport,
            DeviceConfig {
                ping_every_second: true,
                ..DeviceConfig::default()
            },
        );
        device.open().await.unwrap();
        assert!(device.next_ping().is_some());
        device.transport.writes.clear();

        device.switch_off_leds().await.unwrap();

        assert!(device.next_ping().is_none());
        let writes = &device.transport.writes;
        assert_eq!(writes.len(), 2);
        for (_, report) in writes {
            assert_eq!(report[0], cmd::UPDATE_LEDS);
            assert!(report[1..].iter().all(|&b| b == 0));
        }
    }

    #[tokio::test]
    async fn ping_schedules_on_success_and_suppresses_on_failure() {
        let mut transport = MockTransport::with_units(1);
        transport.read_report = Some([0u8; REPORT_SIZE]);
        let mut device = LedDevice::new(
            transport,
            DeviceConfig {
                ping_every_second: true,
                ..DeviceConfig::default()
            },
        );
        device.open().await.unwrap();
        assert!(device.next_ping().is_some());

        device.ping().await.unwrap();
        assert!(device.next_ping().is_some());

        device.transport.write_results = vec![false];
        assert!(device.ping().await.is_err());
        assert!(device.next_ping().is_none());
    }
}
