//! Configuration for the glow daemon.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use glow_core::{PlatformTag, Rect, Region};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlowConfig {
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// LED hardware settings.
    pub device: DeviceSection,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Per-LED capture regions. When empty, `capture.number_of_leds`
    /// default regions are used instead.
    pub leds: Vec<LedConfig>,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture backend: "framebuffer", "dxgi", "x11".
    pub backend: String,
    /// Framebuffer device node (framebuffer backend only).
    pub framebuffer_path: String,
    /// Capture cycle interval in milliseconds.
    pub interval_ms: u64,
    /// Number of LEDs when no `[[leds]]` entries are given.
    pub number_of_leds: usize,
    /// Assign the mean over all enabled regions to every LED.
    pub avg_colors_on_all_leds: bool,
    /// Forward a frame only when it differs from the last one.
    pub send_only_if_colors_changed: bool,
}

/// LED hardware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// PWM refresh delay pushed to the firmware.
    pub refresh_delay: u16,
    /// Maximum PWM level (color depth).
    pub color_depth: u8,
    /// Firmware-side smoothing slowdown.
    pub smooth_slowdown: u8,
    /// Keep the connection alive with a ping one second after each
    /// completed transfer.
    pub ping_every_second: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

/// One capture region, mapped to the LED at its list position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub enabled: bool,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            device: DeviceSection::default(),
            logging: LoggingConfig::default(),
            leds: Vec::new(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: "framebuffer".into(),
            framebuffer_path: "/dev/fb0".into(),
            interval_ms: 50,
            number_of_leds: 10,
            avg_colors_on_all_leds: false,
            send_only_if_colors_changed: true,
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            refresh_delay: 100,
            color_depth: 128,
            smooth_slowdown: 100,
            ping_every_second: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        let rect = Region::DEFAULT_RECT;
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            enabled: true,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl GlowConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Backend tag named by `capture.backend`; unknown names fall
    /// back to the framebuffer variant.
    pub fn backend_tag(&self) -> PlatformTag {
        match self.capture.backend.as_str() {
            "framebuffer" | "fb" => PlatformTag::Framebuffer,
            "dxgi" | "desktop-duplication" => PlatformTag::DesktopDuplication,
            "x11" => PlatformTag::X11,
            other => {
                tracing::warn!("unknown capture backend {other:?}, using framebuffer");
                PlatformTag::Framebuffer
            }
        }
    }

    pub fn grab_interval(&self) -> Duration {
        Duration::from_millis(self.capture.interval_ms.max(10))
    }

    /// The configured region set: one region per `[[leds]]` entry, or
    /// `number_of_leds` defaults when none are given.
    pub fn regions(&self) -> Vec<Region> {
        if self.leds.is_empty() {
            return (0..self.capture.number_of_leds).map(Region::new).collect();
        }
        self.leds
            .iter()
            .enumerate()
            .map(|(index, led)| Region {
                index,
                rect: Rect::new(led.x, led.y, led.width, led.height),
                enabled: led.enabled,
            })
            .collect()
    }

    /// Hardware settings as the device layer wants them.
    pub fn device_config(&self) -> glow_core::DeviceConfig {
        glow_core::DeviceConfig {
            refresh_delay: self.device.refresh_delay,
            color_depth: self.device.color_depth,
            smooth_slowdown: self.device.smooth_slowdown,
            ping_every_second: self.device.ping_every_second,
            lighting_enabled: true,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
