//! Daemon core: wires the capture scheduler to the LED device.
//!
//! The scheduler runs as its own task and publishes [`GrabEvent`]s;
//! this service owns the [`LedDevice`] and is the only writer to it,
//! so color updates, setting pushes and keepalive pings are naturally
//! serialized. On shutdown the LEDs are switched off before the
//! transport closes.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use glow_core::{
    BackendRegistry, DeviceTransport, FbDevice, FramebufferGrabber, GrabCommand, GrabEvent,
    GrabScheduler, LedDevice, PlatformTag,
};

use crate::config::GlowConfig;

/// Delay between reconnect attempts while no device is present.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

// ── GlowService ──────────────────────────────────────────────────

/// The top-level daemon service.
pub struct GlowService<T: DeviceTransport> {
    config: GlowConfig,
    device: LedDevice<T>,
}

impl<T: DeviceTransport> GlowService<T> {
    pub fn new(config: GlowConfig, transport: T) -> Self {
        let device = LedDevice::new(transport, config.device_config());
        Self { config, device }
    }

    /// Run until Ctrl-C.
    ///
    /// 1. Builds the backend registry from the config.
    /// 2. Spawns the scheduler loop and seeds it with the configured
    ///    regions and policies, then starts capture.
    /// 3. Opens the LED device (retrying while absent).
    /// 4. Forwards each color frame to the device and services the
    ///    keepalive deadline in between.
    pub async fn run(&mut self) {
        let registry = build_registry(&self.config);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut scheduler = GrabScheduler::new(
            registry,
            self.config.backend_tag(),
            self.config.regions().len(),
            events_tx,
        );

        let (commands, commands_rx) = mpsc::unbounded_channel();
        seed_scheduler(&commands, &self.config);

        let scheduler_task = tokio::spawn(async move {
            scheduler.run(commands_rx).await;
        });

        if let Err(e) = self.device.open().await {
            warn!("LED device unavailable at startup: {e}");
        } else {
            info!(
                "LED device ready: {} unit(s), capacity {}",
                self.device.unit_count(),
                self.device.max_leds_count()
            );
        }

        loop {
            // The keepalive deadline doubles as the reconnect timer
            // while the device is absent.
            let wake_at = match self.device.next_ping() {
                Some(at) => Instant::from_std(at),
                None => Instant::now() + RECONNECT_INTERVAL,
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(GrabEvent::ColorsUpdated(colors)) => {
                        if !self.device.is_open() && self.device.open().await.is_err() {
                            continue;
                        }
                        if let Err(e) = self.device.set_colors(&colors).await {
                            warn!("color update failed: {e}");
                        }
                    }
                    Some(GrabEvent::CaptureRate(ms)) => {
                        debug!("capture cycle time: {ms:.1} ms");
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(wake_at) => {
                    self.service_deadline().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        // Stop capturing, then black out whatever is still lit.
        let _ = commands.send(GrabCommand::Stop);
        drop(commands);
        if self.device.is_open() {
            if let Err(e) = self.device.switch_off_leds().await {
                warn!("switch off failed: {e}");
            }
            self.device.close().await;
        }
        let _ = scheduler_task.await;
        info!("glow daemon stopped");
    }

    /// Keepalive or reconnect, whichever is due.
    async fn service_deadline(&mut self) {
        if self.device.next_ping().is_some() {
            if let Err(e) = self.device.ping().await {
                warn!("keepalive failed: {e}");
            }
        } else if !self.device.is_open() {
            if self.device.open().await.is_ok() {
                info!("LED device reconnected: {} unit(s)", self.device.unit_count());
            }
        }
    }
}

// ── Wiring ───────────────────────────────────────────────────────

/// Registry with every variant this build can provide. The
/// framebuffer entry honors the configured device node.
fn build_registry(config: &GlowConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    let path = config.capture.framebuffer_path.clone();
    registry.register(
        PlatformTag::Framebuffer,
        Box::new(move || Box::new(FramebufferGrabber::new(Box::new(FbDevice::new(&path))))),
    );
    registry
}

/// Push the configured geometry and policies into the scheduler,
/// then start capture.
fn seed_scheduler(commands: &UnboundedSender<GrabCommand>, config: &GlowConfig) {
    let _ = commands.send(GrabCommand::SetGrabInterval(config.grab_interval()));
    let _ = commands.send(GrabCommand::SetAvgColorsOnAllLeds(
        config.capture.avg_colors_on_all_leds,
    ));
    let _ = commands.send(GrabCommand::SetSendOnlyIfColorsChanged(
        config.capture.send_only_if_colors_changed,
    ));
    for region in config.regions() {
        let _ = commands.send(GrabCommand::SetGeometry {
            index: region.index,
            rect: region.rect,
        });
        let _ = commands.send(GrabCommand::SetEnabled {
            index: region.index,
            enabled: region.enabled,
        });
    }
    let _ = commands.send(GrabCommand::Start);
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use glow_core::{Rect, Region};

    #[test]
    fn seed_covers_every_configured_region() {
        let mut config = GlowConfig::default();
        config.leds = vec![
            crate::config::LedConfig {
                x: 5,
                y: 6,
                width: 20,
                height: 20,
                enabled: true,
            },
            crate::config::LedConfig {
                enabled: false,
                ..crate::config::LedConfig::default()
            },
        ];

        let (tx, mut rx) = mpsc::unbounded_channel();
        seed_scheduler(&tx, &config);

        let mut seen = Vec::new();
        while let Ok(command) = rx.try_recv() {
            seen.push(command);
        }
        // 3 policies + 2 regions x 2 commands + Start.
        assert_eq!(seen.len(), 8);
        assert!(matches!(
            seen[3],
            GrabCommand::SetGeometry {
                index: 0,
                rect: Rect {
                    x: 5,
                    y: 6,
                    width: 20,
                    height: 20
                }
            }
        ));
        assert!(matches!(
            seen[6],
            GrabCommand::SetEnabled {
                index: 1,
                enabled: false
            }
        ));
        assert!(matches!(seen.last(), Some(GrabCommand::Start)));
    }

    #[test]
    fn registry_carries_the_framebuffer_variant() {
        let config = GlowConfig::default();
        let registry = build_registry(&config);
        assert!(registry.supports(PlatformTag::Framebuffer));
    }

    #[test]
    fn default_regions_match_led_count() {
        let config = GlowConfig::default();
        let regions = config.regions();
        assert_eq!(regions.len(), 10);
        assert_eq!(regions[3], Region::new(3));
    }
}
