//! Capture scheduling, policy transforms and change detection.
//!
//! [`GrabScheduler`] owns the configured region set, holds the active
//! [`CaptureBackend`], and drives periodic capture from a timer loop.
//! Each tick it captures one color per region, optionally averages
//! across all enabled regions, compares the frame against the last
//! forwarded one and emits [`GrabEvent::ColorsUpdated`] only when
//! something changed (or unconditionally, if configured). The
//! achieved cycle time is reported on a separate fixed-interval
//! timer, decoupled from the capture cadence.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::grab::average::average_colors;
use crate::grab::backend::{BackendRegistry, CaptureBackend, PlatformTag};
use crate::types::{Rect, Region, Rgb};

/// Deferral delay while a region widget is being resized or moved.
const PAUSE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Cadence of [`GrabEvent::CaptureRate`] reports.
const RATE_REPORT_INTERVAL: Duration = Duration::from_millis(500);

// ── Events and commands ──────────────────────────────────────────

/// Fire-and-forget notifications to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum GrabEvent {
    /// A new color frame, one color per region, index-aligned.
    ColorsUpdated(Vec<Rgb>),
    /// Achieved capture cycle time in milliseconds.
    CaptureRate(f64),
}

/// External control surface of the scheduler loop.
#[derive(Debug, Clone)]
pub enum GrabCommand {
    Start,
    Stop,
    /// A region's on-screen representation is being dragged; defer
    /// ticks until [`GrabCommand::Resume`].
    Pause,
    Resume,
    /// Clear the last forwarded frame, forcing the next one through.
    Reset,
    SetBackend(PlatformTag),
    SetNumberOfLeds(usize),
    SetGeometry { index: usize, rect: Rect },
    SetEnabled { index: usize, enabled: bool },
    SetGrabInterval(Duration),
    SetAvgColorsOnAllLeds(bool),
    SetSendOnlyIfColorsChanged(bool),
}

// ── GrabScheduler ────────────────────────────────────────────────

/// The capture-and-aggregate state machine.
///
/// `Stopped → Running ⇄ PausedForResize → Running → Stopped`.
pub struct GrabScheduler {
    regions: Vec<Region>,
    /// Just captured, this cycle.
    colors_new: Vec<Rgb>,
    /// Last forwarded downstream.
    colors_current: Vec<Rgb>,

    registry: BackendRegistry,
    backend: Option<Box<dyn CaptureBackend>>,

    grab_interval: Duration,
    avg_colors_on_all_leds: bool,
    send_only_if_colors_changed: bool,

    running: bool,
    paused: bool,

    last_tick: Option<Instant>,
    cycle_ms: f64,

    events: UnboundedSender<GrabEvent>,
}

impl GrabScheduler {
    /// Create a scheduler with `number_of_leds` default regions and
    /// the backend selected by `tag` (with registry fallback).
    pub fn new(
        registry: BackendRegistry,
        tag: PlatformTag,
        number_of_leds: usize,
        events: UnboundedSender<GrabEvent>,
    ) -> Self {
        let backend = registry.query(tag);
        if backend.is_none() {
            warn!("no capture backend available");
        }
        let mut scheduler = Self {
            regions: Vec::new(),
            colors_new: Vec::new(),
            colors_current: Vec::new(),
            registry,
            backend,
            grab_interval: Duration::from_millis(50),
            avg_colors_on_all_leds: false,
            send_only_if_colors_changed: true,
            running: false,
            paused: false,
            last_tick: None,
            cycle_ms: 0.0,
            events,
        };
        scheduler.set_number_of_leds(number_of_leds);
        scheduler
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn colors_current(&self) -> &[Rgb] {
        &self.colors_current
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Begin periodic capture: the "new" frame starts all-black so a
    /// first capture always registers as a change.
    pub fn start(&mut self) {
        debug!("grab start");
        self.colors_new.fill(Rgb::BLACK);
        self.last_tick = None;
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.open() {
                warn!("backend {} failed to open: {e}", backend.name());
            }
        }
        self.running = true;
    }

    /// Stop capturing. The "current" frame is cleared to black so the
    /// next start forwards a frame immediately, and a zero capture
    /// rate is reported.
    pub fn stop(&mut self) {
        debug!("grab stop");
        self.running = false;
        if let Some(backend) = self.backend.as_mut() {
            backend.close();
        }
        self.colors_current.fill(Rgb::BLACK);
        self.cycle_ms = 0.0;
        let _ = self.events.send(GrabEvent::CaptureRate(0.0));
    }

    pub fn pause_while_resize_or_moving(&mut self) {
        self.paused = true;
    }

    pub fn resume_after_resize_or_moving(&mut self) {
        self.paused = false;
    }

    /// Forget the last forwarded frame.
    pub fn reset(&mut self) {
        self.colors_current.fill(Rgb::BLACK);
    }

    // ── Configuration ────────────────────────────────────────

    /// Swap the active backend for the `tag` variant.
    ///
    /// The outgoing backend is fully stopped before the incoming one
    /// is configured; if capture was running it resumes on the new
    /// backend with no further action needed.
    pub fn set_backend(&mut self, tag: PlatformTag) {
        let was_running = self.running;
        if let Some(backend) = self.backend.as_mut() {
            backend.close();
        }
        match self.registry.query(tag) {
            Some(mut backend) => {
                backend.set_grab_interval(self.grab_interval);
                if was_running {
                    if let Err(e) = backend.open() {
                        warn!("backend {} failed to open: {e}", backend.name());
                    }
                }
                debug!("active backend: {}", backend.name());
                self.backend = Some(backend);
            }
            None => {
                warn!("no capture backend available for {tag:?}");
                self.backend = None;
            }
        }
    }

    /// Grow or shrink the region set; both color frames are
    /// re-derived zero-filled. Retained regions keep their geometry.
    pub fn set_number_of_leds(&mut self, number_of_leds: usize) {
        debug!("number of leds: {number_of_leds}");
        while self.regions.len() < number_of_leds {
            self.regions.push(Region::new(self.regions.len()));
        }
        self.regions.truncate(number_of_leds);

        self.colors_new = vec![Rgb::BLACK; number_of_leds];
        self.colors_current = vec![Rgb::BLACK; number_of_leds];
    }

    pub fn set_geometry(&mut self, index: usize, rect: Rect) {
        match self.regions.get_mut(index) {
            Some(region) => region.rect = rect,
            None => warn!("set_geometry: no region {index}"),
        }
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        match self.regions.get_mut(index) {
            Some(region) => region.enabled = enabled,
            None => warn!("set_enabled: no region {index}"),
        }
    }

    pub fn set_grab_interval(&mut self, interval: Duration) {
        self.grab_interval = interval;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_grab_interval(interval);
        }
    }

    pub fn set_avg_colors_on_all_leds(&mut self, enabled: bool) {
        self.avg_colors_on_all_leds = enabled;
    }

    pub fn set_send_only_if_colors_changed(&mut self, enabled: bool) {
        self.send_only_if_colors_changed = enabled;
    }

    // ── Capture tick ─────────────────────────────────────────

    /// One capture cycle: grab, apply policy, detect changes,
    /// forward. A capture failure skips the cycle silently (logged);
    /// the next tick retries.
    pub fn tick(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        match backend.capture_all(&self.regions) {
            Ok(colors) => {
                debug_assert_eq!(colors.len(), self.regions.len());
                self.handle_grabbed_colors(colors);
            }
            Err(e) => {
                debug!("capture cycle skipped: {e}");
            }
        }
    }

    /// Policy transform + change detection + forward. Split from
    /// [`tick`](Self::tick) so the policy path is testable without a
    /// backend.
    pub fn handle_grabbed_colors(&mut self, colors: Vec<Rgb>) {
        self.colors_new = colors;

        // Optionally assign the mean over all enabled regions to
        // every enabled slot. Disabled regions stay black but keep
        // participating in change detection as fixed black entries.
        if self.avg_colors_on_all_leds {
            let enabled_colors: Vec<Rgb> = self
                .regions
                .iter()
                .filter(|r| r.enabled)
                .map(|r| self.colors_new[r.index])
                .collect();
            let avg = average_colors(&enabled_colors);
            for region in &self.regions {
                if region.enabled {
                    self.colors_new[region.index] = avg;
                }
            }
        }

        let mut changed = false;
        for i in 0..self.colors_current.len() {
            if self.colors_current[i] != self.colors_new[i] {
                self.colors_current[i] = self.colors_new[i];
                changed = true;
            }
        }

        if !self.send_only_if_colors_changed || changed {
            let _ = self
                .events
                .send(GrabEvent::ColorsUpdated(self.colors_current.clone()));
        }

        // Achieved cycle time, measured tick-to-tick.
        let now = Instant::now();
        if let Some(prev) = self.last_tick {
            self.cycle_ms = now.duration_since(prev).as_secs_f64() * 1000.0;
        }
        self.last_tick = Some(now);
    }

    fn report_capture_rate(&self) {
        let _ = self.events.send(GrabEvent::CaptureRate(self.cycle_ms));
    }

    fn apply(&mut self, command: GrabCommand) {
        match command {
            GrabCommand::Start => self.start(),
            GrabCommand::Stop => self.stop(),
            GrabCommand::Pause => self.pause_while_resize_or_moving(),
            GrabCommand::Resume => self.resume_after_resize_or_moving(),
            GrabCommand::Reset => self.reset(),
            GrabCommand::SetBackend(tag) => self.set_backend(tag),
            GrabCommand::SetNumberOfLeds(n) => self.set_number_of_leds(n),
            GrabCommand::SetGeometry { index, rect } => self.set_geometry(index, rect),
            GrabCommand::SetEnabled { index, enabled } => self.set_enabled(index, enabled),
            GrabCommand::SetGrabInterval(interval) => self.set_grab_interval(interval),
            GrabCommand::SetAvgColorsOnAllLeds(v) => self.set_avg_colors_on_all_leds(v),
            GrabCommand::SetSendOnlyIfColorsChanged(v) => self.set_send_only_if_colors_changed(v),
        }
    }

    // ── Run loop ─────────────────────────────────────────────

    /// Drive the scheduler until the command channel closes.
    ///
    /// The capture deadline persists across `select!` iterations, so
    /// a rate report or command arriving mid-wait does not push the
    /// next tick back. While paused, the tick is deferred at a fixed
    /// short delay rather than skipped, so capture resumes promptly
    /// once unpaused.
    pub async fn run(&mut self, mut commands: UnboundedReceiver<GrabCommand>) {
        let mut rate = tokio::time::interval(RATE_REPORT_INTERVAL);
        rate.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut next_tick: Option<tokio::time::Instant> = None;

        loop {
            if !self.running {
                next_tick = None;
            } else if next_tick.is_none() {
                // Just started: capture immediately.
                next_tick = Some(tokio::time::Instant::now());
            }

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        let previous_interval = self.grab_interval;
                        self.apply(command);
                        if self.grab_interval != previous_interval {
                            next_tick =
                                Some(tokio::time::Instant::now() + self.grab_interval);
                        }
                    }
                    None => break,
                },
                _ = rate.tick(), if self.running => {
                    self.report_capture_rate();
                }
                _ = tokio::time::sleep_until(
                    next_tick.unwrap_or_else(tokio::time::Instant::now)
                ), if next_tick.is_some() => {
                    let now = tokio::time::Instant::now();
                    if self.paused {
                        next_tick = Some(now + PAUSE_RETRY_INTERVAL);
                    } else {
                        self.tick();
                        next_tick = Some(now + self.grab_interval);
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
