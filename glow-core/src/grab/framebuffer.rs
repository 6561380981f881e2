//! Framebuffer-device capture backend.
//!
//! Reads whole frames from a Linux framebuffer node (`/dev/fb0`) and
//! reduces each enabled region to one averaged color. Geometry and
//! pixel depth are re-queried on every cycle — a console mode switch
//! can change both between grabs — and the pixel buffer is
//! reallocated whenever the frame size changes.
//!
//! # Platform
//!
//! The [`FbDevice`] source is **Linux-only**. On other platforms the
//! type is still defined but opening it fails at runtime. The
//! [`FramebufferSource`] seam exists so tests (and exotic sources)
//! can feed frames from memory.

use std::io;

use tracing::{debug, warn};

use crate::error::GlowError;
use crate::grab::average::average_region;
use crate::grab::backend::CaptureBackend;
use crate::grab::geometry::clip_and_align;
use crate::types::{PixelFormat, Region, Rgb, ScreenInfo};

/// Framebuffer node opened when no path is configured.
pub const DEFAULT_FB_PATH: &str = "/dev/fb0";

// ── FramebufferSource ────────────────────────────────────────────

/// Raw data provider behind the framebuffer backend.
///
/// The device is opened and closed around every grab cycle, matching
/// how console framebuffers behave across mode switches.
pub trait FramebufferSource: Send {
    fn open(&mut self) -> io::Result<()>;

    /// Current geometry and depth. Must be queried fresh each cycle.
    fn screen_info(&mut self) -> io::Result<ScreenInfo>;

    /// Read one full frame into `buf` (exactly `buf.len()` bytes).
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn close(&mut self);
}

// ── FramebufferGrabber ───────────────────────────────────────────

/// [`CaptureBackend`] over a [`FramebufferSource`].
///
/// Only 16-bit packed RGB (RGB565) sources are decodable; any other
/// reported depth is an unsupported-format capture failure for that
/// cycle, never a crash.
pub struct FramebufferGrabber {
    source: Box<dyn FramebufferSource>,
    buffer: Vec<u8>,
}

impl FramebufferGrabber {
    pub fn new(source: Box<dyn FramebufferSource>) -> Self {
        Self {
            source,
            buffer: Vec::new(),
        }
    }

    fn grab(&mut self, regions: &[Region]) -> Result<Vec<Rgb>, GlowError> {
        self.source
            .open()
            .map_err(|e| GlowError::Capture(format!("open framebuffer: {e}")))?;

        let result = self.grab_open(regions);
        self.source.close();
        result
    }

    fn grab_open(&mut self, regions: &[Region]) -> Result<Vec<Rgb>, GlowError> {
        let info = self
            .source
            .screen_info()
            .map_err(|e| GlowError::Capture(format!("query screen info: {e}")))?;

        if info.bits_per_pixel != 16 {
            warn!(
                "framebuffer reports {} bpp, only 16 bpp is supported",
                info.bits_per_pixel
            );
            return Err(GlowError::UnsupportedPixelFormat {
                bits_per_pixel: info.bits_per_pixel,
            });
        }

        let frame_size = info.frame_size();
        if self.buffer.len() != frame_size {
            debug!("framebuffer size changed, new buffer size: {frame_size}");
            self.buffer = vec![0; frame_size];
        }

        self.source
            .read_frame(&mut self.buffer)
            .map_err(|e| GlowError::Capture(format!("read framebuffer: {e}")))?;

        let colors = regions
            .iter()
            .map(|region| {
                if !region.enabled {
                    return Rgb::BLACK;
                }
                match clip_and_align(info.width, info.height, region.rect) {
                    Some(rect) => {
                        average_region(&self.buffer, PixelFormat::Rgb565, info.pitch(), rect).color
                    }
                    None => Rgb::BLACK,
                }
            })
            .collect();

        Ok(colors)
    }
}

impl CaptureBackend for FramebufferGrabber {
    fn name(&self) -> &'static str {
        "framebuffer"
    }

    fn open(&mut self) -> Result<(), GlowError> {
        // Probe the device once; the grab cycle reopens it each time.
        self.source.open()?;
        self.source.close();
        Ok(())
    }

    fn close(&mut self) {
        self.source.close();
        self.buffer = Vec::new();
    }

    fn capture_all(&mut self, regions: &[Region]) -> Result<Vec<Rgb>, GlowError> {
        self.grab(regions)
    }
}

// ── FbDevice ─────────────────────────────────────────────────────

/// `/dev/fb*` framebuffer source.
pub struct FbDevice {
    path: std::path::PathBuf,
    #[cfg(target_os = "linux")]
    file: Option<std::fs::File>,
}

impl FbDevice {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            #[cfg(target_os = "linux")]
            file: None,
        }
    }
}

impl Default for FbDevice {
    fn default() -> Self {
        Self::new(DEFAULT_FB_PATH)
    }
}

// ── Linux implementation ─────────────────────────────────────────

#[cfg(target_os = "linux")]
mod platform {
    use std::io::{self, Read};
    use std::os::fd::AsRawFd;

    use super::{FbDevice, FramebufferSource};
    use crate::types::ScreenInfo;

    const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct FbBitfield {
        offset: u32,
        length: u32,
        msb_right: u32,
    }

    /// Mirror of `struct fb_var_screeninfo` from `<linux/fb.h>`.
    #[repr(C)]
    #[derive(Clone, Copy)]
    struct FbVarScreeninfo {
        xres: u32,
        yres: u32,
        xres_virtual: u32,
        yres_virtual: u32,
        xoffset: u32,
        yoffset: u32,
        bits_per_pixel: u32,
        grayscale: u32,
        red: FbBitfield,
        green: FbBitfield,
        blue: FbBitfield,
        transp: FbBitfield,
        nonstd: u32,
        activate: u32,
        height: u32,
        width: u32,
        accel_flags: u32,
        pixclock: u32,
        left_margin: u32,
        right_margin: u32,
        upper_margin: u32,
        lower_margin: u32,
        hsync_len: u32,
        vsync_len: u32,
        sync: u32,
        vmode: u32,
        rotate: u32,
        colorspace: u32,
        reserved: [u32; 4],
    }

    impl FramebufferSource for FbDevice {
        fn open(&mut self) -> io::Result<()> {
            if self.file.is_some() {
                return Ok(());
            }
            self.file = Some(std::fs::File::open(&self.path)?);
            Ok(())
        }

        fn screen_info(&mut self) -> io::Result<ScreenInfo> {
            let file = self
                .file
                .as_ref()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "fb not open"))?;

            let mut info: FbVarScreeninfo = unsafe { std::mem::zeroed() };
            let rc = unsafe {
                libc::ioctl(
                    file.as_raw_fd(),
                    FBIOGET_VSCREENINFO as _,
                    &mut info as *mut FbVarScreeninfo,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(ScreenInfo {
                width: info.xres,
                height: info.yres,
                bits_per_pixel: info.bits_per_pixel,
            })
        }

        fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<()> {
            let file = self
                .file
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "fb not open"))?;
            file.read_exact(buf)
        }

        fn close(&mut self) {
            self.file = None;
        }
    }
}

// ── Non-Linux stub ───────────────────────────────────────────────

#[cfg(not(target_os = "linux"))]
impl FramebufferSource for FbDevice {
    fn open(&mut self) -> io::Result<()> {
        let _ = &self.path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "framebuffer capture is only available on Linux",
        ))
    }

    fn screen_info(&mut self) -> io::Result<ScreenInfo> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "not supported"))
    }

    fn read_frame(&mut self, _buf: &mut [u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "not supported"))
    }

    fn close(&mut self) {}
}

// ── Tests ────────────────────────────────────────────────────────
