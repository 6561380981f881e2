//! # glow-daemon — ambient LED daemon
//!
//! Headless service that captures configured screen regions, reduces
//! each to one color, and drives a USB LED controller with the
//! result.
//!
//! The heavy lifting lives in `glow-core`; this crate contributes
//! the TOML configuration surface and the service loop that wires
//! the capture scheduler to the device.

pub mod config;
pub mod service;
