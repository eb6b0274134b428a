//! Hardware abstraction seam. The physical LED driver and GPIO edge
//! primitives are external collaborators per `spec.md` §1 — this module
//! only defines the traits the rest of the daemon programs against, plus a
//! real Raspberry Pi backend (behind the `hardware` feature) and a no-op
//! stub so the daemon still runs, LED-blind, off-target.

pub mod gpio;
pub mod strip;

use embedded_graphics::pixelcolor::Rgb888;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("GPIO/LED driver unavailable: {0}")]
    Unavailable(String),
    #[error("write failed: {0}")]
    Write(String),
}

/// Write-pixel / latch interface for the three-pixel strip.
pub trait LedStrip: Send {
    fn write(&mut self, colors: &[Rgb888]) -> Result<(), HardwareError>;
}

/// Logical button/encoder edges, already debounced by the driver. The
/// software edge-guard and quadrature decode in `crate::input` still apply
/// on top of whatever this reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEdge {
    Pressed,
    Released,
}

pub trait ButtonSource: Send {
    /// Polls the current level of a named button; callers drive their own
    /// debounce/edge-guard timing on top of this.
    fn poll_go(&mut self) -> Result<RawEdge, HardwareError>;
    fn poll_pause(&mut self) -> Result<RawEdge, HardwareError>;
    fn poll_panic(&mut self) -> Result<RawEdge, HardwareError>;
    fn poll_encoder(&mut self) -> Result<(bool, bool, RawEdge), HardwareError>;
}
