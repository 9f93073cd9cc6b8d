//! Playout bridge for DeckLink SDI output hardware.
//!
//! The crate is split along the driver boundary. `ffi` declares the raw C
//! shim surface, `retain` maps the driver's acquire/release protocol onto
//! `Arc` strong counts, and `frame`, `completion`, `discovery` and
//! `device` build the typed objects on top. `output` holds the
//! [`OutputSession`](output::OutputSession) scheduling facade, generic
//! over [`OutputDriver`](output::OutputDriver) so everything above the
//! driver line runs without hardware attached.
//!
//! Real driver wrappers only exist with the `hardware` feature, which
//! also turns on linking against the vendor shim.

pub mod completion;
pub mod device;
pub mod discovery;
pub mod ffi;
pub mod frame;
pub mod output;
pub mod retain;

/// One-time driver bring-up. Must succeed before any discovery or output
/// call; calling it again is harmless.
#[cfg(feature = "hardware")]
pub fn init() -> bool {
    unsafe { ffi::dl_init() }
}

/// Without hardware there is nothing to bring up.
#[cfg(not(feature = "hardware"))]
pub fn init() -> bool {
    true
}
