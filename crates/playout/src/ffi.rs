//! Raw boundary to the DeckLink driver shim.
//!
//! The shim is a thin C layer over the vendor's component-object API; it is
//! built and shipped with the Desktop Video drivers setup, not by this
//! crate. All handles are opaque, all calls collapse their status codes to
//! `bool`/null, and every string the shim returns is a heap-allocated UTF-8
//! C string that must be given back through [`dl_string_free`].
//!
//! Thread contract: the shim may invoke the registered callbacks from
//! driver-owned threads at any time. Everything passed as a callback context
//! must be safe to touch from an arbitrary thread.

#![allow(dead_code)]

use std::os::raw::{c_char, c_void};

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(C)]
        pub struct $name {
            _opaque: [u8; 0],
        }
    };
}

opaque_handle!(
    /// The driver's registry of attached output devices.
    RawDiscovery
);
opaque_handle!(
    /// One physical or virtual output-capable unit, owned by the driver.
    RawDevice
);
opaque_handle!(RawDeviceAttributes);
opaque_handle!(RawOutput);
opaque_handle!(RawDisplayMode);
opaque_handle!(RawModeIterator);
opaque_handle!(
    /// A driver-owned video frame object.
    RawVideoFrame
);

/// Device arrival/removal delivery, called on a driver thread.
pub type RawDeviceCallback = extern "C" fn(ctx: *const c_void, device: *mut RawDevice);
/// Scheduled-frame completion delivery, called on a driver thread.
pub type RawCompletionCallback =
    extern "C" fn(ctx: *const c_void, frame: *mut RawVideoFrame, result: u32);
/// Playback-stopped notice, called on a driver thread.
pub type RawStoppedCallback = extern "C" fn(ctx: *const c_void);
/// Context lifetime hooks mirroring the component model's acquire/release.
pub type RawRetainCallback = extern "C" fn(ctx: *const c_void);
pub type RawReleaseCallback = extern "C" fn(ctx: *const c_void);

#[cfg(feature = "hardware")]
#[link(name = "playout_shim")]
extern "C" {
    /// On Windows this joins the multithreaded COM apartment; elsewhere it
    /// is a successful no-op.
    pub fn dl_init() -> bool;

    pub fn dl_string_free(str_: *mut c_char);

    pub fn dl_discovery_create() -> *mut RawDiscovery;
    pub fn dl_discovery_install_notifications(
        discovery: *mut RawDiscovery,
        ctx: *const c_void,
        arrived: RawDeviceCallback,
        removed: RawDeviceCallback,
        retain: RawRetainCallback,
        release: RawReleaseCallback,
    ) -> bool;

    /// Component-model acquire/release on any driver-owned handle.
    pub fn dl_object_retain(object: *mut c_void);
    pub fn dl_object_release(object: *mut c_void);

    pub fn dl_device_display_name(device: *mut RawDevice) -> *mut c_char;
    pub fn dl_device_attributes(device: *mut RawDevice) -> *mut RawDeviceAttributes;
    pub fn dl_device_output(device: *mut RawDevice) -> *mut RawOutput;

    pub fn dl_attributes_device_handle(attrs: *mut RawDeviceAttributes) -> *mut c_char;
    pub fn dl_attributes_is_active(attrs: *mut RawDeviceAttributes) -> bool;
    pub fn dl_attributes_supports_playback(attrs: *mut RawDeviceAttributes) -> bool;

    pub fn dl_output_mode_iterator(output: *mut RawOutput) -> *mut RawModeIterator;
    pub fn dl_mode_iterator_next(iter: *mut RawModeIterator) -> *mut RawDisplayMode;

    pub fn dl_mode_name(mode: *mut RawDisplayMode) -> *mut c_char;
    pub fn dl_mode_id(mode: *mut RawDisplayMode) -> u32;
    pub fn dl_mode_width(mode: *mut RawDisplayMode) -> i32;
    pub fn dl_mode_height(mode: *mut RawDisplayMode) -> i32;
    pub fn dl_mode_frame_rate(
        mode: *mut RawDisplayMode,
        frame_duration: *mut i64,
        frame_scale: *mut i64,
    ) -> bool;
    pub fn dl_mode_field_dominance(mode: *mut RawDisplayMode) -> u32;
    pub fn dl_mode_flags(mode: *mut RawDisplayMode) -> u32;

    pub fn dl_output_supports_mode(output: *mut RawOutput, mode: u32, pixel_format: u32) -> bool;
    pub fn dl_output_enable_video(output: *mut RawOutput, mode: u32) -> bool;
    pub fn dl_output_disable_video(output: *mut RawOutput) -> bool;
    pub fn dl_output_set_completion_callback(
        output: *mut RawOutput,
        ctx: *const c_void,
        completed: RawCompletionCallback,
        stopped: RawStoppedCallback,
        retain: RawRetainCallback,
        release: RawReleaseCallback,
    ) -> bool;
    pub fn dl_output_start_playback(
        output: *mut RawOutput,
        start_time: i64,
        time_scale: i64,
        speed: f64,
    ) -> bool;
    pub fn dl_output_stop_playback(output: *mut RawOutput, stop_time: i64, time_scale: i64)
        -> bool;

    /// Creates a driver frame. A null `bytes` asks the driver to allocate
    /// the backing storage itself; otherwise the caller's memory is wrapped
    /// without copying and must outlive every use of the frame.
    pub fn dl_output_create_frame(
        output: *mut RawOutput,
        width: i32,
        height: i32,
        row_bytes: i32,
        pixel_format: u32,
        bytes: *mut u8,
    ) -> *mut RawVideoFrame;
    pub fn dl_output_display_frame_sync(output: *mut RawOutput, frame: *mut RawVideoFrame)
        -> bool;
    pub fn dl_output_schedule_frame(
        output: *mut RawOutput,
        frame: *mut RawVideoFrame,
        display_time: i64,
        display_duration: i64,
        time_scale: i64,
    ) -> bool;

    pub fn dl_frame_set_flags(frame: *mut RawVideoFrame, flags: u32) -> bool;
    pub fn dl_frame_set_metadata_int(frame: *mut RawVideoFrame, id: u32, value: i64) -> bool;
    pub fn dl_frame_set_metadata_float(frame: *mut RawVideoFrame, id: u32, value: f64) -> bool;
}
