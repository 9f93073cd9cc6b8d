//! The playout scheduling façade and the driver seam it sits on.
//!
//! [`OutputSession`] is the state machine consumers drive: enable an output
//! for a display mode, queue frames against the playback clock, start and
//! stop that clock. It is generic over [`OutputDriver`] so the hardware can
//! be replaced by a recording mock in tests.

use crate::completion::CompletionBridge;
use crate::frame::{FrameDesc, MutableVideoFrame, VideoBuffer, VideoFrame};
use common_io::{DisplayMode, PixelFormat};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// What the driver layer of an output must provide.
///
/// Every call collapses the hardware status to a plain success flag; the
/// driver neither retries nor reorders anything. All methods must be safe
/// to call while driver-owned threads concurrently deliver completions.
pub trait OutputDriver {
    /// Capability probe for a mode/pixel-format combination. Pure query,
    /// performs no mutation.
    fn supports_mode(&self, mode_id: u32, pixel_format: PixelFormat) -> bool;

    fn enable_video(&mut self, mode_id: u32) -> bool;
    fn disable_video(&mut self) -> bool;

    /// Hands the completion bridge to the driver, which takes its own
    /// reference on it.
    fn install_completion(&mut self, bridge: Arc<CompletionBridge>) -> bool;

    fn start_playback(&mut self, start_time: i64, time_scale: i64, speed: f64) -> bool;
    fn stop_playback(&mut self, stop_time: i64, time_scale: i64) -> bool;

    /// Enqueues a frame for display at `display_time / time_scale` seconds
    /// on the playback clock, for `display_duration / time_scale` seconds.
    /// The driver is the sole arbiter of actual display order and timing.
    fn schedule_frame(
        &mut self,
        frame: Arc<dyn VideoFrame>,
        display_time: i64,
        display_duration: i64,
        time_scale: i64,
    ) -> bool;

    /// Immediate single-frame display, bypassing the scheduling queue and
    /// the completion protocol.
    fn display_frame_sync(&mut self, frame: &dyn VideoFrame) -> bool;

    /// Creates a driver-owned mutable frame, wrapping `buffer` without
    /// copying when given, or letting the driver allocate otherwise.
    fn create_frame(
        &mut self,
        desc: FrameDesc,
        buffer: Option<VideoBuffer>,
    ) -> Option<Box<dyn MutableVideoFrame>>;

    /// A fresh, forward-only display-mode sequence. An exhausted sequence
    /// stays exhausted; restart by requesting a new one.
    fn display_modes(&self) -> Option<Box<dyn Iterator<Item = DisplayMode> + '_>>;
}

/// Where the output currently is on its enable/playback lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Disabled,
    /// Output enabled, playback clock stopped.
    Idle,
    /// Output enabled, playback clock running.
    Running,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutputError {
    /// The capability probe rejected the combination; the enable call was
    /// never attempted.
    #[error("display mode {mode_id:#010x} does not support pixel format {pixel_format:?}")]
    UnsupportedMode {
        mode_id: u32,
        pixel_format: PixelFormat,
    },
    #[error("operation requires {expected}, output is {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: PlaybackState,
    },
    /// The driver reported failure. Whether to retry is the caller's call;
    /// the façade never does.
    #[error("driver rejected {0}")]
    Driver(&'static str),
}

/// The scheduling state machine: Disabled → Idle → Running → Idle.
pub struct OutputSession<D: OutputDriver> {
    driver: D,
    state: PlaybackState,
}

impl<D: OutputDriver> OutputSession<D> {
    pub fn new(driver: D) -> Self {
        OutputSession {
            driver,
            state: PlaybackState::Disabled,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Disabled → Idle. Probes mode support first and short-circuits on
    /// rejection without touching the enable call.
    pub fn enable(&mut self, mode_id: u32, pixel_format: PixelFormat) -> Result<(), OutputError> {
        self.expect(PlaybackState::Disabled, "a disabled output")?;
        if !self.driver.supports_mode(mode_id, pixel_format) {
            debug!(mode_id, ?pixel_format, "mode rejected by capability probe");
            return Err(OutputError::UnsupportedMode {
                mode_id,
                pixel_format,
            });
        }
        if !self.driver.enable_video(mode_id) {
            warn!(mode_id, "driver refused to enable video output");
            return Err(OutputError::Driver("enable"));
        }
        debug!(mode_id, "video output enabled");
        self.state = PlaybackState::Idle;
        Ok(())
    }

    /// Enabled → Disabled. Calling while the playback clock runs is a
    /// caller error the driver leaves undefined; it is not guarded here.
    pub fn disable(&mut self) -> Result<(), OutputError> {
        self.expect_enabled("an enabled output")?;
        if !self.driver.disable_video() {
            return Err(OutputError::Driver("disable"));
        }
        debug!("video output disabled");
        self.state = PlaybackState::Disabled;
        Ok(())
    }

    /// Installs the completion bridge frames scheduled afterwards will
    /// report through.
    pub fn install_completion(&mut self, bridge: Arc<CompletionBridge>) -> Result<(), OutputError> {
        self.expect_enabled("an enabled output")?;
        if !self.driver.install_completion(bridge) {
            return Err(OutputError::Driver("completion callback install"));
        }
        Ok(())
    }

    /// Valid while enabled, idle or running. Callers must submit frames in
    /// non-decreasing display time; the façade neither sorts nor validates
    /// ordering.
    pub fn schedule_frame(
        &mut self,
        frame: Arc<dyn VideoFrame>,
        display_time: i64,
        display_duration: i64,
        time_scale: i64,
    ) -> Result<(), OutputError> {
        self.expect_enabled("an enabled output")?;
        if !self
            .driver
            .schedule_frame(frame, display_time, display_duration, time_scale)
        {
            return Err(OutputError::Driver("frame schedule"));
        }
        Ok(())
    }

    /// Idle → Running. Establishes the playback clock origin and rate
    /// multiplier (1.0 = real-time).
    pub fn start_playback(
        &mut self,
        start_time: i64,
        time_scale: i64,
        speed: f64,
    ) -> Result<(), OutputError> {
        self.expect(PlaybackState::Idle, "an idle output")?;
        if !self.driver.start_playback(start_time, time_scale, speed) {
            return Err(OutputError::Driver("playback start"));
        }
        debug!(start_time, time_scale, speed, "scheduled playback started");
        self.state = PlaybackState::Running;
        Ok(())
    }

    /// Running → Idle. Frames already queued past the stop time are
    /// expected to surface as flushed completions.
    pub fn stop_playback(&mut self, stop_time: i64, time_scale: i64) -> Result<(), OutputError> {
        self.expect(PlaybackState::Running, "a running output")?;
        if !self.driver.stop_playback(stop_time, time_scale) {
            return Err(OutputError::Driver("playback stop"));
        }
        debug!(stop_time, time_scale, "scheduled playback stopped");
        self.state = PlaybackState::Idle;
        Ok(())
    }

    /// Immediate synchronous display of one frame, bypassing the queue.
    /// Does not participate in the completion protocol.
    pub fn display_frame_sync(&mut self, frame: &dyn VideoFrame) -> Result<(), OutputError> {
        self.expect_enabled("an enabled output")?;
        if !self.driver.display_frame_sync(frame) {
            return Err(OutputError::Driver("synchronous display"));
        }
        Ok(())
    }

    fn expect(&self, state: PlaybackState, expected: &'static str) -> Result<(), OutputError> {
        if self.state == state {
            Ok(())
        } else {
            Err(OutputError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn expect_enabled(&self, expected: &'static str) -> Result<(), OutputError> {
        if self.state == PlaybackState::Disabled {
            Err(OutputError::InvalidState {
                expected,
                actual: self.state,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(feature = "hardware")]
pub use hw::{DriverFrame, Output};

#[cfg(feature = "hardware")]
mod hw {
    use super::OutputDriver;
    use crate::completion::{self, CompletionBridge};
    use crate::device::DisplayModes;
    use crate::ffi::{self, RawDevice, RawOutput, RawVideoFrame};
    use crate::frame::{
        FrameDesc, FrameMetadata, MutableVideoFrame, VideoBuffer, VideoFrame,
        attach_hdr_metadata,
    };
    use crate::retain;
    use common_io::{
        Chromaticity, Colorspace, DisplayMode, FrameFlags, HdrMetadata, PixelFormat, metadata_id,
    };
    use std::os::raw::c_void;
    use std::ptr::{self, NonNull};
    use std::sync::Arc;
    use tracing::warn;

    /// The playback interface of a real device.
    pub struct Output {
        raw: NonNull<RawOutput>,
    }

    impl Output {
        pub(crate) fn query(device: *mut RawDevice) -> Option<Self> {
            NonNull::new(unsafe { ffi::dl_device_output(device) }).map(|raw| Output { raw })
        }

        /// Builds a driver frame around the synthetic frame's storage and
        /// pushes its metadata through the decoration path. The caller's
        /// buffer must stay valid until the driver is done with the frame.
        fn materialize(&mut self, frame: &dyn VideoFrame) -> Option<NonNull<RawVideoFrame>> {
            let raw = NonNull::new(unsafe {
                ffi::dl_output_create_frame(
                    self.raw.as_ptr(),
                    frame.width() as i32,
                    frame.height() as i32,
                    frame.row_bytes() as i32,
                    frame.pixel_format().as_raw(),
                    frame.bytes() as *mut u8,
                )
            })?;
            if let Some(meta) = frame.metadata() {
                let desc = FrameDesc {
                    width: frame.width(),
                    height: frame.height(),
                    row_bytes: frame.row_bytes(),
                    pixel_format: frame.pixel_format(),
                };
                let mut driver_frame = DriverFrame::adopt(raw, desc, frame.bytes());
                match read_hdr_block(meta) {
                    Some(hdr) if attach_hdr_metadata(&mut driver_frame, &hdr) => {
                        // DriverFrame::into_raw keeps the reference alive.
                        return Some(driver_frame.into_raw());
                    }
                    _ => {
                        warn!("HDR decoration of driver frame failed");
                        drop(driver_frame);
                        return None;
                    }
                }
            }
            Some(raw)
        }
    }

    impl OutputDriver for Output {
        fn supports_mode(&self, mode_id: u32, pixel_format: PixelFormat) -> bool {
            unsafe {
                ffi::dl_output_supports_mode(self.raw.as_ptr(), mode_id, pixel_format.as_raw())
            }
        }

        fn enable_video(&mut self, mode_id: u32) -> bool {
            unsafe { ffi::dl_output_enable_video(self.raw.as_ptr(), mode_id) }
        }

        fn disable_video(&mut self) -> bool {
            unsafe { ffi::dl_output_disable_video(self.raw.as_ptr()) }
        }

        fn install_completion(&mut self, bridge: Arc<CompletionBridge>) -> bool {
            let ctx = retain::share(bridge);
            let ok = unsafe {
                ffi::dl_output_set_completion_callback(
                    self.raw.as_ptr(),
                    ctx as *const c_void,
                    completion::trampoline::completed,
                    completion::trampoline::stopped,
                    completion::trampoline::retain,
                    completion::trampoline::release,
                )
            };
            if !ok {
                // Reclaim the reference the driver never took.
                unsafe { retain::release(ctx) };
            }
            ok
        }

        fn start_playback(&mut self, start_time: i64, time_scale: i64, speed: f64) -> bool {
            unsafe {
                ffi::dl_output_start_playback(self.raw.as_ptr(), start_time, time_scale, speed)
            }
        }

        fn stop_playback(&mut self, stop_time: i64, time_scale: i64) -> bool {
            unsafe { ffi::dl_output_stop_playback(self.raw.as_ptr(), stop_time, time_scale) }
        }

        fn schedule_frame(
            &mut self,
            frame: Arc<dyn VideoFrame>,
            display_time: i64,
            display_duration: i64,
            time_scale: i64,
        ) -> bool {
            let Some(raw) = self.materialize(frame.as_ref()) else {
                return false;
            };
            let ok = unsafe {
                ffi::dl_output_schedule_frame(
                    self.raw.as_ptr(),
                    raw.as_ptr(),
                    display_time,
                    display_duration,
                    time_scale,
                )
            };
            // The driver took its own reference when accepting the frame.
            unsafe { ffi::dl_object_release(raw.as_ptr() as *mut c_void) };
            ok
        }

        fn display_frame_sync(&mut self, frame: &dyn VideoFrame) -> bool {
            let Some(raw) = self.materialize(frame) else {
                return false;
            };
            let ok =
                unsafe { ffi::dl_output_display_frame_sync(self.raw.as_ptr(), raw.as_ptr()) };
            unsafe { ffi::dl_object_release(raw.as_ptr() as *mut c_void) };
            ok
        }

        fn create_frame(
            &mut self,
            desc: FrameDesc,
            buffer: Option<VideoBuffer>,
        ) -> Option<Box<dyn MutableVideoFrame>> {
            let bytes = buffer
                .as_ref()
                .map(|b| b.as_ptr() as *mut u8)
                .unwrap_or(ptr::null_mut());
            let raw = NonNull::new(unsafe {
                ffi::dl_output_create_frame(
                    self.raw.as_ptr(),
                    desc.width as i32,
                    desc.height as i32,
                    desc.row_bytes as i32,
                    desc.pixel_format.as_raw(),
                    bytes,
                )
            })?;
            Some(Box::new(DriverFrame::adopt(raw, desc, bytes)))
        }

        fn display_modes(&self) -> Option<Box<dyn Iterator<Item = DisplayMode> + '_>> {
            let raw = unsafe { ffi::dl_output_mode_iterator(self.raw.as_ptr()) };
            if raw.is_null() {
                return None;
            }
            Some(Box::new(DisplayModes::new(raw)))
        }
    }

    impl Drop for Output {
        fn drop(&mut self) {
            unsafe { ffi::dl_object_release(self.raw.as_ptr() as *mut c_void) };
        }
    }

    unsafe impl Send for Output {}

    /// A driver-owned mutable frame. Geometry is cached from creation; the
    /// driver does not expose read-back for it.
    pub struct DriverFrame {
        raw: NonNull<RawVideoFrame>,
        desc: FrameDesc,
        bytes: *const u8,
        flags: FrameFlags,
    }

    impl DriverFrame {
        fn adopt(raw: NonNull<RawVideoFrame>, desc: FrameDesc, bytes: *const u8) -> Self {
            DriverFrame {
                raw,
                desc,
                bytes,
                flags: FrameFlags::empty(),
            }
        }

        fn into_raw(self) -> NonNull<RawVideoFrame> {
            let raw = self.raw;
            std::mem::forget(self);
            raw
        }
    }

    impl VideoFrame for DriverFrame {
        fn width(&self) -> u32 {
            self.desc.width
        }
        fn height(&self) -> u32 {
            self.desc.height
        }
        fn row_bytes(&self) -> usize {
            self.desc.row_bytes
        }
        fn pixel_format(&self) -> PixelFormat {
            self.desc.pixel_format
        }
        fn flags(&self) -> FrameFlags {
            self.flags
        }
        fn bytes(&self) -> *const u8 {
            self.bytes
        }
    }

    impl MutableVideoFrame for DriverFrame {
        fn set_flags(&mut self, flags: FrameFlags) -> bool {
            let ok = unsafe { ffi::dl_frame_set_flags(self.raw.as_ptr(), flags.bits()) };
            if ok {
                self.flags = flags;
            }
            ok
        }

        fn set_metadata_int(&mut self, id: u32, value: i64) -> bool {
            unsafe { ffi::dl_frame_set_metadata_int(self.raw.as_ptr(), id, value) }
        }

        fn set_metadata_float(&mut self, id: u32, value: f64) -> bool {
            unsafe { ffi::dl_frame_set_metadata_float(self.raw.as_ptr(), id, value) }
        }
    }

    impl Drop for DriverFrame {
        fn drop(&mut self) {
            unsafe { ffi::dl_object_release(self.raw.as_ptr() as *mut c_void) };
        }
    }

    unsafe impl Send for DriverFrame {}
    unsafe impl Sync for DriverFrame {}

    /// Reads the full metadata block back out of a provider, field by
    /// field, the way the hardware consumes it.
    fn read_hdr_block(meta: &dyn FrameMetadata) -> Option<HdrMetadata> {
        let float = |id| meta.metadata_float(id).ok();
        Some(HdrMetadata {
            eotf: meta.metadata_int(metadata_id::HDR_EOTF).ok()?,
            red: Chromaticity {
                x: float(metadata_id::HDR_PRIMARIES_RED_X)?,
                y: float(metadata_id::HDR_PRIMARIES_RED_Y)?,
            },
            green: Chromaticity {
                x: float(metadata_id::HDR_PRIMARIES_GREEN_X)?,
                y: float(metadata_id::HDR_PRIMARIES_GREEN_Y)?,
            },
            blue: Chromaticity {
                x: float(metadata_id::HDR_PRIMARIES_BLUE_X)?,
                y: float(metadata_id::HDR_PRIMARIES_BLUE_Y)?,
            },
            white_point: Chromaticity {
                x: float(metadata_id::HDR_WHITE_POINT_X)?,
                y: float(metadata_id::HDR_WHITE_POINT_Y)?,
            },
            max_display_mastering_luminance: float(
                metadata_id::HDR_MAX_DISPLAY_MASTERING_LUMINANCE,
            )?,
            min_display_mastering_luminance: float(
                metadata_id::HDR_MIN_DISPLAY_MASTERING_LUMINANCE,
            )?,
            max_content_light_level: float(metadata_id::HDR_MAX_CONTENT_LIGHT_LEVEL)?,
            max_frame_average_light_level: float(metadata_id::HDR_MAX_FRAME_AVERAGE_LIGHT_LEVEL)?,
            colorspace: Colorspace::from_raw(
                meta.metadata_int(metadata_id::COLORSPACE).ok()? as u32
            )?,
        })
    }
}
