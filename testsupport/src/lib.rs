//! Recording driver mocks and frame builders shared by the playout test
//! suites.

use common_io::{
    CompletionResult, DisplayMode, DisplayModeFlags, FieldDominance, FrameFlags, HdrMetadata,
    PixelFormat,
};
use playout::completion::CompletionBridge;
use playout::frame::{
    FrameDesc, HdrVideoFrame, MutableVideoFrame, PlainVideoFrame, VideoBuffer, VideoFrame,
};
use playout::output::OutputDriver;
use std::ptr;
use std::sync::Arc;

pub fn desc_1080p_bgra() -> FrameDesc {
    FrameDesc {
        width: 1920,
        height: 1080,
        row_bytes: 1920 * 4,
        pixel_format: PixelFormat::Bgra8,
    }
}

pub fn make_plain_frame() -> Arc<PlainVideoFrame> {
    Arc::new(PlainVideoFrame::allocate(desc_1080p_bgra()))
}

pub fn make_hdr_frame() -> Arc<HdrVideoFrame> {
    Arc::new(HdrVideoFrame::allocate(
        desc_1080p_bgra(),
        HdrMetadata::rec709(2),
    ))
}

/// Canonical mode table a single-link HD output would report.
pub fn canned_modes() -> Vec<DisplayMode> {
    vec![
        DisplayMode {
            id: common_io::fourcc(*b"Hp25"),
            name: "1080p25".to_string(),
            width: 1920,
            height: 1080,
            frame_duration: 1000,
            frame_scale: 25000,
            field_dominance: FieldDominance::Progressive,
            flags: DisplayModeFlags::COLORSPACE_REC709,
        },
        DisplayMode {
            id: common_io::fourcc(*b"Hi50"),
            name: "1080i50".to_string(),
            width: 1920,
            height: 1080,
            frame_duration: 1000,
            frame_scale: 25000,
            field_dominance: FieldDominance::UpperFieldFirst,
            flags: DisplayModeFlags::COLORSPACE_REC709,
        },
        DisplayMode {
            id: common_io::fourcc(*b"4k25"),
            name: "2160p25".to_string(),
            width: 3840,
            height: 2160,
            frame_duration: 1000,
            frame_scale: 25000,
            field_dominance: FieldDominance::Progressive,
            flags: DisplayModeFlags::COLORSPACE_REC2020,
        },
    ]
}

pub struct ScheduledFrame {
    pub frame: Arc<dyn VideoFrame>,
    pub display_time: i64,
    pub display_duration: i64,
    pub time_scale: i64,
}

/// Records every driver call instead of touching hardware. Refusal flags
/// make individual operations report failure.
#[derive(Default)]
pub struct MockOutput {
    pub modes: Vec<DisplayMode>,
    /// Mode/format pairs the capability probe accepts. Empty accepts all.
    pub supported: Vec<(u32, PixelFormat)>,
    pub enable_calls: Vec<u32>,
    pub disable_calls: u32,
    pub starts: Vec<(i64, i64, f64)>,
    pub stops: Vec<(i64, i64)>,
    pub scheduled: Vec<ScheduledFrame>,
    pub sync_displays: u32,
    pub bridge: Option<Arc<CompletionBridge>>,
    pub refuse_enable: bool,
    pub refuse_schedule: bool,
    pub refuse_start: bool,
    pub refuse_stop: bool,
}

impl MockOutput {
    pub fn new() -> Self {
        MockOutput {
            modes: canned_modes(),
            ..MockOutput::default()
        }
    }

    pub fn supporting(mode_id: u32, pixel_format: PixelFormat) -> Self {
        MockOutput {
            supported: vec![(mode_id, pixel_format)],
            ..MockOutput::new()
        }
    }

    /// Reports every queued frame back through the installed completion
    /// bridge with the given result, in schedule order, then drops the
    /// queue.
    pub fn complete_all(&mut self, result: CompletionResult) {
        let bridge = self
            .bridge
            .clone()
            .expect("no completion bridge installed");
        for _ in self.scheduled.drain(..) {
            bridge.frame_completed(ptr::null_mut(), result.as_raw());
        }
    }
}

impl OutputDriver for MockOutput {
    fn supports_mode(&self, mode_id: u32, pixel_format: PixelFormat) -> bool {
        self.supported.is_empty() || self.supported.contains(&(mode_id, pixel_format))
    }

    fn enable_video(&mut self, mode_id: u32) -> bool {
        self.enable_calls.push(mode_id);
        !self.refuse_enable
    }

    fn disable_video(&mut self) -> bool {
        self.disable_calls += 1;
        true
    }

    fn install_completion(&mut self, bridge: Arc<CompletionBridge>) -> bool {
        self.bridge = Some(bridge);
        true
    }

    fn start_playback(&mut self, start_time: i64, time_scale: i64, speed: f64) -> bool {
        self.starts.push((start_time, time_scale, speed));
        !self.refuse_start
    }

    fn stop_playback(&mut self, stop_time: i64, time_scale: i64) -> bool {
        self.stops.push((stop_time, time_scale));
        !self.refuse_stop
    }

    fn schedule_frame(
        &mut self,
        frame: Arc<dyn VideoFrame>,
        display_time: i64,
        display_duration: i64,
        time_scale: i64,
    ) -> bool {
        if self.refuse_schedule {
            return false;
        }
        self.scheduled.push(ScheduledFrame {
            frame,
            display_time,
            display_duration,
            time_scale,
        });
        true
    }

    fn display_frame_sync(&mut self, _frame: &dyn VideoFrame) -> bool {
        self.sync_displays += 1;
        true
    }

    fn create_frame(
        &mut self,
        desc: FrameDesc,
        buffer: Option<VideoBuffer>,
    ) -> Option<Box<dyn MutableVideoFrame>> {
        let frame = match buffer {
            Some(buffer) => PlainVideoFrame::with_buffer(desc, buffer),
            None => PlainVideoFrame::allocate(desc),
        };
        Some(Box::new(MockMutableFrame::wrapping(frame)))
    }

    fn display_modes(&self) -> Option<Box<dyn Iterator<Item = DisplayMode> + '_>> {
        Some(Box::new(self.modes.iter().cloned()))
    }
}

/// Mutable frame that records metadata writes. `fail_from` makes the
/// n-th write (counting from 1, flags included) and everything after it
/// report failure.
pub struct MockMutableFrame {
    inner: PlainVideoFrame,
    pub flags: FrameFlags,
    pub flag_writes: u32,
    pub int_writes: Vec<(u32, i64)>,
    pub float_writes: Vec<(u32, f64)>,
    pub fail_from: Option<u32>,
    writes: u32,
}

impl MockMutableFrame {
    pub fn new(desc: FrameDesc) -> Self {
        Self::wrapping(PlainVideoFrame::allocate(desc))
    }

    fn wrapping(inner: PlainVideoFrame) -> Self {
        MockMutableFrame {
            inner,
            flags: FrameFlags::empty(),
            flag_writes: 0,
            int_writes: Vec::new(),
            float_writes: Vec::new(),
            fail_from: None,
            writes: 0,
        }
    }

    pub fn failing_from(desc: FrameDesc, nth_write: u32) -> Self {
        MockMutableFrame {
            fail_from: Some(nth_write),
            ..Self::new(desc)
        }
    }

    fn next_write_succeeds(&mut self) -> bool {
        self.writes += 1;
        self.fail_from.map_or(true, |n| self.writes < n)
    }
}

impl VideoFrame for MockMutableFrame {
    fn width(&self) -> u32 {
        self.inner.width()
    }
    fn height(&self) -> u32 {
        self.inner.height()
    }
    fn row_bytes(&self) -> usize {
        self.inner.row_bytes()
    }
    fn pixel_format(&self) -> PixelFormat {
        self.inner.pixel_format()
    }
    fn flags(&self) -> FrameFlags {
        self.flags
    }
    fn bytes(&self) -> *const u8 {
        self.inner.bytes()
    }
}

impl MutableVideoFrame for MockMutableFrame {
    fn set_flags(&mut self, flags: FrameFlags) -> bool {
        if !self.next_write_succeeds() {
            return false;
        }
        self.flags = flags;
        self.flag_writes += 1;
        true
    }

    fn set_metadata_int(&mut self, id: u32, value: i64) -> bool {
        if !self.next_write_succeeds() {
            return false;
        }
        self.int_writes.push((id, value));
        true
    }

    fn set_metadata_float(&mut self, id: u32, value: f64) -> bool {
        if !self.next_write_succeeds() {
            return false;
        }
        self.float_writes.push((id, value));
        true
    }
}
