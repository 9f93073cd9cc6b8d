//! SDI playout runner
//!
//! Waits for an output-capable DeckLink device, picks the configured
//! display mode and plays a synthetic HDR test pattern through the
//! scheduled-playback path until interrupted.
//!
//! Configuration is loaded from a TOML file passed as the first argument
//! (default: configs/playout.toml). Build with `--features hardware` to
//! link against the driver shim; without it the binary only validates the
//! configuration.

use anyhow::{Context, Result};
use config::AppConfig;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "configs/playout.toml".to_string());
    let cfg = AppConfig::from_file(&path).with_context(|| format!("loading {path}"))?;
    cfg.playout.pixel_format()?;
    tracing::info!(mode = %cfg.playout.mode_name, "configuration loaded");

    run(cfg)
}

#[cfg(not(feature = "hardware"))]
fn run(_cfg: AppConfig) -> Result<()> {
    anyhow::bail!(
        "built without the hardware feature; configuration is valid but there is nothing to drive"
    );
}

#[cfg(feature = "hardware")]
fn run(cfg: AppConfig) -> Result<()> {
    hardware::run(cfg)
}

#[cfg(feature = "hardware")]
mod hardware {
    use anyhow::{anyhow, bail, Result};
    use common_io::{CompletionResult, DisplayMode, HdrMetadata, PixelFormat};
    use config::AppConfig;
    use playout::completion::CompletionBridge;
    use playout::device::Device;
    use playout::discovery::{Discovery, NotificationBridge};
    use playout::ffi::{RawDevice, RawVideoFrame};
    use playout::frame::{FrameDesc, VideoFrame};
    use playout::output::{Output, OutputDriver, OutputSession};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::{info, warn};

    static ARRIVED: Mutex<Vec<Device>> = Mutex::new(Vec::new());
    static DISPLAYED: AtomicUsize = AtomicUsize::new(0);
    static DROPPED: AtomicUsize = AtomicUsize::new(0);
    static FLUSHED: AtomicUsize = AtomicUsize::new(0);
    static RUNNING: AtomicBool = AtomicBool::new(true);

    extern "C" fn on_device_arrived(raw: *mut RawDevice) {
        if let Some(device) = unsafe { Device::from_notification(raw) } {
            if device.is_usable_for_playback() {
                ARRIVED.lock().unwrap().push(device);
            }
        }
    }

    extern "C" fn on_device_removed(_raw: *mut RawDevice) {
        warn!("output device removed, shutting down");
        RUNNING.store(false, Ordering::SeqCst);
    }

    extern "C" fn on_frame_completed(_frame: *mut RawVideoFrame, result: CompletionResult) {
        let counter = match result {
            CompletionResult::Displayed => &DISPLAYED,
            CompletionResult::DroppedLate => &DROPPED,
            CompletionResult::Flushed => &FLUSHED,
            CompletionResult::Unknown => &DROPPED,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn run(cfg: AppConfig) -> Result<()> {
        if !playout::init() {
            bail!("driver initialization failed; is the DeckLink runtime installed?");
        }

        let discovery = Discovery::create().ok_or_else(|| anyhow!("device discovery unavailable"))?;
        let bridge = NotificationBridge::new(on_device_arrived, on_device_removed);
        if !discovery.install_notifications(&bridge) {
            bail!("could not subscribe to device notifications");
        }

        let device = wait_for_device(&cfg.playout.device_name)?;
        let mut name = [0u8; 64];
        if device.display_name(&mut name) {
            let shown = name.iter().take_while(|&&b| b != 0).copied().collect::<Vec<_>>();
            info!(device = %String::from_utf8_lossy(&shown), "using output device");
        }

        let output = device
            .output()
            .ok_or_else(|| anyhow!("device has no playback interface"))?;
        let pixel_format = cfg.playout.pixel_format()?;
        let mode = pick_mode(&output, &cfg.playout.mode_name)?;
        info!(mode = %mode.name, fps = mode.fps(), "selected display mode");

        let hdr = cfg
            .hdr
            .as_ref()
            .map(|h| h.to_metadata())
            .unwrap_or_else(|| HdrMetadata::rec709(2));

        let mut session = OutputSession::new(output);
        session.enable(mode.id, pixel_format)?;
        session.install_completion(CompletionBridge::new(on_frame_completed))?;

        play(&mut session, &mode, pixel_format, &hdr, &cfg.playout)?;

        session.disable()?;
        info!(
            displayed = DISPLAYED.load(Ordering::SeqCst),
            dropped = DROPPED.load(Ordering::SeqCst),
            flushed = FLUSHED.load(Ordering::SeqCst),
            "playout finished"
        );
        Ok(())
    }

    fn wait_for_device(name_filter: &str) -> Result<Device> {
        info!("waiting for an output-capable device");
        for _ in 0..100 {
            {
                let mut arrived = ARRIVED.lock().unwrap();
                let mut keep = Vec::new();
                std::mem::swap(&mut *arrived, &mut keep);
                for device in keep {
                    if name_filter.is_empty() || name_matches(&device, name_filter) {
                        return Ok(device);
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        bail!("no matching output device arrived within 10s");
    }

    fn name_matches(device: &Device, filter: &str) -> bool {
        let mut buf = [0u8; 64];
        if !device.display_name(&mut buf) {
            return false;
        }
        let name = String::from_utf8_lossy(&buf[..buf.iter().position(|&b| b == 0).unwrap_or(0)])
            .into_owned();
        name.contains(filter)
    }

    fn pick_mode(output: &Output, wanted: &str) -> Result<DisplayMode> {
        let modes = output
            .display_modes()
            .ok_or_else(|| anyhow!("mode enumeration unavailable"))?;
        for mode in modes {
            if mode.name == wanted {
                return Ok(mode);
            }
        }
        bail!("display mode '{wanted}' not offered by this output");
    }

    fn play(
        session: &mut OutputSession<Output>,
        mode: &DisplayMode,
        pixel_format: PixelFormat,
        hdr: &HdrMetadata,
        playout_cfg: &config::PlayoutCfg,
    ) -> Result<()> {
        let desc = FrameDesc {
            width: mode.width,
            height: mode.height,
            row_bytes: mode.width as usize * 4,
            pixel_format,
        };
        let frame: Arc<dyn VideoFrame> = Arc::new(super::test_pattern(desc, *hdr));

        let duration = mode.frame_duration;
        let scale = mode.frame_scale;
        let mut counter: i64 = 0;

        // Put the pattern on screen right away; scheduled playback takes
        // over from the same image.
        session.display_frame_sync(frame.as_ref())?;

        for _ in 0..playout_cfg.preroll_frames {
            session.schedule_frame(Arc::clone(&frame), counter * duration, duration, scale)?;
            counter += 1;
        }
        session.start_playback(0, scale, playout_cfg.speed)?;
        info!(
            preroll = playout_cfg.preroll_frames,
            speed = playout_cfg.speed,
            "scheduled playback running"
        );

        let frame_time = Duration::from_nanos((duration as u64 * 1_000_000_000) / scale as u64);
        while RUNNING.load(Ordering::SeqCst) {
            let t0 = telemetry::now_ns();
            session.schedule_frame(Arc::clone(&frame), counter * duration, duration, scale)?;
            telemetry::record_ms("schedule_frame", t0);
            counter += 1;
            std::thread::sleep(frame_time);
        }

        session.stop_playback(counter * duration, scale)?;
        Ok(())
    }

}

/// Vertical luminance ramp encoded for the frame's pixel format: grey
/// with opaque alpha in BGRA, equal 10-bit channels packed big-endian
/// in r210.
#[cfg(any(feature = "hardware", test))]
fn test_pattern(
    desc: playout::frame::FrameDesc,
    hdr: common_io::HdrMetadata,
) -> playout::frame::HdrVideoFrame {
    use common_io::PixelFormat;
    use playout::frame::{HdrVideoFrame, VideoFrame};

    let mut frame = HdrVideoFrame::allocate(desc, hdr);
    let (width, height, row_bytes) = (frame.width(), frame.height(), frame.row_bytes());
    let pixel_format = frame.pixel_format();
    let bytes = frame.bytes_mut().expect("allocated frames own their storage");
    for y in 0..height as usize {
        let row = &mut bytes[y * row_bytes..y * row_bytes + width as usize * 4];
        match pixel_format {
            PixelFormat::Bgra8 => {
                let level = (y * 255 / height as usize) as u8;
                for px in row.chunks_exact_mut(4) {
                    px[0] = level;
                    px[1] = level;
                    px[2] = level;
                    px[3] = 0xFF;
                }
            }
            PixelFormat::Rgb10 => {
                let level = (y * 1023 / height as usize) as u32;
                let word = ((level << 20) | (level << 10) | level).to_be_bytes();
                for px in row.chunks_exact_mut(4) {
                    px.copy_from_slice(&word);
                }
            }
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::test_pattern;
    use common_io::{HdrMetadata, PixelFormat};
    use playout::frame::{FrameDesc, VideoFrame};

    fn desc(pixel_format: PixelFormat) -> FrameDesc {
        FrameDesc {
            width: 8,
            height: 4,
            row_bytes: 32,
            pixel_format,
        }
    }

    #[test]
    fn bgra_ramp_is_grey_with_opaque_alpha() {
        let mut frame = test_pattern(desc(PixelFormat::Bgra8), HdrMetadata::rec709(2));
        let row_bytes = frame.row_bytes();
        let bytes = frame.bytes_mut().unwrap();
        let last_row = &bytes[3 * row_bytes..4 * row_bytes];
        let level = (3 * 255 / 4) as u8;
        for px in last_row.chunks_exact(4) {
            assert_eq!(px, [level, level, level, 0xFF]);
        }
    }

    #[test]
    fn r210_ramp_packs_equal_ten_bit_channels() {
        let mut frame = test_pattern(desc(PixelFormat::Rgb10), HdrMetadata::rec709(2));
        let row_bytes = frame.row_bytes();
        let bytes = frame.bytes_mut().unwrap();
        let last_row = &bytes[3 * row_bytes..4 * row_bytes];
        let level = (3 * 1023 / 4) as u32;
        for px in last_row.chunks_exact(4) {
            let word = u32::from_be_bytes(px.try_into().unwrap());
            assert_eq!(word >> 30, 0);
            assert_eq!((word >> 20) & 0x3FF, level);
            assert_eq!((word >> 10) & 0x3FF, level);
            assert_eq!(word & 0x3FF, level);
        }
    }
}
