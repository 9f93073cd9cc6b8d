//! End-to-end exercises of the scheduling state machine against the
//! recording driver mock.

use common_io::{metadata_id, CompletionResult, HdrMetadata, PixelFormat};
use playout::completion::CompletionBridge;
use playout::frame::{attach_hdr_metadata, VideoFrame};
use playout::output::{OutputDriver, OutputError, OutputSession, PlaybackState};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use testsupport::{desc_1080p_bgra, make_hdr_frame, make_plain_frame, MockMutableFrame, MockOutput};

const MODE_1080P25: u32 = common_io::fourcc(*b"Hp25");

fn enabled_session() -> OutputSession<MockOutput> {
    let mut session = OutputSession::new(MockOutput::new());
    session.enable(MODE_1080P25, PixelFormat::Bgra8).unwrap();
    session
}

#[test]
fn every_scheduled_frame_completes_exactly_once() {
    static COMPLETIONS: AtomicUsize = AtomicUsize::new(0);
    extern "C" fn on_completed(
        _frame: *mut playout::ffi::RawVideoFrame,
        _result: CompletionResult,
    ) {
        COMPLETIONS.fetch_add(1, Ordering::SeqCst);
    }

    let mut session = enabled_session();
    session
        .install_completion(CompletionBridge::new(on_completed))
        .unwrap();

    // Out-of-order display times are passed straight through.
    for display_time in [10i64, 20, 5] {
        session
            .schedule_frame(make_plain_frame(), display_time, 1000, 25000)
            .unwrap();
    }
    session.start_playback(0, 25000, 1.0).unwrap();

    session.driver_mut().complete_all(CompletionResult::Displayed);
    assert_eq!(COMPLETIONS.load(Ordering::SeqCst), 3);
    assert!(session.driver().scheduled.is_empty());

    let times: Vec<i64> = session
        .driver()
        .starts
        .iter()
        .map(|&(start, _, _)| start)
        .collect();
    assert_eq!(times, [0]);
}

#[test]
fn submission_order_and_timing_are_preserved() {
    let mut session = enabled_session();
    for display_time in [10i64, 20, 5] {
        session
            .schedule_frame(make_plain_frame(), display_time, 1000, 25000)
            .unwrap();
    }
    let recorded: Vec<i64> = session
        .driver()
        .scheduled
        .iter()
        .map(|s| s.display_time)
        .collect();
    assert_eq!(recorded, [10, 20, 5]);
    assert!(session
        .driver()
        .scheduled
        .iter()
        .all(|s| s.display_duration == 1000 && s.time_scale == 25000));
}

#[test]
fn unsupported_mode_short_circuits_before_enable() {
    let mut session = OutputSession::new(MockOutput::supporting(
        MODE_1080P25,
        PixelFormat::Bgra8,
    ));
    let err = session
        .enable(MODE_1080P25, PixelFormat::Rgb10)
        .unwrap_err();
    assert_eq!(
        err,
        OutputError::UnsupportedMode {
            mode_id: MODE_1080P25,
            pixel_format: PixelFormat::Rgb10,
        }
    );
    // The probe rejected it, so the enable call itself never happened.
    assert!(session.driver().enable_calls.is_empty());
    assert_eq!(session.state(), PlaybackState::Disabled);
}

#[test]
fn lifecycle_transitions_are_enforced() {
    let mut session = OutputSession::new(MockOutput::new());
    assert!(matches!(
        session.schedule_frame(make_plain_frame(), 0, 1000, 25000),
        Err(OutputError::InvalidState { .. })
    ));
    assert!(matches!(
        session.start_playback(0, 25000, 1.0),
        Err(OutputError::InvalidState { .. })
    ));

    session.enable(MODE_1080P25, PixelFormat::Bgra8).unwrap();
    assert_eq!(session.state(), PlaybackState::Idle);
    assert!(matches!(
        session.stop_playback(0, 25000),
        Err(OutputError::InvalidState { .. })
    ));

    session.start_playback(0, 25000, 1.0).unwrap();
    assert_eq!(session.state(), PlaybackState::Running);
    assert!(matches!(
        session.start_playback(0, 25000, 1.0),
        Err(OutputError::InvalidState { .. })
    ));
    // Scheduling stays legal while the clock runs.
    session
        .schedule_frame(make_plain_frame(), 30, 1000, 25000)
        .unwrap();

    session.stop_playback(75, 25000).unwrap();
    assert_eq!(session.state(), PlaybackState::Idle);
    session.disable().unwrap();
    assert_eq!(session.state(), PlaybackState::Disabled);
    assert_eq!(session.driver().disable_calls, 1);
}

#[test]
fn driver_refusal_leaves_state_untouched() {
    let mut session = enabled_session();
    session.driver_mut().refuse_start = true;
    assert_eq!(
        session.start_playback(0, 25000, 1.0),
        Err(OutputError::Driver("playback start"))
    );
    assert_eq!(session.state(), PlaybackState::Idle);
    // The refused call still reached the driver; nothing retried it.
    assert_eq!(session.driver().starts.len(), 1);
}

#[test]
fn stopping_flushes_queued_frames() {
    static FLUSHED: AtomicUsize = AtomicUsize::new(0);
    static LAST: AtomicU32 = AtomicU32::new(u32::MAX);
    extern "C" fn on_completed(
        _frame: *mut playout::ffi::RawVideoFrame,
        result: CompletionResult,
    ) {
        FLUSHED.fetch_add(1, Ordering::SeqCst);
        LAST.store(result as u32, Ordering::SeqCst);
    }

    let mut session = enabled_session();
    session
        .install_completion(CompletionBridge::new(on_completed))
        .unwrap();
    session.start_playback(0, 25000, 1.0).unwrap();
    for i in 0..4 {
        session
            .schedule_frame(make_plain_frame(), i * 1000, 1000, 25000)
            .unwrap();
    }
    session.stop_playback(0, 25000).unwrap();
    session.driver_mut().complete_all(CompletionResult::Flushed);

    assert_eq!(FLUSHED.load(Ordering::SeqCst), 4);
    assert_eq!(
        CompletionResult::from_raw(LAST.load(Ordering::SeqCst)),
        CompletionResult::Flushed
    );
}

#[test]
fn hdr_frames_carry_their_metadata_through_the_queue() {
    let mut session = enabled_session();
    session
        .schedule_frame(make_hdr_frame(), 0, 1000, 25000)
        .unwrap();
    let queued = &session.driver().scheduled[0].frame;
    let meta = queued.metadata().expect("HDR frame exposes metadata");
    assert_eq!(meta.metadata_int(metadata_id::HDR_EOTF).unwrap(), 2);
}

#[test]
fn sync_display_bypasses_the_queue() {
    let mut session = enabled_session();
    let frame = make_plain_frame();
    session.display_frame_sync(frame.as_ref()).unwrap();
    session.start_playback(0, 25000, 1.0).unwrap();
    session.display_frame_sync(frame.as_ref()).unwrap();
    assert_eq!(session.driver().sync_displays, 2);
    assert!(session.driver().scheduled.is_empty());
}

#[test]
fn metadata_decoration_stops_at_first_failed_write_without_rollback() {
    // Write order: flags, eotf, twelve floats, colorspace. Failing the
    // sixth write rejects the fourth float and everything after it.
    let mut frame = MockMutableFrame::failing_from(desc_1080p_bgra(), 6);
    let hdr = HdrMetadata::rec709(2);
    assert!(!attach_hdr_metadata(&mut frame, &hdr));

    assert_eq!(frame.flag_writes, 1);
    assert_eq!(frame.int_writes, [(metadata_id::HDR_EOTF, 2)]);
    let written: Vec<u32> = frame.float_writes.iter().map(|&(id, _)| id).collect();
    assert_eq!(
        written,
        [
            metadata_id::HDR_PRIMARIES_RED_X,
            metadata_id::HDR_PRIMARIES_RED_Y,
            metadata_id::HDR_PRIMARIES_GREEN_X,
        ]
    );
}

#[test]
fn fresh_mode_iterators_restart_from_the_top() {
    let session = OutputSession::new(MockOutput::new());
    let first: Vec<String> = session
        .driver()
        .display_modes()
        .unwrap()
        .map(|m| m.name)
        .collect();
    assert_eq!(first, ["1080p25", "1080i50", "2160p25"]);

    let mut second = session.driver().display_modes().unwrap();
    assert_eq!(second.next().unwrap().name, "1080p25");
    // Forward only; draining leaves nothing behind.
    assert_eq!(second.by_ref().count(), 2);
    // An exhausted sequence stays exhausted; only a fresh one restarts.
    assert!(second.next().is_none());
    assert!(second.next().is_none());
}

#[test]
fn completion_bridge_keeps_driver_reference_alive() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    extern "C" fn on_completed(
        _frame: *mut playout::ffi::RawVideoFrame,
        _result: CompletionResult,
    ) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let mut session = enabled_session();
    let bridge = CompletionBridge::new(on_completed);
    session.install_completion(Arc::clone(&bridge)).unwrap();
    drop(bridge);

    session
        .schedule_frame(make_plain_frame(), 0, 1000, 25000)
        .unwrap();
    session.driver_mut().complete_all(CompletionResult::Displayed);
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
}
