//! Bridge from the driver's scheduled-frame completion events to a plain
//! function-pointer callback.

use crate::ffi::RawVideoFrame;
use common_io::CompletionResult;
use std::sync::Arc;

/// Consumer callback invoked once per scheduled frame, on a driver-owned
/// thread. It must be reentrant and must not block; the bridge performs no
/// buffering between the driver and this pointer.
pub type FrameCompletionFn = extern "C" fn(frame: *mut RawVideoFrame, result: CompletionResult);

/// Adapts the driver's completion events into one plain callback.
///
/// Shared with the driver through [`crate::retain::share`]; the driver
/// acquires and releases its reference through the component-model hooks
/// and the bridge is destroyed when the last reference goes.
pub struct CompletionBridge {
    on_completed: FrameCompletionFn,
}

impl CompletionBridge {
    pub fn new(on_completed: FrameCompletionFn) -> Arc<Self> {
        Arc::new(CompletionBridge { on_completed })
    }

    /// Forwards one completion event. Called from a driver thread; the
    /// bridge adds nothing beyond mapping the raw result code.
    pub fn frame_completed(&self, frame: *mut RawVideoFrame, raw_result: u32) {
        (self.on_completed)(frame, CompletionResult::from_raw(raw_result));
    }

    /// The driver also reports that playback as a whole has stopped. The
    /// event is accepted to satisfy the interface and deliberately produces
    /// no callback.
    pub fn playback_stopped(&self) {}
}

#[cfg(feature = "hardware")]
pub(crate) mod trampoline {
    use super::CompletionBridge;
    use crate::ffi::RawVideoFrame;
    use crate::retain;
    use std::os::raw::c_void;

    pub(crate) extern "C" fn completed(ctx: *const c_void, frame: *mut RawVideoFrame, result: u32) {
        let bridge = unsafe { retain::borrow(ctx as *const CompletionBridge) };
        bridge.frame_completed(frame, result);
    }

    pub(crate) extern "C" fn stopped(ctx: *const c_void) {
        let bridge = unsafe { retain::borrow(ctx as *const CompletionBridge) };
        bridge.playback_stopped();
    }

    pub(crate) extern "C" fn retain(ctx: *const c_void) {
        unsafe { retain::acquire(ctx as *const CompletionBridge) };
    }

    pub(crate) extern "C" fn release(ctx: *const c_void) {
        unsafe { retain::release(ctx as *const CompletionBridge) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static LAST_RESULT: AtomicU32 = AtomicU32::new(u32::MAX);

    extern "C" fn record(_frame: *mut RawVideoFrame, result: CompletionResult) {
        CALLS.fetch_add(1, Ordering::SeqCst);
        LAST_RESULT.store(result as u32, Ordering::SeqCst);
    }

    #[test]
    fn forwards_each_event_and_maps_result_codes() {
        let bridge = CompletionBridge::new(record);
        CALLS.store(0, Ordering::SeqCst);

        bridge.frame_completed(ptr::null_mut(), 0);
        assert_eq!(
            LAST_RESULT.load(Ordering::SeqCst),
            CompletionResult::Displayed as u32
        );
        bridge.frame_completed(ptr::null_mut(), 3);
        assert_eq!(
            LAST_RESULT.load(Ordering::SeqCst),
            CompletionResult::Flushed as u32
        );
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);

        // No callback for the stop notice.
        bridge.playback_stopped();
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
