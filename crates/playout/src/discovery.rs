//! Bridge from the driver's device arrival/removal notifications to a pair
//! of plain function-pointer callbacks.

use crate::ffi::RawDevice;
use std::sync::Arc;

/// Consumer callback receiving the affected device handle. Invoked on a
/// thread owned by the discovery subsystem, never on the caller's thread;
/// it must be reentrant and must not block.
pub type DeviceNotificationFn = extern "C" fn(device: *mut RawDevice);

/// Adapts arrival and removal events into two independent callbacks.
/// A direct, synchronous call-through: no buffering, no queuing.
pub struct NotificationBridge {
    on_arrived: DeviceNotificationFn,
    on_removed: DeviceNotificationFn,
}

impl NotificationBridge {
    pub fn new(on_arrived: DeviceNotificationFn, on_removed: DeviceNotificationFn) -> Arc<Self> {
        Arc::new(NotificationBridge {
            on_arrived,
            on_removed,
        })
    }

    pub fn device_arrived(&self, device: *mut RawDevice) {
        (self.on_arrived)(device);
    }

    pub fn device_removed(&self, device: *mut RawDevice) {
        (self.on_removed)(device);
    }
}

#[cfg(feature = "hardware")]
pub use hw::Discovery;

#[cfg(feature = "hardware")]
mod hw {
    use super::NotificationBridge;
    use crate::ffi::{self, RawDevice, RawDiscovery};
    use crate::retain;
    use std::os::raw::c_void;
    use std::ptr::NonNull;
    use std::sync::Arc;
    use tracing::debug;

    extern "C" fn arrived(ctx: *const c_void, device: *mut RawDevice) {
        let bridge = unsafe { retain::borrow(ctx as *const NotificationBridge) };
        bridge.device_arrived(device);
    }

    extern "C" fn removed(ctx: *const c_void, device: *mut RawDevice) {
        let bridge = unsafe { retain::borrow(ctx as *const NotificationBridge) };
        bridge.device_removed(device);
    }

    extern "C" fn retain_ctx(ctx: *const c_void) {
        unsafe { retain::acquire(ctx as *const NotificationBridge) };
    }

    extern "C" fn release_ctx(ctx: *const c_void) {
        unsafe { retain::release(ctx as *const NotificationBridge) };
    }

    /// The driver's registry of attached output devices.
    pub struct Discovery {
        raw: NonNull<RawDiscovery>,
    }

    impl Discovery {
        pub fn create() -> Option<Self> {
            NonNull::new(unsafe { ffi::dl_discovery_create() }).map(|raw| Discovery { raw })
        }

        /// Registers the bridge for future arrival/removal events. The
        /// discovery object may reject the registration (already installed,
        /// resource exhaustion); that is reported here and never retried.
        pub fn install_notifications(&self, bridge: &Arc<NotificationBridge>) -> bool {
            let ctx = retain::share(Arc::clone(bridge));
            let ok = unsafe {
                ffi::dl_discovery_install_notifications(
                    self.raw.as_ptr(),
                    ctx as *const c_void,
                    arrived,
                    removed,
                    retain_ctx,
                    release_ctx,
                )
            };
            if !ok {
                debug!("discovery rejected notification install");
                // Reclaim the reference the driver never took.
                unsafe { retain::release(ctx) };
            }
            ok
        }
    }

    impl Drop for Discovery {
        fn drop(&mut self) {
            unsafe { ffi::dl_object_release(self.raw.as_ptr() as *mut c_void) };
        }
    }

    // The discovery handle may be released from any thread; the driver
    // serializes its own internals.
    unsafe impl Send for Discovery {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ARRIVALS: AtomicUsize = AtomicUsize::new(0);
    static REMOVALS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn on_arrived(_device: *mut RawDevice) {
        ARRIVALS.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn on_removed(_device: *mut RawDevice) {
        REMOVALS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn events_route_to_independent_callbacks() {
        let bridge = NotificationBridge::new(on_arrived, on_removed);
        ARRIVALS.store(0, Ordering::SeqCst);
        REMOVALS.store(0, Ordering::SeqCst);

        bridge.device_arrived(ptr::null_mut());
        bridge.device_arrived(ptr::null_mut());
        bridge.device_removed(ptr::null_mut());

        assert_eq!(ARRIVALS.load(Ordering::SeqCst), 2);
        assert_eq!(REMOVALS.load(Ordering::SeqCst), 1);
    }
}
