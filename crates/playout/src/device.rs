//! Device attribute queries, native string handling and display-mode
//! enumeration.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr::NonNull;

/// Copies a native string into a caller-supplied buffer, truncating if it
/// does not fit. The destination is always NUL-terminated; an empty
/// destination cannot hold the terminator and fails.
pub fn write_c_string(src: &[u8], dst: &mut [u8]) -> bool {
    if dst.is_empty() {
        return false;
    }
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n] = 0;
    true
}

/// A string allocated by the driver shim. Released through the supplied
/// free function on drop, exactly once, no matter how often it was copied
/// out or whether the copies truncated.
pub struct NativeString {
    raw: NonNull<c_char>,
    free: unsafe fn(*mut c_char),
}

impl NativeString {
    /// # Safety
    /// `raw` must point at a NUL-terminated string that stays valid until
    /// drop and that `free` releases.
    pub(crate) unsafe fn with_free(
        raw: *mut c_char,
        free: unsafe fn(*mut c_char),
    ) -> Option<Self> {
        NonNull::new(raw).map(|raw| NativeString { raw, free })
    }

    pub fn copy_to(&self, dst: &mut [u8]) -> bool {
        let bytes = unsafe { CStr::from_ptr(self.raw.as_ptr()) }.to_bytes();
        write_c_string(bytes, dst)
    }

    pub fn to_string_lossy(&self) -> String {
        unsafe { CStr::from_ptr(self.raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for NativeString {
    fn drop(&mut self) {
        unsafe { (self.free)(self.raw.as_ptr()) };
    }
}

#[cfg(feature = "hardware")]
pub use hw::{Device, DeviceAttributes, DisplayModes};

#[cfg(feature = "hardware")]
mod hw {
    use super::NativeString;
    use crate::ffi::{self, RawDevice, RawDeviceAttributes, RawDisplayMode, RawModeIterator};
    use crate::output::Output;
    use common_io::{DisplayMode, DisplayModeFlags, FieldDominance};
    use std::os::raw::{c_char, c_void};
    use std::ptr::NonNull;

    unsafe fn free_native(str_: *mut c_char) {
        ffi::dl_string_free(str_);
    }

    fn native_string(raw: *mut c_char) -> Option<NativeString> {
        unsafe { NativeString::with_free(raw, free_native) }
    }

    /// A borrowed reference to a driver-owned output device. Acquires on
    /// construction, releases on drop; the enumeration subsystem keeps
    /// owning the device itself.
    pub struct Device {
        raw: NonNull<RawDevice>,
    }

    impl Device {
        /// Wraps the handle delivered by a notification callback, taking an
        /// additional reference on it.
        ///
        /// # Safety
        /// `raw` must be a live device handle from the discovery subsystem.
        pub unsafe fn from_notification(raw: *mut RawDevice) -> Option<Self> {
            let raw = NonNull::new(raw)?;
            ffi::dl_object_retain(raw.as_ptr() as *mut c_void);
            Some(Device { raw })
        }

        pub fn as_raw(&self) -> *mut RawDevice {
            self.raw.as_ptr()
        }

        /// Copies the device's display name into `dst`, transcoded and
        /// NUL-terminated.
        pub fn display_name(&self, dst: &mut [u8]) -> bool {
            match native_string(unsafe { ffi::dl_device_display_name(self.raw.as_ptr()) }) {
                Some(name) => name.copy_to(dst),
                None => false,
            }
        }

        pub fn attributes(&self) -> Option<DeviceAttributes> {
            NonNull::new(unsafe { ffi::dl_device_attributes(self.raw.as_ptr()) })
                .map(|raw| DeviceAttributes { raw })
        }

        pub fn output(&self) -> Option<Output> {
            Output::query(self.raw.as_ptr())
        }

        /// Arrival filter used by playout consumers: the device profile is
        /// active and the unit can play video out.
        pub fn is_usable_for_playback(&self) -> bool {
            self.attributes()
                .map(|attrs| attrs.is_active() && attrs.supports_playback())
                .unwrap_or(false)
        }
    }

    impl Drop for Device {
        fn drop(&mut self) {
            unsafe { ffi::dl_object_release(self.raw.as_ptr() as *mut c_void) };
        }
    }

    unsafe impl Send for Device {}

    /// Profile attribute view of a device.
    pub struct DeviceAttributes {
        raw: NonNull<RawDeviceAttributes>,
    }

    impl DeviceAttributes {
        /// Copies the persistent device handle id into `dst`.
        pub fn device_handle(&self, dst: &mut [u8]) -> bool {
            match native_string(unsafe { ffi::dl_attributes_device_handle(self.raw.as_ptr()) }) {
                Some(id) => id.copy_to(dst),
                None => false,
            }
        }

        pub fn is_active(&self) -> bool {
            unsafe { ffi::dl_attributes_is_active(self.raw.as_ptr()) }
        }

        pub fn supports_playback(&self) -> bool {
            unsafe { ffi::dl_attributes_supports_playback(self.raw.as_ptr()) }
        }
    }

    impl Drop for DeviceAttributes {
        fn drop(&mut self) {
            unsafe { ffi::dl_object_release(self.raw.as_ptr() as *mut c_void) };
        }
    }

    unsafe impl Send for DeviceAttributes {}

    /// Forward-only sequence of the display modes an output supports.
    /// Exhausted for good once the driver runs out; enumerate again by
    /// requesting a fresh sequence from the output.
    pub struct DisplayModes {
        raw: Option<NonNull<RawModeIterator>>,
    }

    impl DisplayModes {
        pub(crate) fn new(raw: *mut RawModeIterator) -> Self {
            DisplayModes {
                raw: NonNull::new(raw),
            }
        }
    }

    impl Iterator for DisplayModes {
        type Item = DisplayMode;

        fn next(&mut self) -> Option<DisplayMode> {
            let iter = self.raw?;
            loop {
                let handle = unsafe { ffi::dl_mode_iterator_next(iter.as_ptr()) };
                if handle.is_null() {
                    return None;
                }
                // Modes the driver reports incompletely are skipped, not
                // surfaced as errors.
                if let Some(mode) = mode_from_raw(handle) {
                    return Some(mode);
                }
            }
        }
    }

    impl Drop for DisplayModes {
        fn drop(&mut self) {
            if let Some(iter) = self.raw {
                unsafe { ffi::dl_object_release(iter.as_ptr() as *mut c_void) };
            }
        }
    }

    unsafe impl Send for DisplayModes {}

    /// Reads every field of one driver mode handle and releases it.
    fn mode_from_raw(handle: *mut RawDisplayMode) -> Option<DisplayMode> {
        let mode = read_mode_fields(handle);
        unsafe { ffi::dl_object_release(handle as *mut c_void) };
        mode
    }

    fn read_mode_fields(handle: *mut RawDisplayMode) -> Option<DisplayMode> {
        let name = native_string(unsafe { ffi::dl_mode_name(handle) })?;
        let width = unsafe { ffi::dl_mode_width(handle) };
        let height = unsafe { ffi::dl_mode_height(handle) };
        let mut frame_duration = 0i64;
        let mut frame_scale = 0i64;
        if !unsafe { ffi::dl_mode_frame_rate(handle, &mut frame_duration, &mut frame_scale) } {
            return None;
        }
        if width <= 0 || height <= 0 || frame_duration <= 0 || frame_scale <= 0 {
            return None;
        }
        let field_dominance =
            FieldDominance::from_raw(unsafe { ffi::dl_mode_field_dominance(handle) })?;
        Some(DisplayMode {
            id: unsafe { ffi::dl_mode_id(handle) },
            name: name.to_string_lossy(),
            width: width as u32,
            height: height as u32,
            frame_duration,
            frame_scale,
            field_dominance,
            flags: DisplayModeFlags::from_bits_retain(unsafe { ffi::dl_mode_flags(handle) }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{write_c_string, NativeString};
    use std::ffi::CString;
    use std::os::raw::c_char;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FREES: AtomicUsize = AtomicUsize::new(0);

    unsafe fn counting_free(str_: *mut c_char) {
        FREES.fetch_add(1, Ordering::SeqCst);
        drop(CString::from_raw(str_));
    }

    fn native(text: &str) -> NativeString {
        let raw = CString::new(text).unwrap().into_raw();
        unsafe { NativeString::with_free(raw, counting_free) }.unwrap()
    }

    #[test]
    fn exact_fit_is_terminated() {
        let mut dst = [0xFFu8; 6];
        assert!(write_c_string(b"1080p", &mut dst));
        assert_eq!(&dst, b"1080p\0");
    }

    #[test]
    fn truncates_and_still_terminates() {
        let mut dst = [0xFFu8; 4];
        assert!(write_c_string(b"DeckLink Mini Monitor 4K", &mut dst));
        assert_eq!(&dst, b"Dec\0");
    }

    #[test]
    fn empty_destination_fails() {
        assert!(!write_c_string(b"x", &mut []));
    }

    #[test]
    fn short_source_leaves_tail_untouched() {
        let mut dst = [0xFFu8; 8];
        assert!(write_c_string(b"ok", &mut dst));
        assert_eq!(&dst[..3], b"ok\0");
        assert_eq!(&dst[3..], [0xFF; 5]);
    }

    #[test]
    fn native_string_is_freed_exactly_once() {
        FREES.store(0, Ordering::SeqCst);

        // Exact fit, copied out twice before release.
        let name = native("1080p");
        let mut dst = [0u8; 6];
        assert!(name.copy_to(&mut dst));
        assert!(name.copy_to(&mut dst));
        assert_eq!(&dst, b"1080p\0");
        assert_eq!(FREES.load(Ordering::SeqCst), 0);
        drop(name);
        assert_eq!(FREES.load(Ordering::SeqCst), 1);

        // Truncated copy still releases the native allocation once.
        let name = native("DeckLink Mini Monitor 4K");
        let mut small = [0u8; 4];
        assert!(name.copy_to(&mut small));
        assert_eq!(&small, b"Dec\0");
        drop(name);
        assert_eq!(FREES.load(Ordering::SeqCst), 2);
    }
}
