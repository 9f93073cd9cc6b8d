//! The foreign component model's two-method lifetime protocol, expressed
//! over [`Arc`] strong counts rather than a hand-rolled atomic counter.
//!
//! A bridge object crosses the driver boundary as the raw pointer produced
//! by [`share`]. The driver acquires and releases that pointer through the
//! hooks below; the object is destroyed exactly when the last reference is
//! released. After a release that observes zero remaining references the
//! pointer is dangling and must not be touched again, mirroring the
//! component model's destruction contract.
//!
//! The counts returned by [`acquire`] and [`release`] are snapshots taken
//! while other threads may concurrently hold references; they are advisory,
//! as in the foreign protocol.

use std::mem::ManuallyDrop;
use std::sync::Arc;

/// Converts an owned reference into the raw form the driver holds.
/// The count carried by `value` is transferred, not duplicated.
pub fn share<T>(value: Arc<T>) -> *const T {
    Arc::into_raw(value)
}

/// Increments the reference count and returns the new count.
///
/// # Safety
/// `ptr` must originate from [`share`] and the reference it carries must
/// still be live.
pub unsafe fn acquire<T>(ptr: *const T) -> usize {
    Arc::increment_strong_count(ptr);
    let peek = ManuallyDrop::new(Arc::from_raw(ptr));
    Arc::strong_count(&peek)
}

/// Decrements the reference count, destroying the object when it reaches
/// zero, and returns the remaining count.
///
/// # Safety
/// `ptr` must originate from [`share`] and this call consumes the caller's
/// reference: once zero has been returned the object is gone.
pub unsafe fn release<T>(ptr: *const T) -> usize {
    let owned = Arc::from_raw(ptr);
    let remaining = Arc::strong_count(&owned) - 1;
    drop(owned);
    remaining
}

/// Borrows the object behind a shared pointer without touching the count.
///
/// # Safety
/// Same liveness requirement as [`acquire`]; the returned borrow must not
/// outlive the reference the caller holds.
pub unsafe fn borrow<'a, T>(ptr: *const T) -> &'a T {
    &*ptr
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct DropTracker(Arc<AtomicUsize>);

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn acquire_then_matching_releases_destroy_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ptr = share(Arc::new(DropTracker(Arc::clone(&drops))));

        let n = 5;
        for _ in 0..n {
            unsafe { acquire(ptr) };
        }
        for _ in 0..n {
            let remaining = unsafe { release(ptr) };
            assert!(remaining > 0);
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(unsafe { release(ptr) }, 0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_acquire_release_never_double_destroys() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ptr = share(Arc::new(DropTracker(Arc::clone(&drops))));
        let addr = ptr as usize;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(move || {
                    let p = addr as *const DropTracker;
                    for _ in 0..1000 {
                        unsafe {
                            acquire(p);
                            release(p);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(unsafe { release(ptr) }, 0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
