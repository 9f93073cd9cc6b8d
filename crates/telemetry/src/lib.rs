// lib.rs - Main telemetry API
mod time;

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "human-log")]
mod log;

pub use time::{now_ns, since_ms};

/// Record a measurement in milliseconds
///
/// Emits the measurement to the configured backend (log or json)
pub fn record_ms(name: &str, start_ns: u64) {
    let ms = since_ms(start_ns);

    #[cfg(feature = "json")]
    json::emit(name, ms);

    #[cfg(all(not(feature = "json"), feature = "human-log"))]
    log::emit(name, ms);

    #[cfg(all(not(feature = "json"), not(feature = "human-log")))]
    let _ = ms;
}

/// Time a call and emit its latency under `name`
///
/// The main helper for measuring scheduling and callback turnaround
pub fn time_call<T>(name: &'static str, f: impl FnOnce() -> T) -> T {
    let t0 = now_ns();
    let output = f();
    record_ms(name, t0);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_advances() {
        let t0 = now_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(now_ns() > t0);
        assert!(since_ms(t0) >= 1.0);
    }

    #[test]
    fn time_call_passes_value_through() {
        assert_eq!(time_call("noop", || 41 + 1), 42);
    }
}
