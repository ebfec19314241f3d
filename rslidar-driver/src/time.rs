use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static CLOCK_BASE: OnceLock<(f64, Instant)> = OnceLock::new();

/// Host time in seconds since the Unix epoch.
///
/// Read from the wall clock once, then advanced by the monotonic clock, so
/// stamps never step backwards when the system time is adjusted.
pub(crate) fn get_time() -> f64 {
    let (wall, start) = CLOCK_BASE.get_or_init(|| (wall_time(), Instant::now()));
    wall + start.elapsed().as_secs_f64()
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.)
}

#[cfg(test)]
pub(crate) fn sleep_ms(duration: u64) {
    std::thread::sleep(std::time::Duration::from_millis(duration));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_time_is_monotonic_and_follows_wall_clock() {
        let mut last = get_time();
        for _ in 0..1000 {
            let now = get_time();
            assert!(now >= last);
            last = now;
        }
        sleep_ms(10);
        assert!(get_time() > last);
        assert!((get_time() - wall_time()).abs() < 1.);
    }
}
