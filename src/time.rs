/// Timestamps are nanoseconds since the epoch of the data source.
pub type Time = u64;

/// Durations share the nanosecond unit of [`Time`].
pub type Duration = u64;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

pub fn from_sec_nsec(sec: u32, nsec: u32) -> Time {
    sec as u64 * NANOS_PER_SEC + nsec as u64
}

pub fn to_secs(time: Time) -> f64 {
    time as f64 / NANOS_PER_SEC as f64
}

/// Converts a (possibly fractional) number of seconds to nanoseconds. Negative and
/// non-finite inputs clamp to zero.
pub fn secs_to_nanos(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * NANOS_PER_SEC as f64).round() as Duration
}

/// Fraction of the way `time` lies between `start` and `end`, clamped to `[0, 1]`.
pub fn fraction(start: Time, end: Time, time: Time) -> f64 {
    if end <= start {
        return 0.0;
    }
    let t = time.clamp(start, end);
    (t - start) as f64 / (end - start) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_units() {
        assert_eq!(from_sec_nsec(2, 5), 2_000_000_005);
        assert_eq!(secs_to_nanos(1.5), 1_500_000_000);
        assert_eq!(secs_to_nanos(-3.0), 0);
        assert_eq!(secs_to_nanos(f64::NAN), 0);
        approx::assert_relative_eq!(to_secs(2_500_000_000), 2.5);
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(fraction(0, 10, 5), 0.5);
        assert_eq!(fraction(0, 10, 20), 1.0);
        assert_eq!(fraction(10, 10, 10), 0.0);
    }
}
