/// Scales `count`, measured over `elapsed`, to `scale`, rounding half up.
///
/// Returns `None` when `elapsed` is zero (no data for the interval).
pub fn diffrate(count: u64, scale: u64, elapsed: u64) -> Option<u64> {
    if elapsed == 0 {
        return None;
    }
    let half = (elapsed / 2) as u128;
    let rate = ((count as u128) * (scale as u128) + half) / (elapsed as u128);
    Some(u64::try_from(rate).unwrap_or(u64::MAX))
}

/// Percentage of `elapsed` not spent waiting, clamped to `0..=100`.
///
/// Wait time can exceed the interval when a wait started before the previous sample; that reads
/// as fully idle.
pub fn busy_percent(elapsed: u64, wait_time: u64) -> Option<u8> {
    if elapsed == 0 {
        return None;
    }
    let busy = if elapsed > wait_time {
        diffrate(elapsed - wait_time, 100, elapsed)?
    } else {
        0
    };
    Some(busy.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zemu_time::TOD_UNITS_PER_SEC;

    #[test]
    fn rate_over_two_periods_is_halved() {
        let period = TOD_UNITS_PER_SEC;
        assert_eq!(diffrate(1_000_000, period, 2 * period), Some(500_000));
    }

    #[test]
    fn rate_rounds_half_up() {
        // 3 events over 2 periods = 1.5/period.
        assert_eq!(diffrate(3, 10, 20), Some(2));
        // 1 event over 3 periods = 0.33/period.
        assert_eq!(diffrate(1, 10, 30), Some(0));
        assert_eq!(diffrate(5, 10, 0), None);
    }

    #[test]
    fn busy_percent_edges() {
        assert_eq!(busy_percent(1_000, 0), Some(100));
        assert_eq!(busy_percent(1_000, 1_000), Some(0));
        assert_eq!(busy_percent(1_000, 5_000), Some(0));
        assert_eq!(busy_percent(1_000, 255), Some(75));
        assert_eq!(busy_percent(0, 0), None);
    }

    proptest! {
        #[test]
        fn busy_percent_is_clamped(elapsed in 1u64..u64::MAX / 128, wait in any::<u64>()) {
            let pct = busy_percent(elapsed, wait).unwrap();
            prop_assert!(pct <= 100);
            if wait >= elapsed {
                prop_assert_eq!(pct, 0);
            }
        }
    }
}
