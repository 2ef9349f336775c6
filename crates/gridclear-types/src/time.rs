/// Simulated time in seconds on the shared co-simulation clock
pub type SimTime = f64;

/// Step `t` forward by `step` seconds, rounded to the millisecond grid so that
/// repeated microsteps do not accumulate floating drift.
pub fn advance_by(t: SimTime, step: SimTime) -> SimTime {
    ((t + step) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_stays_on_grid() {
        let mut t = 0.0;
        for _ in 0..1000 {
            t = advance_by(t, 0.010);
        }
        assert_eq!(t, 10.0);
    }

    #[test]
    fn test_advance_from_offset() {
        assert_eq!(advance_by(299.995, 0.010), 300.005);
    }
}
