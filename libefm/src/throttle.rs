use std::time::{Duration, Instant};

/// Rate limiter that lets through at most one message per `min_period`.
///
/// Messages arriving inside the window are dropped, not queued.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_period: Duration,
    last_allowed: Option<Instant>,
}

impl Throttle {
    pub fn new(min_period: Duration) -> Self {
        Self {
            min_period,
            last_allowed: None,
        }
    }

    /// Decide if a message arriving at `now` may pass, remembering it if so
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last_allowed {
            Some(last) if now.saturating_duration_since(last) < self.min_period => false,
            _ => {
                self.last_allowed = Some(now);
                true
            }
        }
    }

    pub fn min_period(&self) -> Duration {
        self.min_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_passes() {
        let mut throttle = Throttle::new(Duration::from_millis(250));
        assert!(throttle.allow(Instant::now()));
    }

    #[test]
    fn test_burst_is_thinned() {
        let period = Duration::from_millis(250);
        let mut throttle = Throttle::new(period);
        let start = Instant::now();
        // 100 Hz for two seconds
        let allowed: Vec<Instant> = (0..200)
            .map(|i| start + Duration::from_millis(10 * i))
            .filter(|t| throttle.allow(*t))
            .collect();
        assert_eq!(allowed.len(), 8);
        for pair in allowed.windows(2) {
            assert!(pair[1] - pair[0] >= period);
        }
    }

    #[test]
    fn test_zero_period_passes_everything() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let now = Instant::now();
        assert!(throttle.allow(now));
        assert!(throttle.allow(now));
    }
}
