use std::time::Duration;

/// Exponential backoff parameters for retrying transient stream-open errors.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry `attempt` (0-based). A server-suggested delay
    /// takes precedence over the computed backoff.
    pub fn retry_delay(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(delay) = suggested {
            return delay;
        }

        let exp_delay = self.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            (random_u64() % (jitter_range as u64 * 2 + 1)) as f64 - jitter_range
        } else {
            0.0
        };
        let final_ms = (capped + jitter).max(1.0);

        Duration::from_millis(final_ms as u64)
    }
}

/// Simple non-cryptographic random u64 using thread-local xorshift state.
fn random_u64() -> u64 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1
        );
    }

    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        x
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffConfig {
        BackoffConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn suggested_delay_wins() {
        let config = no_jitter();
        let delay = config.retry_delay(0, Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn exponential_growth() {
        let config = no_jitter();
        assert_eq!(config.retry_delay(0, None).as_millis(), 100);
        assert_eq!(config.retry_delay(1, None).as_millis(), 200);
        assert_eq!(config.retry_delay(2, None).as_millis(), 400);
    }

    #[test]
    fn capped_at_max() {
        let config = BackoffConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
        };
        assert_eq!(config.retry_delay(10, None).as_millis(), 5000);
    }

    #[test]
    fn jitter_stays_in_range() {
        let config = BackoffConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        };
        for _ in 0..100 {
            let ms = config.retry_delay(1, None).as_millis() as f64;
            assert!((160.0..=240.0).contains(&ms), "delay out of range: {ms}");
        }
    }

    #[test]
    fn random_values_differ() {
        let a = random_u64();
        let b = random_u64();
        assert_ne!(a, b);
    }
}
