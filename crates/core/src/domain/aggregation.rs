// Counter aggregation: derive per-second rates from raw counters

use serde::{Deserialize, Serialize};

const COUNTER32_MAX: f64 = 4_294_967_295.0;
const COUNTER64_MAX: f64 = 18_446_744_073_709_551_615.0;

/// Function applied downstream to turn successive raw counter readings into a rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Plain derivative; a decreasing counter yields no value
    Counter,
    /// Derivative of a 32-bit counter that may wrap once
    Counter32,
    /// Derivative of a 64-bit counter that may wrap once
    Counter64,
}

impl Aggregation {
    /// Rate between `previous` and `current` over `delta` seconds
    pub fn apply(&self, previous: f64, current: f64, delta: f64) -> Option<f64> {
        if delta <= 0.0 {
            return None;
        }

        match self {
            Aggregation::Counter => {
                if current < previous {
                    None
                } else {
                    Some((current - previous) / delta)
                }
            }
            Aggregation::Counter32 => Some(Self::wrapping(previous, current, COUNTER32_MAX) / delta),
            Aggregation::Counter64 => Some(Self::wrapping(previous, current, COUNTER64_MAX) / delta),
        }
    }

    fn wrapping(previous: f64, current: f64, max: f64) -> f64 {
        if current < previous {
            (max - previous) + current
        } else {
            current - previous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rate() {
        assert_eq!(Aggregation::Counter.apply(100.0, 160.0, 2.0), Some(30.0));
    }

    #[test]
    fn test_counter_reset_is_dropped() {
        assert_eq!(Aggregation::Counter.apply(100.0, 10.0, 1.0), None);
    }

    #[test]
    fn test_counter32_wraps() {
        let rate = Aggregation::Counter32.apply(COUNTER32_MAX - 5.0, 5.0, 1.0);
        assert_eq!(rate, Some(10.0));
    }

    #[test]
    fn test_zero_delta_yields_nothing() {
        assert_eq!(Aggregation::Counter64.apply(1.0, 2.0, 0.0), None);
    }
}
