use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(a: f64, b: f64) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Distance from `value` to the nearest point of the interval.
    pub fn distance(&self, value: f64) -> f64 {
        if value < self.min {
            self.min - value
        } else if value > self.max {
            value - self.max
        } else {
            0.0
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn widen(&self, margin: f64) -> Interval {
        Interval { min: self.min - margin, max: self.max + margin }
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

impl From<(f64, f64)> for Interval {
    fn from((a, b): (f64, f64)) -> Self {
        Interval::new(a, b)
    }
}

impl From<Interval> for (f64, f64) {
    fn from(interval: Interval) -> Self {
        (interval.min, interval.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_orders_endpoints() {
        let interval = Interval::new(5.0, -5.0);
        assert_eq!(interval.min, -5.0);
        assert!(interval.contains(0.0));
        assert_eq!(interval.clamp(9.0), 5.0);
        assert_eq!(interval.distance(-7.0), 2.0);
    }
}
