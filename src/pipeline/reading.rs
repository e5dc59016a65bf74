//! reading.rs
//! Records that flow through the pipeline.
//! - `Reading`: raw Celsius sample created by the generator
//! - `Processed`: a reading enriched with its Fahrenheit value by the transformer
//! Both are immutable once created; stages hand them off by value.

use std::{sync::Arc, time::Instant};

/// Raw sensor sample (Celsius).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: Arc<str>,
    /// Per-sensor sequence number, starting at 1.
    pub seq: u64,
    pub celsius: f64,
    pub at: Instant,
}

/// Output of the transform stage (Celsius + Fahrenheit).
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub reading: Reading,
    pub fahrenheit: f64,
}

impl Processed {
    pub fn seq(&self) -> u64 {
        self.reading.seq
    }

    pub fn celsius(&self) -> f64 {
        self.reading.celsius
    }
}

/// `F = C * 9/5 + 32`
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_reference_points() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
    }
}
