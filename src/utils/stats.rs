//! Summary statistics over stored records.

use crate::pipeline::reading::Processed;

/// Statistics summary for a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean of the Celsius values.
pub fn summarize(records: &[Processed]) -> Option<Stats> {
    if records.is_empty() {
        return None;
    }

    let count = records.len();
    let values = records.iter().map(Processed::celsius);
    let min = values.clone().fold(f64::INFINITY, f64::min);
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reading::Reading;
    use std::{sync::Arc, time::Instant};

    fn record(celsius: f64) -> Processed {
        Processed {
            reading: Reading {
                sensor_id: Arc::from("s"),
                seq: 1,
                celsius,
                at: Instant::now(),
            },
            fahrenheit: celsius * 9.0 / 5.0 + 32.0,
        }
    }

    #[test]
    fn empty_has_no_stats() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn min_max_mean() {
        let s = summarize(&[record(30.0), record(40.0), record(35.0)]).unwrap();
        assert_eq!(s.min, 30.0);
        assert_eq!(s.max, 40.0);
        assert_eq!(s.mean, 35.0);
        assert_eq!(s.count, 3);
    }
}
