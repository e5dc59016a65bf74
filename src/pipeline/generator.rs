//! generator.rs
//! Synthetic temperature sensor: the source stage.
//! - one Reading per interval tick, sequence numbers start at 1
//! - bounded (`n > 0`) or unbounded (`n <= 0`) runs
//! - the tick wait and the handoff are both raced against cancellation

use crossbeam::channel::{tick, Sender};
use log::{debug, info, trace};
use rand::random_range;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::pipeline::{
    cancel::{recv_or_cancel, send_or_cancel, CancelToken, Handoff},
    reading::Reading,
    stage::{StageExit, StageKind, StageMonitor, StageState, TerminateOnDrop},
};

/// How many samples the generator emits before closing its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleCount {
    Unbounded,
    Bounded(u64),
}

impl SampleCount {
    /// `n <= 0` means run until cancelled.
    pub fn from_signed(n: i64) -> Self {
        if n <= 0 {
            SampleCount::Unbounded
        } else {
            SampleCount::Bounded(n as u64)
        }
    }

    #[inline]
    pub fn reached(&self, emitted: u64) -> bool {
        match self {
            SampleCount::Unbounded => false,
            SampleCount::Bounded(n) => emitted >= *n,
        }
    }
}

/// Produces the raw Celsius value for a sample.
pub trait SampleSource: Send {
    fn sample(&mut self, seq: u64) -> f64;
}

impl<F> SampleSource for F
where
    F: FnMut(u64) -> f64 + Send,
{
    fn sample(&mut self, seq: u64) -> f64 {
        self(seq)
    }
}

/// Ambient temperature with bounded uniform noise: `base ± spread`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSource {
    pub base: f64,
    pub spread: f64,
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self {
            base: 25.0,
            spread: 14.0,
        }
    }
}

impl NoiseSource {
    pub fn new(base: f64, spread: f64) -> Self {
        Self {
            base,
            spread: spread.abs(),
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.base - self.spread.abs()
    }

    /// No generated value exceeds this.
    pub fn upper_bound(&self) -> f64 {
        self.base + self.spread.abs()
    }
}

impl SampleSource for NoiseSource {
    fn sample(&mut self, _seq: u64) -> f64 {
        let spread = self.spread.abs();
        self.base + random_range(-spread..=spread)
    }
}

pub struct Generator {
    pub sensor_id: Arc<str>,
    pub count: SampleCount,
    pub interval: Duration,
    pub source: Box<dyn SampleSource>,
    pub out: Sender<Reading>,
    /// Readings accepted by the downstream stage.
    pub generated: Arc<AtomicU64>,
    pub cancel: CancelToken,
}

impl Generator {
    pub fn new(
        sensor_id: &str,
        count: SampleCount,
        interval: Duration,
        source: Box<dyn SampleSource>,
        out: Sender<Reading>,
        generated: Arc<AtomicU64>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            sensor_id: Arc::from(sensor_id),
            count,
            interval,
            source,
            out,
            generated,
            cancel,
        }
    }

    /// Source loop. Returns once `count` samples were handed off, the filter
    /// hung up, or cancellation fired. The output closes on return.
    pub fn run(self, monitor: &StageMonitor) -> StageExit {
        let _terminated = TerminateOnDrop {
            monitor,
            stage: StageKind::Generator,
        };
        let Generator {
            sensor_id,
            count,
            interval,
            mut source,
            out,
            generated,
            cancel,
        } = self;

        debug!("[sensor] {} started interval={:?} count={:?}", sensor_id, interval, count);

        let ticker = tick(interval);
        let mut seq: u64 = 0;

        let exit = loop {
            if count.reached(seq) {
                info!("[sensor] produced {} readings, closing...", seq);
                break StageExit::Completed;
            }

            let at = match recv_or_cancel(&ticker, &cancel) {
                Handoff::Done(at) => at,
                Handoff::Closed => break StageExit::InputClosed,
                Handoff::Cancelled => break StageExit::Cancelled,
            };
            // Tick and cancellation may both be ready; never start a sample after cancel.
            if cancel.is_cancelled() {
                break StageExit::Cancelled;
            }

            seq += 1;
            let reading = Reading {
                sensor_id: sensor_id.clone(),
                seq,
                celsius: source.sample(seq),
                at,
            };
            trace!("[sensor] created reading seq={} value={:.2}", seq, reading.celsius);

            match send_or_cancel(&out, reading, &cancel) {
                Handoff::Done(()) => {
                    generated.fetch_add(1, Ordering::Relaxed);
                }
                Handoff::Closed => break StageExit::OutputClosed,
                Handoff::Cancelled => break StageExit::Cancelled,
            }
        };

        monitor.advance(StageKind::Generator, StageState::Draining);
        if exit == StageExit::Cancelled {
            info!("[sensor] canceled after {} readings", generated.load(Ordering::Relaxed));
        }
        exit
    }
}
