//! filter.rs
//! Range filter: discards out-of-range readings and counts drops.
//!
//! Accept rule: `min <= value <= max && value >= threshold`. The threshold is an
//! additional lower bound checked on its own, it does not replace `min`.

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::pipeline::{
    cancel::{recv_or_cancel, send_or_cancel, CancelToken, Handoff},
    reading::Reading,
    stage::{StageExit, StageKind, StageMonitor, StageState, TerminateOnDrop},
};

/// Inclusive acceptance bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBounds {
    pub min: f64,
    pub max: f64,
    pub threshold: f64,
}

impl FilterBounds {
    pub fn new(min: f64, max: f64, threshold: f64) -> Self {
        Self { min, max, threshold }
    }

    /// NaN never passes.
    #[inline]
    pub fn accepts(&self, celsius: f64) -> bool {
        celsius >= self.min && celsius <= self.max && celsius >= self.threshold
    }
}

pub struct RangeFilter {
    input: Receiver<Reading>,
    out: Sender<Reading>,
    bounds: FilterBounds,
    dropped: Arc<AtomicU64>,
    cancel: CancelToken,
}

impl RangeFilter {
    pub fn new(
        input: Receiver<Reading>,
        out: Sender<Reading>,
        bounds: FilterBounds,
        dropped: Arc<AtomicU64>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            input,
            out,
            bounds,
            dropped,
            cancel,
        }
    }

    /// Forwards accepted readings until the input closes or cancellation fires.
    /// Each rejected reading bumps `dropped` exactly once.
    pub fn run(self, monitor: &StageMonitor) -> StageExit {
        let _terminated = TerminateOnDrop {
            monitor,
            stage: StageKind::Filter,
        };
        let RangeFilter {
            input,
            out,
            bounds,
            dropped,
            cancel,
        } = self;

        debug!("[filter] started bounds={:?}", bounds);

        let exit = loop {
            let reading = match recv_or_cancel(&input, &cancel) {
                Handoff::Done(r) => r,
                Handoff::Closed => {
                    info!("[filter] input closed > closing out");
                    break StageExit::InputClosed;
                }
                Handoff::Cancelled => break StageExit::Cancelled,
            };

            if !bounds.accepts(reading.celsius) {
                dropped.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "[filter] dropped reading seq={} value={:.2}",
                    reading.seq, reading.celsius
                );
                continue;
            }

            match send_or_cancel(&out, reading, &cancel) {
                Handoff::Done(()) => {}
                Handoff::Closed => break StageExit::OutputClosed,
                Handoff::Cancelled => break StageExit::Cancelled,
            }
        };

        monitor.advance(StageKind::Filter, StageState::Draining);
        if exit == StageExit::Cancelled {
            info!("[filter] canceled");
        }
        exit
    }
}
