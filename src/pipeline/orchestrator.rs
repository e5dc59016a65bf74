//! orchestrator.rs
//! Wires generator → filter → transformer → store and waits for the drain.
//!
//! Every edge is a zero-capacity crossbeam channel, so a stage can be at most one
//! record ahead of its consumer. The orchestrator owns the cancellation token and
//! blocks on a `WaitGroup` released only by the sink; shutdown cascades stage by
//! stage as each one drops its output sender.

use crossbeam::{channel::bounded, sync::WaitGroup};
use log::{error, info, warn};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::pipeline::{
    cancel::{CancelToken, Watchdog},
    filter::RangeFilter,
    generator::{Generator, SampleSource},
    reading::{Processed, Reading},
    stage::{StageExit, StageKind, StageMonitor},
    store::{Store, StoreSink},
    transformer::UnitTransformer,
};
use crate::utils::{
    config::PipelineConfig,
    error::{PipelineError, Result},
};

/// A configured, not yet started pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    source: Option<Box<dyn SampleSource>>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source: None,
            cancel: CancelToken::new(),
        })
    }

    /// Replaces the default noise source for the generator.
    pub fn with_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Runs under an externally owned token, e.g. one shared with other work.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts all four stages and returns immediately.
    pub fn spawn(self) -> Result<PipelineHandle> {
        let Pipeline {
            config,
            source,
            cancel,
        } = self;

        let started = Instant::now();
        let monitor = Arc::new(StageMonitor::new());
        let store = Arc::new(Store::new());
        let generated = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let done = WaitGroup::new();

        // Rendezvous edges: backpressure of at most one in-flight record.
        let (tx_raw, rx_raw) = bounded::<Reading>(0);
        let (tx_kept, rx_kept) = bounded::<Reading>(0);
        let (tx_proc, rx_proc) = bounded::<Processed>(0);

        let source: Box<dyn SampleSource> = match source {
            Some(s) => s,
            None => Box::new(config.noise),
        };
        let generator = Generator::new(
            &config.sensor_id,
            config.sample_count(),
            config.interval,
            source,
            tx_raw,
            generated.clone(),
            cancel.clone(),
        );
        let filter = RangeFilter::new(rx_raw, tx_kept, config.bounds, dropped.clone(), cancel.clone());
        let transformer = UnitTransformer::new(rx_kept, tx_proc, cancel.clone());
        let sink = StoreSink::new(rx_proc, store.clone(), cancel.clone(), done.clone());

        info!(
            "[main] starting pipeline sensor={} samples={} interval={:?} bounds={:?}",
            config.sensor_id, config.samples, config.interval, config.bounds
        );

        // Spawned sink-first so every consumer is in place before its producer.
        let bodies: [(StageKind, StageBody); 4] = [
            (StageKind::Sink, Box::new(move |m: &StageMonitor| sink.run(m))),
            (StageKind::Transformer, Box::new(move |m: &StageMonitor| transformer.run(m))),
            (StageKind::Filter, Box::new(move |m: &StageMonitor| filter.run(m))),
            (StageKind::Generator, Box::new(move |m: &StageMonitor| generator.run(m))),
        ];
        let mut stages = Vec::with_capacity(bodies.len());
        for (kind, body) in bodies {
            match spawn_stage(kind, &monitor, body) {
                Ok(handle) => stages.push(handle),
                Err(e) => {
                    // Whatever did start must not stay parked on a handoff.
                    cancel.cancel();
                    for (_, h) in stages {
                        let _ = h.join();
                    }
                    return Err(e);
                }
            }
        }

        let watchdog = config.deadline.map(|d| {
            info!("[main] run deadline armed: {:?}", d);
            cancel.cancel_after(d)
        });

        Ok(PipelineHandle {
            cancel,
            store,
            generated,
            dropped,
            monitor,
            done,
            stages,
            watchdog,
            started,
        })
    }

    /// Starts the pipeline and blocks until it has fully drained.
    pub fn run(self) -> Result<PipelineReport> {
        Ok(self.spawn()?.join())
    }
}

type StageBody = Box<dyn FnOnce(&StageMonitor) -> StageExit + Send>;

fn spawn_stage(
    kind: StageKind,
    monitor: &Arc<StageMonitor>,
    body: StageBody,
) -> Result<(StageKind, JoinHandle<StageExit>)> {
    let monitor = monitor.clone();
    thread::Builder::new()
        .name(format!("stage_{}", kind.name()))
        .spawn(move || body(&monitor))
        .map(|h| (kind, h))
        .map_err(|source| PipelineError::Spawn {
            stage: kind.name(),
            source,
        })
}

/// A running pipeline.
pub struct PipelineHandle {
    cancel: CancelToken,
    store: Arc<Store>,
    generated: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    monitor: Arc<StageMonitor>,
    done: WaitGroup,
    stages: Vec<(StageKind, JoinHandle<StageExit>)>,
    watchdog: Option<Watchdog>,
    started: Instant,
}

impl PipelineHandle {
    /// Requests a coordinated shutdown. `join` still returns a report.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Live view of the sink; `count()`/`snapshot()` are safe while running.
    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn monitor(&self) -> Arc<StageMonitor> {
        self.monitor.clone()
    }

    /// Readings handed off by the generator so far.
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Blocks until the sink has drained, joins every stage and builds the report.
    pub fn join(self) -> PipelineReport {
        let PipelineHandle {
            cancel: _cancel,
            store,
            generated,
            dropped,
            monitor,
            done,
            stages,
            watchdog,
            started,
        } = self;

        done.wait();
        info!("[main] sink finished, joining stages");

        if let Some(wd) = watchdog {
            wd.disarm();
        }

        let mut exits = Vec::with_capacity(stages.len());
        for (kind, handle) in stages {
            match handle.join() {
                Ok(exit) => {
                    info!("[main] {} exited: {}", kind.name(), exit);
                    exits.push((kind, exit));
                }
                Err(_) => {
                    error!("[main] {} thread panicked", kind.name());
                    exits.push((kind, StageExit::Panicked));
                }
            }
        }
        if !monitor.all_terminated() {
            warn!("[main] stage states after join: {:?}", monitor.snapshot());
        }

        let report = PipelineReport {
            kept: store.count(),
            dropped: dropped.load(Ordering::Acquire),
            generated: generated.load(Ordering::Acquire),
            cancelled: exits.iter().any(|(_, e)| *e == StageExit::Cancelled),
            failed: exits.iter().any(|(_, e)| *e == StageExit::Panicked),
            first: store.first(),
            last: store.last(),
            elapsed: started.elapsed(),
            exits,
        };
        info!(
            "[main] done in {:?}: generated={} kept={} dropped={} cancelled={} failed={}",
            report.elapsed,
            report.generated,
            report.kept,
            report.dropped,
            report.cancelled,
            report.failed
        );
        report
    }
}

/// Final counts plus the first and last stored records.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub kept: u64,
    pub dropped: u64,
    pub generated: u64,
    /// At least one stage stopped because of cancellation.
    pub cancelled: bool,
    /// At least one stage thread panicked; the counts are then partial.
    pub failed: bool,
    pub first: Option<Processed>,
    pub last: Option<Processed>,
    pub elapsed: Duration,
    pub exits: Vec<(StageKind, StageExit)>,
}

impl PipelineReport {
    /// `generated == kept + dropped` with no failed stage; only guaranteed
    /// for uncancelled runs.
    pub fn is_balanced(&self) -> bool {
        !self.failed && self.generated == self.kept + self.dropped
    }

    /// Stages whose thread panicked, in join order.
    pub fn failed_stages(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.exits
            .iter()
            .filter(|(_, e)| *e == StageExit::Panicked)
            .map(|(k, _)| *k)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Kept:   {} readings (stored)", self.kept)?;
        writeln!(f, "Dropped:{} readings (filtered out)", self.dropped)?;
        if let (Some(first), Some(last)) = (&self.first, &self.last) {
            writeln!(
                f,
                "First kept: seq={}, C={:.2}, F={:.2}",
                first.seq(),
                first.celsius(),
                first.fahrenheit
            )?;
            writeln!(
                f,
                "Last  kept: seq={}, C={:.2}, F={:.2}",
                last.seq(),
                last.celsius(),
                last.fahrenheit
            )?;
        }
        for kind in self.failed_stages() {
            writeln!(f, "FAILED: {} stage panicked", kind.name())?;
        }
        Ok(())
    }
}
