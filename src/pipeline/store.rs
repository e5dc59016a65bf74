//! store.rs
//! Thread-safe, append-only record store plus the sink stage that fills it.
//!
//! - `append` takes the write lock, so a snapshot never sees a half-written record
//! - `snapshot` takes the read lock and copies; readers don't block each other
//! - `count` is a plain atomic load and never touches the lock

use crossbeam::{channel::Receiver, sync::WaitGroup};
use log::{debug, info};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::pipeline::{
    cancel::{recv_or_cancel, CancelToken, Handoff},
    reading::Processed,
    stage::{StageExit, StageKind, StageMonitor, StageState, TerminateOnDrop},
};

const INITIAL_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct Store {
    data: RwLock<Vec<Processed>>,
    count: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Vec::with_capacity(INITIAL_CAPACITY)),
            count: AtomicU64::new(0),
        }
    }

    pub fn append(&self, record: Processed) {
        let mut data = self.data.write();
        data.push(record);
        // Bumped under the write lock so `count()` never runs ahead of the data.
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Independent copy of everything stored so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Processed> {
        self.data.read().clone()
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn first(&self) -> Option<Processed> {
        self.data.read().first().cloned()
    }

    pub fn last(&self) -> Option<Processed> {
        self.data.read().last().cloned()
    }
}

/// Sink stage: drains the transformer's output into the store.
pub struct StoreSink {
    input: Receiver<Processed>,
    store: Arc<Store>,
    cancel: CancelToken,
    done: WaitGroup,
}

impl StoreSink {
    /// `done` is released when the sink finishes, which is what the orchestrator waits on.
    pub fn new(
        input: Receiver<Processed>,
        store: Arc<Store>,
        cancel: CancelToken,
        done: WaitGroup,
    ) -> Self {
        Self {
            input,
            store,
            cancel,
            done,
        }
    }

    pub fn run(self, monitor: &StageMonitor) -> StageExit {
        let _terminated = TerminateOnDrop {
            monitor,
            stage: StageKind::Sink,
        };
        let StoreSink {
            input,
            store,
            cancel,
            done,
        } = self;
        debug!("[store] consumer started");

        let exit = loop {
            match recv_or_cancel(&input, &cancel) {
                Handoff::Done(record) => store.append(record),
                Handoff::Closed => {
                    info!("[store] input closed > done");
                    break StageExit::InputClosed;
                }
                Handoff::Cancelled => {
                    info!("[store] canceled");
                    break StageExit::Cancelled;
                }
            }
        };

        monitor.advance(StageKind::Sink, StageState::Draining);
        drop(input);
        monitor.advance(StageKind::Sink, StageState::Terminated);
        drop(done);
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reading::Reading;
    use crossbeam::channel::bounded;
    use std::{thread, time::Instant};

    fn record(seq: u64) -> Processed {
        Processed {
            reading: Reading {
                sensor_id: Arc::from("s"),
                seq,
                celsius: seq as f64,
                at: Instant::now(),
            },
            fahrenheit: seq as f64 * 9.0 / 5.0 + 32.0,
        }
    }

    #[test]
    fn count_matches_appends() {
        let store = Store::new();
        assert_eq!(store.count(), 0);
        assert!(store.first().is_none());
        for seq in 1..=3 {
            store.append(record(seq));
        }
        assert_eq!(store.count(), 3);
        assert_eq!(store.first().map(|p| p.seq()), Some(1));
        assert_eq!(store.last().map(|p| p.seq()), Some(3));
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let store = Store::new();
        store.append(record(1));
        let snap = store.snapshot();
        store.append(record(2));
        assert_eq!(snap.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn concurrent_writers_and_readers_never_see_torn_records() {
        const WRITERS: u64 = 4;
        const PER_WRITER: u64 = 2_000;

        let store = Arc::new(Store::new());
        let mut handles = Vec::new();

        for w in 0..WRITERS {
            let s = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_WRITER {
                    s.append(record(w * PER_WRITER + i));
                }
            }));
        }

        let reader = {
            let s = store.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let before = s.count();
                    let snap = s.snapshot();
                    assert!(snap.len() as u64 >= before);
                    for p in &snap {
                        assert_eq!(p.fahrenheit, p.celsius() * 9.0 / 5.0 + 32.0);
                        assert_eq!(p.celsius(), p.seq() as f64);
                    }
                }
            })
        };

        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(store.count(), WRITERS * PER_WRITER);
        assert_eq!(store.snapshot().len() as u64, WRITERS * PER_WRITER);
    }

    #[test]
    fn sink_releases_barrier_when_input_closes() {
        let (tx, rx) = bounded(0);
        let store = Arc::new(Store::new());
        let wg = WaitGroup::new();
        let monitor = Arc::new(StageMonitor::new());
        let sink = StoreSink::new(rx, store.clone(), CancelToken::new(), wg.clone());

        let m = monitor.clone();
        let h = thread::spawn(move || sink.run(&m));
        for seq in 1..=4 {
            tx.send(record(seq)).unwrap();
        }
        drop(tx);

        wg.wait();
        assert_eq!(store.count(), 4);
        assert_eq!(monitor.state(StageKind::Sink), StageState::Terminated);
        assert_eq!(h.join().unwrap(), StageExit::InputClosed);
    }
}
