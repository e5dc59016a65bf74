//! stage.rs
//! Per-stage lifecycle: Running → Draining → Terminated.
//!
//! Each stage owns one slot in a shared `StageMonitor`; slots are atomics so the
//! orchestrator (or a test) can read them while stages run.

use log::debug;
use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Generator,
    Filter,
    Transformer,
    Sink,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Generator,
        StageKind::Filter,
        StageKind::Transformer,
        StageKind::Sink,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Generator => "generator",
            StageKind::Filter => "filter",
            StageKind::Transformer => "transform",
            StageKind::Sink => "store",
        }
    }

    fn index(&self) -> usize {
        match self {
            StageKind::Generator => 0,
            StageKind::Filter => 1,
            StageKind::Transformer => 2,
            StageKind::Sink => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StageState {
    Running = 0,
    /// Cancellation or end of input observed; finishing up and closing output.
    Draining = 1,
    /// Output closed, no further activity.
    Terminated = 2,
}

impl StageState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StageState::Running,
            1 => StageState::Draining,
            _ => StageState::Terminated,
        }
    }
}

/// Why a stage left its main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// Generator produced its configured number of samples.
    Completed,
    /// Upstream closed its output.
    InputClosed,
    /// Downstream dropped its receiver.
    OutputClosed,
    Cancelled,
    /// The stage thread panicked; recorded by the orchestrator on join.
    Panicked,
}

impl fmt::Display for StageExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageExit::Completed => "completed",
            StageExit::InputClosed => "input closed",
            StageExit::OutputClosed => "output closed",
            StageExit::Cancelled => "canceled",
            StageExit::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct StageMonitor {
    states: [AtomicU8; 4],
}

impl Default for StageMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMonitor {
    pub fn new() -> Self {
        Self {
            states: std::array::from_fn(|_| AtomicU8::new(StageState::Running as u8)),
        }
    }

    /// Moves `stage` forward. States never go backwards.
    pub fn advance(&self, stage: StageKind, next: StageState) {
        let prev = self.states[stage.index()].fetch_max(next as u8, Ordering::AcqRel);
        if prev < next as u8 {
            debug!(
                "[{}] {:?} -> {:?}",
                stage.name(),
                StageState::from_u8(prev),
                next
            );
        }
    }

    pub fn state(&self, stage: StageKind) -> StageState {
        StageState::from_u8(self.states[stage.index()].load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> [(StageKind, StageState); 4] {
        StageKind::ALL.map(|k| (k, self.state(k)))
    }

    pub fn all_terminated(&self) -> bool {
        StageKind::ALL
            .iter()
            .all(|k| self.state(*k) == StageState::Terminated)
    }
}

/// Marks a stage `Terminated` when dropped, i.e. after its output handle is gone.
/// Bind it before destructuring the stage so the output sender is dropped first.
pub(crate) struct TerminateOnDrop<'a> {
    pub monitor: &'a StageMonitor,
    pub stage: StageKind,
}

impl Drop for TerminateOnDrop<'_> {
    fn drop(&mut self) {
        self.monitor.advance(self.stage, StageState::Draining);
        self.monitor.advance(self.stage, StageState::Terminated);
    }
}
