//! transformer.rs
//! Stateless C → F stage. One Processed out for every Reading in.

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info};

use crate::pipeline::{
    cancel::{recv_or_cancel, send_or_cancel, CancelToken, Handoff},
    reading::{celsius_to_fahrenheit, Processed, Reading},
    stage::{StageExit, StageKind, StageMonitor, StageState, TerminateOnDrop},
};

pub struct UnitTransformer {
    input: Receiver<Reading>,
    out: Sender<Processed>,
    cancel: CancelToken,
}

impl UnitTransformer {
    pub fn new(input: Receiver<Reading>, out: Sender<Processed>, cancel: CancelToken) -> Self {
        Self { input, out, cancel }
    }

    #[inline]
    pub fn transform(reading: Reading) -> Processed {
        let fahrenheit = celsius_to_fahrenheit(reading.celsius);
        Processed {
            reading,
            fahrenheit,
        }
    }

    pub fn run(self, monitor: &StageMonitor) -> StageExit {
        let _terminated = TerminateOnDrop {
            monitor,
            stage: StageKind::Transformer,
        };
        let UnitTransformer { input, out, cancel } = self;
        debug!("[transform] started");

        let exit = loop {
            let reading = match recv_or_cancel(&input, &cancel) {
                Handoff::Done(r) => r,
                Handoff::Closed => {
                    info!("[transform] input closed > closing out");
                    break StageExit::InputClosed;
                }
                Handoff::Cancelled => break StageExit::Cancelled,
            };

            match send_or_cancel(&out, Self::transform(reading), &cancel) {
                Handoff::Done(()) => {}
                Handoff::Closed => break StageExit::OutputClosed,
                Handoff::Cancelled => break StageExit::Cancelled,
            }
        };

        monitor.advance(StageKind::Transformer, StageState::Draining);
        if exit == StageExit::Cancelled {
            info!("[transform] canceled");
        }
        exit
    }
}
