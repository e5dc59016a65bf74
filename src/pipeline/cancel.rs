//! cancel.rs
//! Broadcast cancellation shared by every stage.
//!
//! The token pairs an atomic flag (cheap polling) with a zero-capacity channel
//! whose only sender is dropped on `cancel()`. A disconnected receiver is always
//! ready, so `signal()` can sit in the same `select!` as any blocking send or
//! receive: a stage parked on a handoff wakes as soon as cancellation fires.

use crossbeam::channel::{after, bounded, Receiver, Sender};
use crossbeam::select;
use log::{debug, info};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

struct Inner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cloneable cancellation handle. All clones observe the same signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded::<()>(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            debug!("[cancel] signal fired");
        }
        // Dropping the only sender disconnects `signal` for every waiter.
        self.inner.trigger.lock().take();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that becomes permanently ready once cancelled.
    /// Meant for `select!`; it never yields a value.
    #[inline]
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Blocks until cancelled or `timeout` elapses. Returns `true` if cancelled.
    #[cfg(test)]
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        select! {
            recv(self.signal()) -> _ => true,
            recv(after(timeout)) -> _ => self.is_cancelled(),
        }
    }

    /// Arms a watchdog that cancels the token once `deadline` elapses,
    /// unless the token is cancelled or the watchdog is disarmed first.
    pub fn cancel_after(&self, deadline: Duration) -> Watchdog {
        let (disarm_tx, disarm_rx) = bounded::<()>(0);
        let token = self.clone();

        let handle = thread::Builder::new()
            .name("cancel_watchdog".into())
            .spawn(move || {
                select! {
                    recv(token.signal()) -> _ => {}
                    recv(disarm_rx) -> _ => debug!("[watchdog] disarmed"),
                    recv(after(deadline)) -> _ => {
                        info!("[watchdog] deadline of {:?} reached, cancelling", deadline);
                        token.cancel();
                    }
                }
            });

        match handle {
            Ok(h) => Watchdog {
                disarm: Some(disarm_tx),
                handle: Some(h),
            },
            Err(e) => {
                // Without a watchdog thread the deadline cannot be honoured later.
                log::error!("[watchdog] failed to spawn ({}), cancelling immediately", e);
                self.cancel();
                Watchdog {
                    disarm: None,
                    handle: None,
                }
            }
        }
    }
}

/// Deadline timer returned by [`CancelToken::cancel_after`].
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Stops the timer without cancelling and waits for its thread.
    pub fn disarm(mut self) {
        self.disarm.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm.take();
    }
}

/// Outcome of a handoff attempt raced against cancellation.
#[derive(Debug, PartialEq, Eq)]
pub enum Handoff<T> {
    /// Value was received (recv) or taken by the peer (send).
    Done(T),
    /// The peer hung up: input exhausted or consumer gone.
    Closed,
    Cancelled,
}

/// Blocking receive that gives up as soon as `cancel` fires.
pub fn recv_or_cancel<T>(input: &Receiver<T>, cancel: &CancelToken) -> Handoff<T> {
    if cancel.is_cancelled() {
        return Handoff::Cancelled;
    }
    select! {
        recv(cancel.signal()) -> _ => Handoff::Cancelled,
        recv(input) -> msg => match msg {
            Ok(item) => Handoff::Done(item),
            Err(_) => Handoff::Closed,
        },
    }
}

/// Blocking send that abandons the value as soon as `cancel` fires.
pub fn send_or_cancel<T>(output: &Sender<T>, item: T, cancel: &CancelToken) -> Handoff<()> {
    if cancel.is_cancelled() {
        return Handoff::Cancelled;
    }
    select! {
        recv(cancel.signal()) -> _ => Handoff::Cancelled,
        send(output, item) -> res => match res {
            Ok(()) => Handoff::Done(()),
            Err(_) => Handoff::Closed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.signal().recv().is_err());
    }

    #[test]
    fn cancel_wakes_blocked_send() {
        let token = CancelToken::new();
        let (tx, _rx) = bounded::<u32>(0);
        let t = token.clone();
        let h = thread::spawn(move || send_or_cancel(&tx, 7, &t));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(h.join().unwrap(), Handoff::Cancelled);
    }

    #[test]
    fn cancel_wakes_blocked_recv() {
        let token = CancelToken::new();
        let (_tx, rx) = bounded::<u32>(0);
        let t = token.clone();
        let h = thread::spawn(move || recv_or_cancel(&rx, &t));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(h.join().unwrap(), Handoff::Cancelled);
    }

    #[test]
    fn recv_reports_closed_input() {
        let token = CancelToken::new();
        let (tx, rx) = bounded::<u32>(0);
        drop(tx);
        assert_eq!(recv_or_cancel(&rx, &token), Handoff::Closed);
    }

    #[test]
    fn watchdog_cancels_after_deadline() {
        let token = CancelToken::new();
        let _wd = token.cancel_after(Duration::from_millis(30));
        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn disarmed_watchdog_never_cancels() {
        let token = CancelToken::new();
        let wd = token.cancel_after(Duration::from_millis(30));
        wd.disarm();
        assert!(!token.wait_timeout(Duration::from_millis(80)));
    }
}
