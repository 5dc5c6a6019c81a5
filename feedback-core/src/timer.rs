//! Owned timers
//!
//! A [`Timer`] is a spawned task that sends [`Signal::Timer`] to its
//! Event. Dropping the handle aborts the task, so a timer cannot outlive the
//! field that owns it. Each signal also carries the Event's timer generation
//! so one that was already queued before cancellation is recognised as
//! stale.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::signal::{Signal, SignalSender, TimerKind};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct Timer {
    kind: TimerKind,
    handle: JoinHandle<()>,
}

impl Timer {
    /// Fire once after `delay`
    ///
    /// Returns `None` when called outside a tokio runtime.
    pub fn once(
        delay: Duration,
        sender: SignalSender,
        kind: TimerKind,
        generation: u64,
    ) -> Option<Self> {
        let runtime = runtime_handle(kind)?;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            sender.send(Signal::Timer { kind, generation });
        });
        Some(Self { kind, handle })
    }

    /// Fire every `period`, starting one period from now
    ///
    /// A zero period is raised to one millisecond.
    pub fn repeating(
        period: Duration,
        sender: SignalSender,
        kind: TimerKind,
        generation: u64,
    ) -> Option<Self> {
        let period = period.max(MIN_PERIOD);
        let runtime = runtime_handle(kind)?;
        let handle = runtime.spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !sender.send(Signal::Timer { kind, generation }) {
                    break;
                }
            }
        });
        Some(Self { kind, handle })
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn runtime_handle(kind: TimerKind) -> Option<tokio::runtime::Handle> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Cannot arm {:?} timer without a runtime: {}", kind, e);
            None
        }
    }
}
