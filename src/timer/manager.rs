//! Timer scheduling over tokio tasks.
//!
//! Each armed timer is a spawned task sleeping until expiry, then sending a
//! [`TimerEvent`] over the manager's channel. The event carries the handle the
//! timer was armed with; the transaction manager re-validates the handle's
//! generation before acting, so a timer that fires after its transaction died
//! is harmless. Cancellation aborts the task; an already-fired event that is
//! still in the channel is caught by the same generation check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::timer::types::TimerType;
use crate::transaction::TransactionHandle;

/// One timer expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub handle: TransactionHandle,
    pub timer_type: TimerType,
    /// For retransmission timers, which retransmission this is (1-based).
    /// Zero for one-shot timers.
    pub round: u8,
}

type TimerKey = (TransactionHandle, TimerType);

/// Spawns and cancels the sleep tasks behind transaction timers.
#[derive(Debug)]
pub struct TimerManager {
    events_tx: mpsc::UnboundedSender<TimerEvent>,
    active: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
}

impl TimerManager {
    /// Creates the manager and the receiving end of its event channel.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events_tx,
                active: Mutex::new(HashMap::new()),
            }),
            events_rx,
        )
    }

    fn active_lock(&self) -> std::sync::MutexGuard<'_, HashMap<TimerKey, JoinHandle<()>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arms a one-shot timer, replacing any timer of the same type already
    /// armed for this handle.
    pub fn arm(&self, handle: TransactionHandle, timer_type: TimerType, after: Duration) {
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the manager is shutting down.
            let _ = tx.send(TimerEvent {
                handle,
                timer_type,
                round: 0,
            });
        });
        trace!(%handle, timer = %timer_type, ?after, "timer armed");
        if let Some(previous) = self.active_lock().insert((handle, timer_type), task) {
            previous.abort();
        }
    }

    /// Arms the doubling retransmission schedule: rounds `1..=max_rounds`,
    /// starting at `t1` and doubling up to the `t2` cap. The round that
    /// reaches `max_rounds` is the timeout signal.
    pub fn arm_retransmit(
        &self,
        handle: TransactionHandle,
        t1: Duration,
        t2: Duration,
        max_rounds: u8,
    ) {
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = t1;
            for round in 1..=max_rounds {
                tokio::time::sleep(interval).await;
                if tx
                    .send(TimerEvent {
                        handle,
                        timer_type: TimerType::Retransmit,
                        round,
                    })
                    .is_err()
                {
                    return;
                }
                interval = (interval * 2).min(t2);
            }
        });
        trace!(%handle, ?t1, ?t2, max_rounds, "retransmission schedule armed");
        if let Some(previous) = self
            .active_lock()
            .insert((handle, TimerType::Retransmit), task)
        {
            previous.abort();
        }
    }

    /// Cancels one timer. No-op when nothing is armed.
    pub fn cancel(&self, handle: TransactionHandle, timer_type: TimerType) {
        if let Some(task) = self.active_lock().remove(&(handle, timer_type)) {
            task.abort();
            trace!(%handle, timer = %timer_type, "timer cancelled");
        }
    }

    /// Cancels every timer armed for `handle`. Mandatory before the slot is
    /// freed.
    pub fn cancel_all(&self, handle: TransactionHandle) {
        let mut active = self.active_lock();
        active.retain(|(h, _), task| {
            if *h == handle {
                task.abort();
                false
            } else {
                true
            }
        });
    }

    /// Drops bookkeeping for tasks that already completed.
    pub fn prune_finished(&self) {
        self.active_lock().retain(|_, task| !task.is_finished());
    }

    pub fn active_count(&self) -> usize {
        self.active_lock().len()
    }
}
