//! Transaction lifecycle management.
//!
//! [`TransactionManager`] owns a fixed-capacity arena of transaction slots,
//! the hash index over them, and the timer engine. Callers address
//! transactions only through generation-stamped [`TransactionHandle`]s;
//! resolving a handle checks the stamp against the slot, so handles and timer
//! expirations that outlive their transaction fall harmlessly to the floor.
//!
//! Lock discipline: the manager-wide core mutex (index + free list + slots)
//! is taken first, an individual slot's record mutex second, never the
//! reverse. Neither lock is held across event emission or while awaiting.
//! The manager never calls back into its owner; everything it has to say goes
//! out as a [`TransactionEvent`] on the channel returned by
//! [`TransactionManager::new`].

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::index::{BucketRef, HashIndex};
use crate::matching::{rule_matches, MatchIntent};
use crate::message::{MessageView, Method};
use crate::timer::{TimerEvent, TimerManager, TimerSettings, TimerType};
use crate::transaction::key::MatchKey;
use crate::transaction::state::TransactionState;
use crate::transaction::{Role, TransactionFlags, TransactionHandle, TransactionRecord};

/// Notifications the engine sends its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    /// The retransmission timer fired; the owner should resend the last
    /// message.
    RetransmitRequired {
        handle: TransactionHandle,
        round: u8,
    },
    /// The retransmission ceiling was reached without an answer. The
    /// transaction has been terminated.
    TimedOut { handle: TransactionHandle },
    /// No provisional response arrived within the configured window.
    ProvisionalTimeout { handle: TransactionHandle },
    /// A sent CANCEL got no response in time. The transaction has been
    /// terminated.
    CancelNoResponse { handle: TransactionHandle },
    /// An inbound retransmission was matched and absorbed.
    RetransmissionAbsorbed { handle: TransactionHandle },
    /// The transaction is gone; its handle is now stale.
    Terminated { handle: TransactionHandle },
}

/// A slot's record behind its own lock.
#[derive(Debug)]
struct TxCell {
    record: Mutex<TransactionRecord>,
}

impl TxCell {
    fn lock(&self) -> MutexGuard<'_, TransactionRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct SlotEntry {
    generation: u32,
    record: Option<Arc<TxCell>>,
}

/// Index, free list and slot table, guarded together.
#[derive(Debug)]
struct Core {
    index: HashIndex,
    free: Vec<u32>,
    slots: Vec<SlotEntry>,
}

impl Core {
    fn resolve(&self, handle: TransactionHandle) -> Option<Arc<TxCell>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.clone()
    }
}

/// The transaction engine's entry point.
pub struct TransactionManager {
    core: Mutex<Core>,
    settings: TimerSettings,
    timers: Arc<TimerManager>,
    events_tx: mpsc::UnboundedSender<TransactionEvent>,
}

impl TransactionManager {
    /// Creates a manager with `capacity` transaction slots and returns it
    /// together with its event channel.
    ///
    /// `settings` is sanitized (floors and defaults applied) before use.
    /// Must be called within a tokio runtime: the manager spawns a task that
    /// drives timer expirations.
    pub fn new(
        capacity: usize,
        settings: TimerSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransactionEvent>) {
        let settings = settings.sanitized();
        let (timers, timer_rx) = TimerManager::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let slots = (0..capacity)
            .map(|_| SlotEntry {
                generation: 1,
                record: None,
            })
            .collect();
        let free = (0..capacity as u32).rev().collect();

        let manager = Arc::new(Self {
            core: Mutex::new(Core {
                index: HashIndex::new(capacity),
                free,
                slots,
            }),
            settings,
            timers,
            events_tx,
        });

        Self::spawn_timer_pump(Arc::downgrade(&manager), timer_rx);
        (manager, events_rx)
    }

    fn spawn_timer_pump(
        manager: Weak<Self>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = timer_rx.recv().await {
                match manager.upgrade() {
                    Some(manager) => manager.on_timer_event(event),
                    None => break,
                }
            }
        });
    }

    fn core_lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, handle: TransactionHandle) -> Option<Arc<TxCell>> {
        self.core_lock().resolve(handle)
    }

    fn resolve_or_err(&self, handle: TransactionHandle) -> Result<Arc<TxCell>> {
        self.resolve(handle)
            .ok_or(Error::TransactionNotFound(handle))
    }

    fn emit(&self, event: TransactionEvent) {
        // Receiver dropped means the owner went away; nothing left to notify.
        let _ = self.events_tx.send(event);
    }

    /// Takes a slot and builds the record from the message. The transaction
    /// is not indexed yet; it can be used as a transient object or passed to
    /// [`index_transaction`](Self::index_transaction).
    pub fn create_transaction(
        &self,
        role: Role,
        message: &MessageView,
        flags: TransactionFlags,
    ) -> Result<TransactionHandle> {
        if message.call_id.is_empty() {
            return Err(Error::InvalidKey("empty Call-ID"));
        }
        let mut core = self.core_lock();
        let index = core
            .free
            .pop()
            .ok_or(Error::ResourceExhausted("transaction slot pool"))?;
        let slot = &mut core.slots[index as usize];
        let handle = TransactionHandle::new(index, slot.generation);
        slot.record = Some(Arc::new(TxCell {
            record: Mutex::new(TransactionRecord::new(handle, role, message, flags)),
        }));
        drop(core);
        debug!(%handle, ?role, method = %message.method, "transaction created");
        Ok(handle)
    }

    /// Inserts the transaction into the hash index, making it matchable.
    /// Idempotent. Fails with `ResourceExhausted` when the index is full.
    pub fn index_transaction(&self, handle: TransactionHandle) -> Result<()> {
        let mut core = self.core_lock();
        let cell = core
            .resolve(handle)
            .ok_or(Error::TransactionNotFound(handle))?;
        let mut record = cell.lock();
        if record.bucket.is_some() {
            return Ok(());
        }
        let bucket = core.index.bucket_of(&record.call_id, record.cseq);
        let pos = core.index.insert(bucket, handle)?;
        record.bucket = Some(BucketRef { bucket, pos });
        if record.state() == TransactionState::Created {
            record.state_cell().set(TransactionState::Active);
        }
        trace!(%handle, bucket, "transaction indexed");
        Ok(())
    }

    fn key_for_intent<'a>(
        message: &'a MessageView,
        intent: MatchIntent,
    ) -> Result<MatchKey<'a>> {
        match intent {
            MatchIntent::RequestToServer => MatchKey::from_message(message, Role::Server),
            MatchIntent::RequestToClient | MatchIntent::ResponseToClient => {
                MatchKey::from_message(message, Role::Client)
            }
            MatchIntent::Ack => MatchKey::for_ack(message),
            MatchIntent::CancelTarget => MatchKey::for_cancel_target(message),
            MatchIntent::MergedRequest => MatchKey::for_merged(message),
            MatchIntent::ReliableProvisional => MatchKey::for_reliable_provisional(message),
        }
    }

    /// Finds the transaction the message belongs to under the rule selected
    /// by `intent`. `Ok(None)` means no match: for requests, the caller
    /// creates a new transaction.
    pub fn find_matching_transaction(
        &self,
        message: &MessageView,
        intent: MatchIntent,
    ) -> Result<Option<TransactionHandle>> {
        let key = Self::key_for_intent(message, intent)?;
        let core = self.core_lock();
        let bucket = core.index.bucket_of(key.call_id, key.cseq);
        for &handle in core.index.chain(bucket) {
            let Some(cell) = core.resolve(handle) else {
                continue;
            };
            let record = cell.lock();
            if rule_matches(intent, &key, &record) {
                trace!(%handle, ?intent, "transaction matched");
                return Ok(Some(handle));
            }
        }
        trace!(?intent, call_id = %message.call_id, "no matching transaction");
        Ok(None)
    }

    /// True when an equivalent transaction is already pending for this role.
    pub fn exists(&self, message: &MessageView, role: Role) -> bool {
        let intent = match role {
            Role::Server => MatchIntent::RequestToServer,
            Role::Client => MatchIntent::RequestToClient,
        };
        matches!(self.find_matching_transaction(message, intent), Ok(Some(_)))
    }

    /// Records that a matched inbound request was a retransmission; the
    /// owner is notified so it can resend the last response.
    pub fn on_retransmitted_request(&self, handle: TransactionHandle) -> Result<()> {
        self.resolve_or_err(handle)?;
        self.emit(TransactionEvent::RetransmissionAbsorbed { handle });
        Ok(())
    }

    /// Validated lifecycle transition. `Terminated` delegates to
    /// [`terminate_transaction`](Self::terminate_transaction).
    pub fn transition(
        &self,
        handle: TransactionHandle,
        to: TransactionState,
    ) -> Result<TransactionState> {
        if to == TransactionState::Terminated {
            let previous = self.state(handle)?;
            self.terminate_transaction(handle);
            return Ok(previous);
        }
        let cell = self.resolve_or_err(handle)?;
        let kind = cell.lock().kind();
        let result = cell.lock().state_cell().transition_if(kind, to);
        result
    }

    pub fn state(&self, handle: TransactionHandle) -> Result<TransactionState> {
        Ok(self.resolve_or_err(handle)?.lock().state())
    }

    /// Stores the final response status, moves to `Completed`, stops
    /// retransmitting and arms the linger timer.
    pub fn record_final_response(&self, handle: TransactionHandle, status: u16) -> Result<()> {
        let cell = self.resolve_or_err(handle)?;
        let invite = {
            let mut record = cell.lock();
            let kind = record.kind();
            // Validate first; a rejected transition must leave the record
            // untouched.
            record
                .state_cell()
                .transition_if(kind, TransactionState::Completed)?;
            record.last_status = Some(status);
            record.method == Method::Invite
        };
        self.timers.cancel(handle, TimerType::Retransmit);
        self.timers
            .arm(handle, TimerType::Linger, self.settings.linger_for(invite));
        debug!(%handle, status, "final response recorded");
        Ok(())
    }

    /// Starts the T1-doubling retransmission schedule for this transaction.
    pub fn arm_retransmit(&self, handle: TransactionHandle) -> Result<()> {
        self.resolve_or_err(handle)?;
        self.timers.arm_retransmit(
            handle,
            self.settings.t1,
            self.settings.t2,
            self.settings.max_retransmissions,
        );
        Ok(())
    }

    /// Arms the provisional-response timeout. No-op when the configured
    /// interval is zero (disabled).
    pub fn arm_provisional(&self, handle: TransactionHandle) -> Result<()> {
        self.resolve_or_err(handle)?;
        if self.settings.provisional.is_zero() {
            return Ok(());
        }
        self.timers
            .arm(handle, TimerType::Provisional, self.settings.provisional);
        Ok(())
    }

    /// Arms the cancel-no-response timeout after a CANCEL was sent.
    pub fn arm_cancel_no_response(&self, handle: TransactionHandle) -> Result<()> {
        let cell = self.resolve_or_err(handle)?;
        let invite = cell.lock().method == Method::Invite;
        self.timers.arm(
            handle,
            TimerType::CancelNoResponse,
            self.settings.cancel_no_response_for(invite),
        );
        Ok(())
    }

    pub fn set_flags(&self, handle: TransactionHandle, flags: TransactionFlags) -> Result<()> {
        self.resolve_or_err(handle)?.lock().flags = flags;
        Ok(())
    }

    /// Records the RSeq of the reliable provisional response just sent, for
    /// later PRACK matching.
    pub fn set_local_rseq(&self, handle: TransactionHandle, rseq: u32) -> Result<()> {
        self.resolve_or_err(handle)?.lock().local_rseq = Some(rseq);
        Ok(())
    }

    /// Stores the To-tag once the transaction learns it.
    pub fn set_to_tag(&self, handle: TransactionHandle, tag: &str) -> Result<()> {
        self.resolve_or_err(handle)?.lock().to.tag = Some(tag.to_string());
        Ok(())
    }

    /// Tears the transaction down: marks it terminated, cancels its timers,
    /// unindexes it and returns the slot to the free list. Idempotent; a
    /// stale handle is a no-op.
    pub fn terminate_transaction(&self, handle: TransactionHandle) {
        let Some(cell) = self.resolve(handle) else {
            return;
        };
        // Mark dead first so concurrent lookups stop matching it.
        cell.lock().state_cell().set(TransactionState::Terminated);
        self.timers.cancel_all(handle);

        let mut core = self.core_lock();
        // Re-check under the lock: a concurrent terminate may have won.
        let Some(cell) = core.resolve(handle) else {
            return;
        };
        if let Some(at) = cell.lock().bucket.take() {
            // The removal swap relocates the chain tail; keep its stored
            // position accurate.
            if let Some(moved) = core.index.remove(at.bucket, at.pos, handle) {
                if let Some(moved_cell) = core.resolve(moved) {
                    if let Some(b) = moved_cell.lock().bucket.as_mut() {
                        b.pos = at.pos;
                    }
                }
            }
        }
        let slot = &mut core.slots[handle.index as usize];
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        core.free.push(handle.index);
        drop(core);

        debug!(%handle, "transaction terminated");
        self.emit(TransactionEvent::Terminated { handle });
    }

    pub fn active_transactions(&self) -> usize {
        let core = self.core_lock();
        core.slots.len() - core.free.len()
    }

    /// Handles one timer expiration. A handle whose generation no longer
    /// resolves is a race with termination and is dropped.
    fn on_timer_event(&self, event: TimerEvent) {
        let Some(cell) = self.resolve(event.handle) else {
            trace!(handle = %event.handle, timer = %event.timer_type,
                "stale timer expiration ignored");
            return;
        };
        {
            let mut record = cell.lock();
            let state = record.state();
            if state == TransactionState::Terminated {
                trace!(handle = %event.handle, timer = %event.timer_type,
                    "timer raced with termination, ignored");
                return;
            }
            if event.timer_type == TimerType::Retransmit {
                // A queued expiration can outlive the schedule's
                // cancellation; retransmissions only apply while active.
                if state != TransactionState::Active {
                    trace!(handle = %event.handle, %state,
                        "retransmit expiration after completion, ignored");
                    return;
                }
                record.retransmit_count = event.round;
            }
        }

        match event.timer_type {
            TimerType::Retransmit => {
                if event.round >= self.settings.max_retransmissions {
                    warn!(handle = %event.handle, rounds = event.round,
                        "retransmission ceiling reached, timing out");
                    self.emit(TransactionEvent::TimedOut {
                        handle: event.handle,
                    });
                    self.terminate_transaction(event.handle);
                } else {
                    self.emit(TransactionEvent::RetransmitRequired {
                        handle: event.handle,
                        round: event.round,
                    });
                }
            }
            TimerType::Linger => {
                self.terminate_transaction(event.handle);
            }
            TimerType::Provisional => {
                self.emit(TransactionEvent::ProvisionalTimeout {
                    handle: event.handle,
                });
            }
            TimerType::CancelNoResponse => {
                self.emit(TransactionEvent::CancelNoResponse {
                    handle: event.handle,
                });
                self.terminate_transaction(event.handle);
            }
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &self.active_transactions())
            .field("settings", &self.settings)
            .finish()
    }
}
