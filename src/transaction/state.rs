//! Transaction lifecycle states and the atomic cell that stores them.
//!
//! The lifecycle is deliberately coarser than the per-kind RFC 3261 state
//! machines: this engine only needs to know whether a transaction is still
//! matchable, whether it has seen its final response, and whether it is dead.
//! Transitions are validated per transaction kind, with one blanket rule:
//! moving to [`TransactionState::Terminated`] is always legal, from any state,
//! so that teardown can never be refused.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};
use crate::transaction::TransactionKind;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Slot taken, not yet indexed or processing messages.
    Created,
    /// Indexed and exchanging messages (covers the RFC Calling/Trying and
    /// Proceeding phases).
    Active,
    /// Final response sent or received; absorbing retransmissions.
    Completed,
    /// INVITE client only: final non-2xx response received, ACK owed.
    AwaitingAck,
    /// Dead. The slot may already have been reused under a newer generation.
    Terminated,
}

impl TransactionState {
    fn to_u8(self) -> u8 {
        match self {
            TransactionState::Created => 0,
            TransactionState::Active => 1,
            TransactionState::Completed => 2,
            TransactionState::AwaitingAck => 3,
            TransactionState::Terminated => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Created,
            1 => TransactionState::Active,
            2 => TransactionState::Completed,
            3 => TransactionState::AwaitingAck,
            _ => TransactionState::Terminated,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Created => write!(f, "Created"),
            TransactionState::Active => write!(f, "Active"),
            TransactionState::Completed => write!(f, "Completed"),
            TransactionState::AwaitingAck => write!(f, "AwaitingAck"),
            TransactionState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Checks whether `from -> to` is a legal transition for `kind`.
///
/// Staying in the same state is allowed (retransmissions re-enter the current
/// state), and `Terminated` is reachable from everywhere.
pub fn validate_transition(
    kind: TransactionKind,
    from: TransactionState,
    to: TransactionState,
) -> Result<()> {
    use TransactionState::*;

    if from == to || to == Terminated {
        return Ok(());
    }

    let ok = match (from, to) {
        (Created, Active) => true,
        // A transaction that never got past Created can still complete, e.g.
        // a server transaction answered before being indexed.
        (Created, Completed) => true,
        (Active, Completed) => true,
        (Completed, AwaitingAck) => kind == TransactionKind::InviteClient,
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(Error::InvalidStateTransition(format!(
            "{:?}: {} -> {}",
            kind, from, to
        )))
    }
}

/// Lock-free state cell.
///
/// Reads never take a lock; writes go through [`transition_if`] which enforces
/// the per-kind transition table via compare-and-swap, except for `Terminated`
/// which is stored unconditionally.
///
/// [`transition_if`]: AtomicTransactionState::transition_if
#[derive(Debug)]
pub struct AtomicTransactionState {
    value: AtomicU8,
}

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        Self {
            value: AtomicU8::new(state.to_u8()),
        }
    }

    pub fn get(&self) -> TransactionState {
        TransactionState::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Unvalidated store. Used for teardown, where refusing is never correct.
    pub fn set(&self, state: TransactionState) {
        self.value.store(state.to_u8(), Ordering::Release);
    }

    /// Validated transition. Returns the state the cell held before the call.
    ///
    /// Retries on concurrent modification; a concurrent move to `Terminated`
    /// wins over any pending transition.
    pub fn transition_if(
        &self,
        kind: TransactionKind,
        to: TransactionState,
    ) -> Result<TransactionState> {
        loop {
            let current = self.get();
            validate_transition(kind, current, to)?;
            match self.value.compare_exchange(
                current.to_u8(),
                to.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => {
                    if TransactionState::from_u8(actual) == TransactionState::Terminated {
                        return Ok(TransactionState::Terminated);
                    }
                    // Someone else moved the state; re-validate from there.
                }
            }
        }
    }
}

impl Default for AtomicTransactionState {
    fn default() -> Self {
        Self::new(TransactionState::Created)
    }
}
