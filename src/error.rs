//! Error types for the transaction engine.
//!
//! Every fallible operation in this crate returns [`Result`]. A failed match is
//! not an error: lookup operations return `Ok(None)` when no transaction
//! satisfies the rule, and callers create a new transaction in response.

use std::result;

use thiserror::Error;

use crate::transaction::TransactionHandle;

/// Errors produced by the transaction engine.
///
/// None of these are fatal to the process. `ResourceExhausted` is the only
/// load-dependent variant; callers are expected to reject the triggering
/// message or back off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A fixed-capacity pool (transaction slots or index entries) is full.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// A message view is missing a field required to build a match key.
    /// No transaction is created or modified.
    #[error("Invalid match key: {0}")]
    InvalidKey(&'static str),

    /// The handle's slot has been freed or reused since it was issued.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionHandle),

    /// The requested lifecycle transition is not legal for this transaction
    /// kind. Transitions to `Terminated` are always legal and never produce
    /// this error.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

/// Result type for transaction operations.
pub type Result<T> = result::Result<T, Error>;
