//! The transaction record and its identifying handle.
//!
//! A transaction is stored in a fixed-capacity arena owned by the
//! [`TransactionManager`](crate::manager::TransactionManager). Callers never
//! hold a reference to a record; they hold a [`TransactionHandle`], a small
//! `Copy` value stamped with the slot's generation. When a slot is freed its
//! generation is bumped, so a handle that outlives its transaction resolves to
//! nothing instead of to whoever reused the slot.

pub mod key;
pub mod state;

use std::fmt;

use crate::index::BucketRef;
use crate::message::{MessageView, Method, Party, Via};
use crate::transaction::state::{AtomicTransactionState, TransactionState};

/// Whether this end of the transaction sent or received the initial request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

/// Generation-stamped identifier for a transaction slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl TransactionHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}.{}", self.index, self.generation)
    }
}

/// Per-transaction behavior switches, set by the owning layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionFlags {
    /// This transaction may be targeted by a CANCEL.
    pub allow_cancellation: bool,
    /// UAS core asked the engine to match ACKs for 2xx responses here.
    pub allow_ack_handling: bool,
    /// Transaction belongs to a proxy; 2xx ACKs are routed upward, not
    /// matched.
    pub is_proxy: bool,
}

/// The four RFC 3261 transaction machines, used to validate state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

/// In-memory transaction record.
///
/// Lives behind the slot mutex; the state cell is additionally atomic so that
/// timer expirations can check liveness without the slot lock.
#[derive(Debug)]
pub struct TransactionRecord {
    pub handle: TransactionHandle,
    pub role: Role,
    pub method: Method,
    pub call_id: String,
    pub from: Party,
    pub to: Party,
    pub cseq: u32,
    pub top_via: Via,
    pub request_uri: Option<String>,
    /// Status code of the last final response sent or received.
    pub last_status: Option<u16>,
    /// RSeq of the last reliable provisional response sent, for PRACK
    /// matching.
    pub local_rseq: Option<u32>,
    pub flags: TransactionFlags,
    state: AtomicTransactionState,
    /// Retransmissions performed so far.
    pub retransmit_count: u8,
    /// Bucket and chain position this transaction is indexed at; `Some` iff
    /// indexed.
    pub(crate) bucket: Option<BucketRef>,
}

impl TransactionRecord {
    pub fn new(
        handle: TransactionHandle,
        role: Role,
        message: &MessageView,
        flags: TransactionFlags,
    ) -> Self {
        Self {
            handle,
            role,
            method: message.method.clone(),
            call_id: message.call_id.clone(),
            from: message.from.clone(),
            to: message.to.clone(),
            cseq: message.cseq,
            top_via: message.top_via.clone(),
            request_uri: message.request_uri.clone(),
            last_status: None,
            local_rseq: None,
            flags,
            state: AtomicTransactionState::default(),
            retransmit_count: 0,
            bucket: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &AtomicTransactionState {
        &self.state
    }

    pub fn kind(&self) -> TransactionKind {
        match (self.role, &self.method) {
            (Role::Client, Method::Invite) => TransactionKind::InviteClient,
            (Role::Client, _) => TransactionKind::NonInviteClient,
            (Role::Server, Method::Invite) => TransactionKind::InviteServer,
            (Role::Server, _) => TransactionKind::NonInviteServer,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state.get() == TransactionState::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite_view() -> MessageView {
        MessageView::new(
            Method::Invite,
            "call-1@example.com",
            Party::new("sip:alice@example.com", Some("tag-a")),
            Party::new("sip:bob@example.com", None),
            1,
            Via::new("UDP", "client.example.com:5060", Some("z9hG4bK-abc")),
            Some("sip:bob@example.com"),
        )
    }

    #[test]
    fn handle_display_includes_generation() {
        let h = TransactionHandle::new(3, 7);
        assert_eq!(h.to_string(), "tx-3.7");
    }

    #[test]
    fn record_copies_matching_fields() {
        let view = invite_view();
        let record = TransactionRecord::new(
            TransactionHandle::new(0, 1),
            Role::Server,
            &view,
            TransactionFlags::default(),
        );
        assert_eq!(record.call_id, "call-1@example.com");
        assert_eq!(record.cseq, 1);
        assert_eq!(record.from.tag(), Some("tag-a"));
        assert_eq!(record.state(), TransactionState::Created);
        assert!(record.bucket.is_none());
    }

    #[test]
    fn kind_follows_role_and_method() {
        let view = invite_view();
        let record = TransactionRecord::new(
            TransactionHandle::new(0, 1),
            Role::Client,
            &view,
            TransactionFlags::default(),
        );
        assert_eq!(record.kind(), TransactionKind::InviteClient);

        let mut bye = invite_view();
        bye.method = Method::Bye;
        let record = TransactionRecord::new(
            TransactionHandle::new(0, 1),
            Role::Server,
            &bye,
            TransactionFlags::default(),
        );
        assert_eq!(record.kind(), TransactionKind::NonInviteServer);
    }
}
