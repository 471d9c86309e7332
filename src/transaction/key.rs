//! Match key extraction.
//!
//! A [`MatchKey`] is the canonical, borrowed view of the fields that identify
//! a transaction during one lookup. It owns nothing; it lives only for the
//! duration of the index walk. The constructors encode the per-intent quirks:
//! ACK and merged-request lookups search under INVITE, a cancel-target lookup
//! wildcards the method, a PRACK lookup requires the RAck sequence number.

use crate::error::{Error, Result};
use crate::message::{MessageView, Method, Via};
use crate::transaction::{Role, TransactionRecord};

/// Borrowed lookup key over the matching-relevant fields of one message.
#[derive(Debug, Clone)]
pub struct MatchKey<'a> {
    pub call_id: &'a str,
    pub from_tag: Option<&'a str>,
    pub to_tag: Option<&'a str>,
    pub cseq: u32,
    /// `None` acts as a method wildcard (matches everything except CANCEL).
    pub method: Option<Method>,
    pub via: &'a Via,
    pub request_uri: Option<&'a str>,
    /// Role the candidate transaction must have.
    pub role: Role,
    /// RAck sequence number, set only for reliable-provisional lookups.
    pub rseq: Option<u32>,
}

fn check_view(message: &MessageView) -> Result<()> {
    if message.call_id.is_empty() {
        return Err(Error::InvalidKey("empty Call-ID"));
    }
    if message.top_via.sent_by.is_empty() {
        return Err(Error::InvalidKey("empty Via sent-by"));
    }
    Ok(())
}

impl<'a> MatchKey<'a> {
    /// Key for the straightforward request/response rules: the candidate must
    /// carry the same method as the message.
    pub fn from_message(message: &'a MessageView, role: Role) -> Result<Self> {
        check_view(message)?;
        Ok(Self {
            call_id: &message.call_id,
            from_tag: message.from.tag(),
            to_tag: message.to.tag(),
            cseq: message.cseq,
            method: Some(message.method.clone()),
            via: &message.top_via,
            request_uri: message.request_uri.as_deref(),
            role,
            rseq: None,
        })
    }

    /// Key for matching an inbound ACK against the INVITE server transaction
    /// it acknowledges. The method maps ACK -> INVITE, since the transaction
    /// was created by the INVITE.
    pub fn for_ack(message: &'a MessageView) -> Result<Self> {
        let mut key = Self::from_message(message, Role::Server)?;
        key.method = Some(Method::Invite);
        Ok(key)
    }

    /// Key for finding the transaction a CANCEL targets. The method is
    /// wildcarded; the rule itself excludes CANCEL candidates.
    pub fn for_cancel_target(message: &'a MessageView) -> Result<Self> {
        let mut key = Self::from_message(message, Role::Server)?;
        key.method = None;
        Ok(key)
    }

    /// Key for merged-request detection (RFC 3261 section 8.2.2.2). ACK maps
    /// to INVITE, same as [`for_ack`](Self::for_ack).
    pub fn for_merged(message: &'a MessageView) -> Result<Self> {
        let mut key = Self::from_message(message, Role::Server)?;
        if key.method == Some(Method::Ack) {
            key.method = Some(Method::Invite);
        }
        Ok(key)
    }

    /// Key for matching a PRACK against the INVITE server transaction that
    /// sent the reliable provisional response it acknowledges.
    pub fn for_reliable_provisional(message: &'a MessageView) -> Result<Self> {
        let rseq = message
            .rack_rseq
            .ok_or(Error::InvalidKey("PRACK without RAck sequence number"))?;
        let mut key = Self::from_message(message, Role::Server)?;
        key.method = Some(Method::Invite);
        key.rseq = Some(rseq);
        Ok(key)
    }

    /// Key describing an existing transaction, for duplicate detection.
    pub fn from_transaction(record: &'a TransactionRecord) -> Self {
        Self {
            call_id: &record.call_id,
            from_tag: record.from.tag(),
            to_tag: record.to.tag(),
            cseq: record.cseq,
            method: Some(record.method.clone()),
            via: &record.top_via,
            request_uri: record.request_uri.as_deref(),
            role: record.role,
            rseq: None,
        }
    }
}
