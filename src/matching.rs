//! The matching rule set.
//!
//! Every lookup names its intent through [`MatchIntent`], and one exhaustive
//! `match` in [`rule_matches`] dispatches to the corresponding rule. The rules
//! implement RFC 3261 section 17 matching with the pre-3261 fallback:
//!
//! - Requests with a magic-cookie branch match on branch + Via sent-by +
//!   method (section 17.2.3).
//! - Legacy requests fall back to the full header comparison: Call-ID, tags,
//!   CSeq, the entire top Via and the Request-URI.
//! - ACK matching is asymmetric: an ACK for a non-2xx follows the request
//!   rule; an ACK for a 2xx only matches a UAS transaction that opted in, and
//!   never matches at a proxy.
//! - CANCEL targets are found with the method wildcarded, since the CANCEL
//!   carries its own method in CSeq but targets the original request.

use crate::message::Method;
use crate::transaction::key::MatchKey;
use crate::transaction::state::TransactionState;
use crate::transaction::{Role, TransactionRecord};

/// RFC 3261 magic cookie that starts every modern branch parameter.
pub const MAGIC_COOKIE: &str = "z9hG4bK";

/// What the caller is trying to find. Each variant selects one matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchIntent {
    /// Inbound request looking for its server transaction (retransmission
    /// absorption).
    RequestToServer,
    /// Outbound request looking for an already-pending identical client
    /// transaction.
    RequestToClient,
    /// Inbound response looking for the client transaction that sent the
    /// request.
    ResponseToClient,
    /// Inbound ACK looking for the INVITE server transaction it acknowledges.
    Ack,
    /// Inbound CANCEL looking for the transaction it cancels.
    CancelTarget,
    /// Inbound request checked against section 8.2.2.2 merged-request
    /// detection.
    MergedRequest,
    /// Inbound PRACK looking for the transaction that sent the reliable
    /// provisional response.
    ReliableProvisional,
}

/// Applies the rule selected by `intent` to one candidate.
///
/// Terminated candidates never match, regardless of intent.
pub(crate) fn rule_matches(
    intent: MatchIntent,
    key: &MatchKey<'_>,
    candidate: &TransactionRecord,
) -> bool {
    if candidate.state() == TransactionState::Terminated {
        return false;
    }
    match intent {
        MatchIntent::RequestToServer => request_to_role(key, candidate, Role::Server),
        MatchIntent::RequestToClient => request_to_role(key, candidate, Role::Client),
        MatchIntent::ResponseToClient => response_to_client(key, candidate),
        MatchIntent::Ack => ack_to_transaction(key, candidate),
        MatchIntent::CancelTarget => cancel_target(key, candidate),
        MatchIntent::MergedRequest => merged_request(key, candidate),
        MatchIntent::ReliableProvisional => reliable_provisional(key, candidate),
    }
}

/// Method comparison with the wildcard rule: a `None` key method matches any
/// candidate method except CANCEL. A CANCEL transaction is only found when
/// asked for by name.
fn methods_match(key_method: Option<&Method>, candidate_method: &Method) -> bool {
    match key_method {
        Some(m) => m == candidate_method,
        None => *candidate_method != Method::Cancel,
    }
}

fn tags_match_ci(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// Dialog-level comparison shared by the non-branch rules: role, CSeq,
/// method, From-tag (case-insensitive), To-tag (case-insensitive, wildcarded
/// when either side has none yet), Call-ID (case-sensitive).
fn basic_match(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    if candidate.role != key.role || candidate.cseq != key.cseq {
        return false;
    }
    if !methods_match(key.method.as_ref(), &candidate.method) {
        return false;
    }
    if !tags_match_ci(key.from_tag, candidate.from.tag()) {
        return false;
    }
    // The To-tag is set mid-transaction; an unset side matches anything.
    if let (Some(a), Some(b)) = (key.to_tag, candidate.to.tag()) {
        if !a.eq_ignore_ascii_case(b) {
            return false;
        }
    }
    key.call_id == candidate.call_id
}

/// Section 17.2.3 request matching, with the pre-3261 fallback. The legacy
/// path additionally compares the Request-URI; the branch path does not.
fn request_to_transaction(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    let cookie_branch = key
        .via
        .branch
        .as_deref()
        .is_some_and(|b| b.starts_with(MAGIC_COOKIE));
    if cookie_branch {
        key.via.branch_equals(&candidate.top_via)
            && key.via.sent_by_equals(&candidate.top_via)
            && methods_match(key.method.as_ref(), &candidate.method)
    } else {
        basic_match(key, candidate)
            && key.via.is_equal(&candidate.top_via)
            && key.request_uri == candidate.request_uri.as_deref()
    }
}

fn request_to_role(key: &MatchKey<'_>, candidate: &TransactionRecord, role: Role) -> bool {
    candidate.role == role && request_to_transaction(key, candidate)
}

/// Responses match on branch and CSeq method alone (section 17.1.3).
fn response_to_client(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    candidate.role == Role::Client
        && key.via.branch_equals(&candidate.top_via)
        && methods_match(key.method.as_ref(), &candidate.method)
}

/// Asymmetric ACK matching. The key method is already mapped to INVITE.
fn ack_to_transaction(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    let acked_2xx = candidate
        .last_status
        .is_some_and(|status| (200..300).contains(&status));
    if acked_2xx {
        // A proxy never owns the ACK for a 2xx; it is routed upward.
        if candidate.flags.is_proxy {
            return false;
        }
        // UAS 2xx: match without the branch, which the ACK generates fresh.
        candidate.flags.allow_ack_handling && basic_match(key, candidate)
    } else {
        request_to_role(key, candidate, Role::Server)
    }
}

/// CANCEL target matching: any cancellable server transaction identified by
/// the request rule with the method wildcarded. A CANCEL never cancels a
/// CANCEL.
fn cancel_target(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    candidate.method != Method::Cancel
        && candidate.flags.allow_cancellation
        && request_to_role(key, candidate, Role::Server)
}

/// Section 8.2.2.2 merged-request detection: From-tag, Call-ID and CSeq equal
/// to an existing server transaction, regardless of Via or To-tag. Methods
/// compare strictly here (the key has already mapped ACK to INVITE).
fn merged_request(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    candidate.role == Role::Server
        && key.method.as_ref() == Some(&candidate.method)
        && key.cseq == candidate.cseq
        && tags_match_ci(key.from_tag, candidate.from.tag())
        && key.call_id == candidate.call_id
}

/// PRACK matching: the dialog-level match plus exact RSeq equality against
/// the reliable provisional this transaction last sent.
fn reliable_provisional(key: &MatchKey<'_>, candidate: &TransactionRecord) -> bool {
    if !basic_match(key, candidate) {
        return false;
    }
    match (key.rseq, candidate.local_rseq) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
