//! Boundary types describing the parts of a SIP message the engine consumes.
//!
//! Parsing lives outside this crate. Collaborators hand the engine a
//! [`MessageView`], a pre-extracted view of the headers that participate in
//! transaction matching: Call-ID, From/To with their tags, CSeq, the top Via,
//! the Request-URI and, for PRACK, the RAck sequence number.

use std::fmt;

/// SIP request method, as it participates in transaction matching.
///
/// Methods the engine treats specially get their own variant; anything else is
/// carried as `Other` and compared case-sensitively per RFC 3261 section 7.1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Register,
    Options,
    Prack,
    Update,
    /// Any other method token, compared case-sensitively.
    Other(String),
}

impl Method {
    /// True for INVITE and the requests that only exist inside an INVITE
    /// transaction (ACK, PRACK).
    pub fn is_invite_family(&self) -> bool {
        matches!(self, Method::Invite | Method::Ack | Method::Prack)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Invite => write!(f, "INVITE"),
            Method::Ack => write!(f, "ACK"),
            Method::Bye => write!(f, "BYE"),
            Method::Cancel => write!(f, "CANCEL"),
            Method::Register => write!(f, "REGISTER"),
            Method::Options => write!(f, "OPTIONS"),
            Method::Prack => write!(f, "PRACK"),
            Method::Update => write!(f, "UPDATE"),
            Method::Other(name) => write!(f, "{}", name),
        }
    }
}

/// From or To header view: the URI plus the optional `tag` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub uri: String,
    pub tag: Option<String>,
}

impl Party {
    pub fn new(uri: impl Into<String>, tag: Option<&str>) -> Self {
        Self {
            uri: uri.into(),
            tag: tag.map(str::to_string),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

/// Top Via header view: transport, sent-by host[:port], optional branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub transport: String,
    pub sent_by: String,
    pub branch: Option<String>,
}

impl Via {
    pub fn new(transport: impl Into<String>, sent_by: impl Into<String>, branch: Option<&str>) -> Self {
        Self {
            transport: transport.into(),
            sent_by: sent_by.into(),
            branch: branch.map(str::to_string),
        }
    }

    /// Branch comparison per RFC 3261 section 17.2.3: case-sensitive, and only
    /// meaningful when both sides carry a branch.
    pub fn branch_equals(&self, other: &Via) -> bool {
        match (&self.branch, &other.branch) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Sent-by host comparison, case-insensitive (host names are).
    pub fn sent_by_equals(&self, other: &Via) -> bool {
        self.sent_by.eq_ignore_ascii_case(&other.sent_by)
    }

    /// Full Via equality used by the pre-RFC 3261 matching path: transport and
    /// sent-by case-insensitive, branch exact.
    pub fn is_equal(&self, other: &Via) -> bool {
        self.transport.eq_ignore_ascii_case(&other.transport)
            && self.sent_by_equals(other)
            && self.branch == other.branch
    }
}

/// Pre-extracted view of the message fields that drive transaction matching.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub method: Method,
    pub call_id: String,
    pub from: Party,
    pub to: Party,
    pub cseq: u32,
    pub top_via: Via,
    /// Request-URI for requests; `None` for responses.
    pub request_uri: Option<String>,
    /// RAck sequence number, present only on PRACK requests.
    pub rack_rseq: Option<u32>,
}

impl MessageView {
    pub fn new(
        method: Method,
        call_id: impl Into<String>,
        from: Party,
        to: Party,
        cseq: u32,
        top_via: Via,
        request_uri: Option<&str>,
    ) -> Self {
        Self {
            method,
            call_id: call_id.into(),
            from,
            to,
            cseq,
            top_via,
            request_uri: request_uri.map(str::to_string),
            rack_rseq: None,
        }
    }

    /// Attach the RAck sequence number carried by a PRACK request.
    pub fn with_rack(mut self, rseq: u32) -> Self {
        self.rack_rseq = Some(rseq);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_matches_wire_form() {
        assert_eq!(Method::Invite.to_string(), "INVITE");
        assert_eq!(Method::Prack.to_string(), "PRACK");
        assert_eq!(Method::Other("SUBSCRIBE".into()).to_string(), "SUBSCRIBE");
    }

    #[test]
    fn other_method_is_case_sensitive() {
        assert_ne!(
            Method::Other("SUBSCRIBE".into()),
            Method::Other("subscribe".into())
        );
    }

    #[test]
    fn branch_requires_both_sides() {
        let a = Via::new("UDP", "host.example.com:5060", Some("z9hG4bK-1"));
        let b = Via::new("UDP", "host.example.com:5060", None);
        assert!(!a.branch_equals(&b));
        assert!(!b.branch_equals(&a));

        let c = Via::new("TCP", "other.example.com", Some("z9hG4bK-1"));
        assert!(a.branch_equals(&c));
    }

    #[test]
    fn sent_by_is_case_insensitive() {
        let a = Via::new("UDP", "Host.Example.COM:5060", Some("z9hG4bK-1"));
        let b = Via::new("udp", "host.example.com:5060", Some("z9hG4bK-1"));
        assert!(a.sent_by_equals(&b));
        assert!(a.is_equal(&b));
    }

    #[test]
    fn full_via_equality_keeps_branch_exact() {
        let a = Via::new("UDP", "host:5060", Some("branch-A"));
        let b = Via::new("UDP", "host:5060", Some("branch-a"));
        assert!(!a.is_equal(&b));
    }
}
