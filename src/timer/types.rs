//! Timer categories and configurable intervals.
//!
//! All intervals are sanitized once at manager construction: zero values fall
//! back to their documented default, and the T2 floor is enforced silently
//! (with an info-level log), matching long-standing deployed behavior.

use std::fmt;
use std::time::Duration;

use tracing::info;

/// Default T1, the RTT estimate retransmissions start from.
pub const DEFAULT_T1: Duration = Duration::from_millis(500);
/// T2 may not be configured below this; it is the retransmission interval cap
/// for non-INVITE requests and INVITE responses.
pub const T2_FLOOR: Duration = Duration::from_secs(4);
/// Default T4, maximum time a message stays in the network.
pub const DEFAULT_T4: Duration = Duration::from_secs(5);
/// Default linger for completed INVITE transactions.
pub const DEFAULT_INVITE_LINGER: Duration = Duration::from_secs(32);
/// Default ceiling on waiting for a provisional response.
pub const DEFAULT_PROVISIONAL: Duration = Duration::from_secs(180);
/// Default ceiling on retransmissions before a transaction times out.
pub const DEFAULT_MAX_RETRANSMISSIONS: u8 = 7;

/// The timer categories a transaction can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// Doubling retransmission timer (RFC 3261 timers A/E/G).
    Retransmit,
    /// Post-completion absorption window (timers D/J/I and the 2xx linger).
    Linger,
    /// No provisional response received in time.
    Provisional,
    /// A sent CANCEL got no response.
    CancelNoResponse,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerType::Retransmit => write!(f, "Retransmit"),
            TimerType::Linger => write!(f, "Linger"),
            TimerType::Provisional => write!(f, "Provisional"),
            TimerType::CancelNoResponse => write!(f, "CancelNoResponse"),
        }
    }
}

/// Configurable timer intervals.
///
/// Construct with struct update syntax over [`Default::default`], then pass to
/// the manager, which calls [`sanitized`](Self::sanitized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
    /// Linger for completed non-INVITE transactions. Zero means 64 x T1.
    pub general_linger: Duration,
    /// Linger for completed INVITE transactions.
    pub invite_linger: Duration,
    /// Maximum wait for a provisional response. Zero disables the timer.
    pub provisional: Duration,
    /// How long a cancelled non-INVITE transaction waits for a response to
    /// the CANCEL before giving up. Zero is invalid and corrected to 64 x T1.
    pub cancel_general_no_response: Duration,
    /// Same, for cancelled INVITE transactions.
    pub cancel_invite_no_response: Duration,
    /// Retransmission count ceiling; reaching it times the transaction out.
    pub max_retransmissions: u8,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: DEFAULT_T1,
            t2: T2_FLOOR,
            t4: DEFAULT_T4,
            general_linger: DEFAULT_T1 * 64,
            invite_linger: DEFAULT_INVITE_LINGER,
            provisional: DEFAULT_PROVISIONAL,
            cancel_general_no_response: DEFAULT_T1 * 64,
            cancel_invite_no_response: DEFAULT_T1 * 64,
            max_retransmissions: DEFAULT_MAX_RETRANSMISSIONS,
        }
    }
}

impl TimerSettings {
    /// Returns a copy with invalid values corrected to their defaults.
    pub fn sanitized(&self) -> Self {
        let mut s = self.clone();
        if s.t1.is_zero() {
            s.t1 = DEFAULT_T1;
        }
        if s.t2 < T2_FLOOR {
            info!(configured = ?s.t2, floor = ?T2_FLOOR, "T2 below floor, corrected");
            s.t2 = T2_FLOOR;
        }
        if s.t4.is_zero() {
            s.t4 = DEFAULT_T4;
        }
        let general_default = s.t1 * 64;
        if s.general_linger.is_zero() {
            s.general_linger = general_default;
        }
        if s.invite_linger.is_zero() {
            s.invite_linger = DEFAULT_INVITE_LINGER;
        }
        // provisional == 0 stays: the timer is simply never armed.
        if s.cancel_general_no_response.is_zero() {
            info!("cancel-no-response interval may not be zero, corrected to 64*T1");
            s.cancel_general_no_response = general_default;
        }
        if s.cancel_invite_no_response.is_zero() {
            info!("cancel-no-response interval may not be zero, corrected to 64*T1");
            s.cancel_invite_no_response = general_default;
        }
        if s.max_retransmissions == 0 {
            s.max_retransmissions = DEFAULT_MAX_RETRANSMISSIONS;
        }
        s
    }

    pub fn linger_for(&self, invite: bool) -> Duration {
        if invite {
            self.invite_linger
        } else {
            self.general_linger
        }
    }

    pub fn cancel_no_response_for(&self, invite: bool) -> Duration {
        if invite {
            self.cancel_invite_no_response
        } else {
            self.cancel_general_no_response
        }
    }
}
