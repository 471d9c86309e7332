//! # sip-transaction-core
//!
//! Transaction matching and retransmission engine for SIP, per RFC 3261
//! section 17. Given a pre-parsed view of an inbound or outbound message, the
//! engine decides which in-memory transaction it belongs to, or that none
//! does and a new one must be created, and drives the retransmission and
//! cleanup timers of every live transaction.
//!
//! Parsing, the dialog/session state machine and the transport are external
//! collaborators: they hand the engine a [`MessageView`] and consume
//! [`TransactionEvent`]s from the channel returned by
//! [`TransactionManager::new`].
//!
//! ## Matching
//!
//! Every lookup names its intent through [`MatchIntent`]; the engine selects
//! the matching rule accordingly. Requests carrying the RFC 3261 magic-cookie
//! branch match on branch + sent-by + method; older requests fall back to the
//! full header comparison. ACK, CANCEL, merged-request and PRACK lookups each
//! have their own rule with the asymmetries the protocol requires.
//!
//! ## Example
//!
//! ```no_run
//! use sip_transaction_core::{
//!     MatchIntent, MessageView, Method, Party, Role, TimerSettings,
//!     TransactionFlags, TransactionManager, Via,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> sip_transaction_core::Result<()> {
//! let (manager, mut events) = TransactionManager::new(1024, TimerSettings::default());
//!
//! let request = MessageView::new(
//!     Method::Invite,
//!     "a84b4c76e66710@pc33.example.com",
//!     Party::new("sip:alice@example.com", Some("1928301774")),
//!     Party::new("sip:bob@example.com", None),
//!     314159,
//!     Via::new("UDP", "pc33.example.com:5060", Some("z9hG4bK776asdhds")),
//!     Some("sip:bob@example.com"),
//! );
//!
//! let handle = match manager.find_matching_transaction(&request, MatchIntent::RequestToServer)? {
//!     Some(existing) => {
//!         manager.on_retransmitted_request(existing)?;
//!         existing
//!     }
//!     None => {
//!         let handle = manager.create_transaction(
//!             Role::Server,
//!             &request,
//!             TransactionFlags { allow_cancellation: true, ..Default::default() },
//!         )?;
//!         manager.index_transaction(handle)?;
//!         handle
//!     }
//! };
//! # let _ = (handle, events.recv().await);
//! # Ok(())
//! # }
//! ```

mod index;

pub mod error;
pub mod manager;
pub mod matching;
pub mod message;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use error::{Error, Result};
pub use manager::{TransactionEvent, TransactionManager};
pub use matching::{MatchIntent, MAGIC_COOKIE};
pub use message::{MessageView, Method, Party, Via};
pub use timer::{TimerSettings, TimerType};
pub use transaction::key::MatchKey;
pub use transaction::state::TransactionState;
pub use transaction::{Role, TransactionFlags, TransactionHandle};
pub use utils::generate_branch;

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::manager::{TransactionEvent, TransactionManager};
    pub use crate::matching::MatchIntent;
    pub use crate::message::{MessageView, Method, Party, Via};
    pub use crate::timer::{TimerSettings, TimerType};
    pub use crate::transaction::state::TransactionState;
    pub use crate::transaction::{Role, TransactionFlags, TransactionHandle};
}
