//! Transaction timers: configurable intervals, scheduling, and expiration
//! events.
//!
//! - [`TimerSettings`]: the configurable intervals with their floors and
//!   defaults.
//! - [`TimerType`]: the four timer categories a transaction can hold.
//! - [`TimerManager`]: arms and cancels tokio-backed timers and delivers
//!   [`TimerEvent`]s over a channel.

pub mod manager;
pub mod types;

pub use manager::{TimerEvent, TimerManager};
pub use types::{TimerSettings, TimerType};
