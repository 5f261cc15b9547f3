//! Live-update machinery: the change bus and per-connection streams.
//!
//! Mutating file operations publish to the [`bus::ChangeBus`]; every open
//! `/events` connection owns a [`stream::NotificationStream`] draining its
//! own bounded queue. Slow consumers are dropped by the bus, never waited
//! on.

pub mod bus;
pub mod stream;

pub use bus::{ChangeBus, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use stream::{NotificationStream, DEFAULT_KEEP_ALIVE};
