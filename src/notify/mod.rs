//! Match notifications
//!
//! The engine announces formed matches through the `MatchPublisher` trait; the
//! hub implements it and fans events out to connected subscribers.

pub mod hub;
pub mod publisher;

pub use hub::{HubConfig, NotificationHub, SubscriberId, Subscription};
pub use publisher::{MatchPublisher, RecordingPublisher};
