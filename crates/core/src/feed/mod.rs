//! Market feed: a generator that advances every tracked instrument once per
//! tick, a publisher that fans snapshots out to observers, and the service
//! actor that serialises ticks, mode changes and subscriptions.

pub mod generator;
pub mod indices;
pub mod publisher;
pub mod service;
pub mod simulate;
pub mod universe;

pub use crate::domain::market::{FeedMode, MarketIndex, Snapshot};
pub use generator::{FeedGenerator, TickReport};
pub use publisher::{Observer, Publisher, SubscriptionId};
pub use service::{FeedHandle, FeedService, LifecycleState};
