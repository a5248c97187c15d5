//! Inbound notifications and the normalizer queue.

mod normalizer;
mod types;

pub use normalizer::{NormalizerStats, NotificationSink, NotificationStream, channel};
pub use types::{AttributeValue, CommandTag, ObjectInfo, RawNotification};
