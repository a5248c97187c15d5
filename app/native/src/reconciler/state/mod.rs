//! Snapshot store: types, deltas, and the published state tree.

mod delta;
mod snapshot;
mod store;
mod types;

pub use delta::{Attribute, AttributeDelta, Delta, Entity, Value};
pub use snapshot::{Snapshot, placement};
pub use store::{SnapshotReader, SnapshotStore};
pub use types::*;
