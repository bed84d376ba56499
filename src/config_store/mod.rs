//! CRUD over stored channel configurations.
//!
//! Documents use the same versioned-write discipline as the usage counters:
//! every read returns a [`ConcurrencyToken`](crate::state::ConcurrencyToken)
//! and updates only land when the token presented is still current.

mod fields;
mod store;

pub use fields::{FieldKind, ListField};
pub use store::{ConfigListRequest, ConfigListResult, ConfigStore, StoredConfig};
