//! Durable files written by the index builder: the identifier array, the
//! build checkpoint, and the atomic write primitive both rely on.

pub mod atomic;
pub mod checkpoint;
pub mod ids;

pub use atomic::{remove_if_exists, write_atomic};
pub use checkpoint::{BuildState, Checkpoint, CheckpointStore};
pub use ids::IdentifierArray;
