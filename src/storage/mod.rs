pub mod memory;
pub mod persistence;
pub mod table;

pub use memory::InMemoryStorage;
pub use persistence::{DatabaseSnapshot, SnapshotMetadata};
pub use table::Table;
