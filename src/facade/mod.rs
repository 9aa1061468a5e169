pub mod database;

pub use database::{InMemoryDB, PreparedInsert};
