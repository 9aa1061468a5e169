pub mod context;
pub mod executor;
pub mod ddl;
pub mod dml;
pub mod delete;
pub mod query;

pub use context::ExecutionContext;
pub use executor::{Executor, ExecutorPipeline};
