pub mod executor;
pub mod types;
pub mod worker;

pub use executor::JobExecutor;
pub use types::{BoxFuture, JobSnapshot, JobStatus, JobType, ReadFn, WriteFn};
