//! Hosting collaborators: key/value storage and the job queue.

pub mod keys;
pub mod queue;
pub mod storage;

pub use queue::{ImportProjectJob, JobHandler, JobQueue, JobReceiver, JobStats, LocalQueue, QueuedJob};
pub use storage::{KeyValueStore, LocalStore};
