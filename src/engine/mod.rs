//! In-process job engine: processors, the job queue actor, and reply handles.

pub mod manager;
pub mod processor;
pub mod reply;
pub mod retry;

pub use manager::{JobProcessManager, JobQueueConfig};
pub use processor::{CountingProcessor, JobProcessor, Processor};
pub use reply::ReplyHandle;
pub use retry::{RetryPolicy, Retrying, retry};
