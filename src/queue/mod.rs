//! Durable priority queue and worker pool for judging jobs

pub mod metrics;
pub mod priority;
pub mod queue;
pub mod worker;

pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use priority::{compute_priority, PriorityInputs};
pub use queue::{JudgeQueue, QueueJob, QueuePosition};
pub use worker::WorkerPool;
