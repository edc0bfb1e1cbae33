//! Task data model, status machine and the owning store.

pub mod context;
pub mod outcome;
pub mod queue;
pub mod store;
pub mod transitions;
pub mod types;

pub use context::TaskContext;
pub use outcome::{Classification, StepOutcome, TaskResult};
pub use queue::PendingQueue;
pub use store::{Admission, CancelOutcome, PerformanceMetrics, StoreCounts, TaskStore};
pub use transitions::{StateTransition, TransitionError};
pub use types::{NewTask, Priority, Step, Task, TaskId, TaskStatus};
