//! Dispatch of routed requests into application code

pub mod dispatcher;
pub mod gate;
pub mod pool;
pub mod scheduler;
pub mod task;

pub use dispatcher::{DispatchOutcome, SubsequentRequestDispatcher};
pub use gate::{ConcurrencyGate, GateGuard};
pub use pool::WorkerPool;
pub use scheduler::{DispatchScheduler, ExecutionMode};
pub use task::{DispatchTask, TaskState};
