//! Inline versus pooled execution

use crate::application::{ApplicationContext, ConcurrencyControlMode};

/// Where a dispatch task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// On the caller's task, before `dispatch` returns
    Inline,
    /// On the application's worker pool
    Pooled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchScheduler {
    bypass_request_executor: bool,
}

impl DispatchScheduler {
    pub fn new(bypass_request_executor: bool) -> Self {
        Self { bypass_request_executor }
    }

    pub fn bypass_request_executor(&self) -> bool {
        self.bypass_request_executor
    }

    pub fn execution_mode(&self, application: &ApplicationContext) -> ExecutionMode {
        if self.bypass_request_executor
            || application.concurrency_control_mode() == ConcurrencyControlMode::Transaction
        {
            ExecutionMode::Inline
        } else {
            ExecutionMode::Pooled
        }
    }
}
