//! Step aggregate: a named bundle of up to one command per capability
//!
//! The executed marker gates Verify, Approve and Compensate eligibility so
//! the workflow never compensates work that was not performed. A step
//! without an Execution counts as executed from construction; its approval
//! and compensation still participate in the later phases.

use crate::command::{Approval, Compensation, Execution, Verification};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Step {
    name: String,
    execution: Option<Arc<dyn Execution>>,
    verification: Option<Arc<dyn Verification>>,
    approval: Option<Arc<dyn Approval>>,
    compensation: Option<Arc<dyn Compensation>>,
    execution_succeeded: AtomicBool,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution: None,
            verification: None,
            approval: None,
            compensation: None,
            execution_succeeded: AtomicBool::new(false),
        }
    }

    pub fn with_execution(mut self, execution: Arc<dyn Execution>) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn with_verification(mut self, verification: Arc<dyn Verification>) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_approval(mut self, approval: Arc<dyn Approval>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_compensation(mut self, compensation: Arc<dyn Compensation>) -> Self {
        self.compensation = Some(compensation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution(&self) -> Option<&Arc<dyn Execution>> {
        self.execution.as_ref()
    }

    pub fn verification(&self) -> Option<&Arc<dyn Verification>> {
        self.verification.as_ref()
    }

    pub fn approval(&self) -> Option<&Arc<dyn Approval>> {
        self.approval.as_ref()
    }

    pub fn compensation(&self) -> Option<&Arc<dyn Compensation>> {
        self.compensation.as_ref()
    }

    /// Whether this step's forward work is in place
    ///
    /// True once execution succeeded, or immediately when the step carries
    /// no Execution at all.
    pub fn is_executed(&self) -> bool {
        self.execution.is_none() || self.execution_succeeded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_executed(&self) {
        self.execution_succeeded.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("has_execution", &self.execution.is_some())
            .field("has_verification", &self.verification.is_some())
            .field("has_approval", &self.approval.is_some())
            .field("has_compensation", &self.compensation.is_some())
            .field("executed", &self.is_executed())
            .finish()
    }
}
