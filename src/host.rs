//! Workflow host seam
//!
//! The orchestrator never runs a workflow directly; it submits the
//! workflow's run closure to a [`WorkflowHost`] identified by a workflow ID
//! and task-queue name, and blocks until it terminates. Implementations may
//! persist, replay or simply invoke inline; the bundled
//! [`LocalWorkflowHost`] does the latter. Retries are not a host concern
//! here.

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The workflow's run closure, handed a cancellation token by the host
pub type WorkflowFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;

/// Submits a workflow run to an execution engine and awaits its verdict
#[async_trait]
pub trait WorkflowHost: Send + Sync {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        workflow_id: &str,
        task_queue: &str,
        workflow: WorkflowFn,
    ) -> Result<()>;
}

/// Host that invokes the workflow inline on the caller's task
///
/// Caller cancellation propagates through a child token; the workflow
/// future itself is never aborted from outside, so every started command
/// joins before the verdict is returned.
#[derive(Debug, Clone, Default)]
pub struct LocalWorkflowHost;

impl LocalWorkflowHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkflowHost for LocalWorkflowHost {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        workflow_id: &str,
        task_queue: &str,
        workflow: WorkflowFn,
    ) -> Result<()> {
        debug!(workflow_id, task_queue, "submitting workflow");

        let result = workflow(ctx.child_token()).await;
        match &result {
            Ok(()) => debug!(workflow_id, "workflow terminated cleanly"),
            Err(err) => warn!(workflow_id, error = %err, "workflow terminated with error"),
        }
        result
    }
}
