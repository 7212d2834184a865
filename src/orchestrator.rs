//! Orchestrator facade
//!
//! Public entry point for the user-update saga: builds the two concrete
//! steps, wires the logging observer and trace context, generates the
//! workflow ID, and submits the run to the workflow host.

use crate::activity::Activity;
use crate::actions::{payment_update_step, user_update_step};
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::host::WorkflowHost;
use crate::messaging::{Producer, Subscriber};
use crate::observer::{LoggingObserver, TraceContext, WorkflowObserver};
use crate::user::User;
use crate::workflow::Workflow;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Workflow type label stamped on every trace context
pub const USER_UPDATION: &str = "user_updation";

/// Entry point the surrounding application calls for orchestrated updates
#[async_trait]
pub trait WorkflowOrchestrator: Send + Sync {
    async fn execute_user_update(
        &self,
        ctx: &CancellationToken,
        old_user: &User,
        new_user: &User,
    ) -> Result<()>;
}

/// Saga orchestrator backed by a producer, a subscriber and a workflow host
pub struct SagaOrchestrator {
    producer: Arc<dyn Producer>,
    subscriber: Arc<dyn Subscriber>,
    host: Arc<dyn WorkflowHost>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl SagaOrchestrator {
    pub fn new(
        producer: Arc<dyn Producer>,
        subscriber: Arc<dyn Subscriber>,
        host: Arc<dyn WorkflowHost>,
    ) -> Self {
        Self {
            producer,
            subscriber,
            host,
            clock: Arc::new(SystemClock::new()),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl WorkflowOrchestrator for SagaOrchestrator {
    async fn execute_user_update(
        &self,
        ctx: &CancellationToken,
        old_user: &User,
        new_user: &User,
    ) -> Result<()> {
        info!(user_id = %new_user.id, "starting user update orchestration");

        let workflow_id = format!("user_updation_{}", Uuid::new_v4());
        let verification_timeout =
            Duration::from_millis(self.config.workflow.verification_timeout_ms);

        let mut activity = Activity::new(Arc::clone(&self.clock));
        activity.add_step(user_update_step(
            Arc::clone(&self.producer),
            old_user,
            new_user,
        ));
        activity.add_step(payment_update_step(
            Arc::clone(&self.producer),
            Arc::clone(&self.subscriber),
            old_user,
            new_user,
            verification_timeout,
        ));

        let trace = TraceContext {
            workflow_id: workflow_id.clone(),
            workflow_type: USER_UPDATION.to_string(),
            entity_id: new_user.id.clone(),
        };
        let observers: Vec<Arc<dyn WorkflowObserver>> = vec![Arc::new(LoggingObserver::new())];
        let workflow = Arc::new(Workflow::new(
            activity,
            trace,
            observers,
            Arc::clone(&self.clock),
        ));

        let running = Arc::clone(&workflow);
        let result = self
            .host
            .execute(
                ctx,
                &workflow_id,
                &self.config.workflow.task_queue,
                Box::new(move |token| Box::pin(async move { running.run(&token).await })),
            )
            .await;

        match &result {
            Ok(()) => info!(
                workflow_id = %workflow_id,
                state = %workflow.state(),
                user_id = %new_user.id,
                "user update orchestration completed"
            ),
            Err(err) => error!(
                workflow_id = %workflow_id,
                state = %workflow.state(),
                user_id = %new_user.id,
                error = %err,
                "user update workflow failed"
            ),
        }
        result
    }
}

/// Inert orchestrator for deployments that only need plain CRUD
#[derive(Debug, Clone, Default)]
pub struct NoopOrchestrator;

impl NoopOrchestrator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkflowOrchestrator for NoopOrchestrator {
    async fn execute_user_update(
        &self,
        _ctx: &CancellationToken,
        _old_user: &User,
        _new_user: &User,
    ) -> Result<()> {
        Ok(())
    }
}
