//! Saga Workflow Orchestration Library
//!
//! A saga-style workflow orchestrator that coordinates a multi-phase,
//! compensatable update of a user record across independent services:
//! - Steps bundle up to four capabilities (Execute, Verify, Approve,
//!   Compensate) behind narrow command seams
//! - An activity runs each phase across all eligible steps in parallel and
//!   aggregates the first error
//! - The workflow state machine orders the forward phases and rolls back
//!   partial progress on any failure
//! - Observers receive a structured trace of every transition
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use userflow::{
//!     InMemoryBroker, LocalWorkflowHost, SagaOrchestrator, User, WorkflowOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let broker = Arc::new(InMemoryBroker::new(64));
//!     let orchestrator = SagaOrchestrator::new(
//!         Arc::clone(&broker) as _,
//!         broker as _,
//!         Arc::new(LocalWorkflowHost::new()),
//!     );
//!
//!     let old_user = User::new("u1", "A", "a@x", "1", "P");
//!     let mut new_user = old_user.clone();
//!     new_user.name = "B".to_string();
//!
//!     orchestrator
//!         .execute_user_update(&CancellationToken::new(), &old_user, &new_user)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod activity;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod messaging;
pub mod observer;
pub mod orchestrator;
pub mod step;
pub mod user;
pub mod workflow;

// Re-export main types
pub use actions::{
    payment_update_step, user_update_step, PaymentUpdateApproval, PaymentUpdateCompensation,
    PaymentUpdateExecution, PaymentUpdateVerification, UserUpdateApproval, UserUpdateCompensation,
    DEFAULT_VERIFICATION_TIMEOUT,
};
pub use activity::{Activity, EventNotifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Approval, Compensation, Execution, Verification, VerificationResponse};
pub use config::{MessagingSettings, OrchestratorConfig, WorkflowSettings};
pub use error::{OrchestratorError, Result};
pub use host::{LocalWorkflowHost, WorkflowFn, WorkflowHost};
pub use messaging::{InMemoryBroker, Producer, Subscriber};
pub use observer::{
    EventType, LoggingObserver, TraceContext, WorkflowEvent, WorkflowObserver, ALL_STEPS,
};
pub use orchestrator::{NoopOrchestrator, SagaOrchestrator, WorkflowOrchestrator};
pub use step::Step;
pub use user::{InMemoryUserRepository, User, UserRepository, UserService};
pub use workflow::{SagaState, Workflow};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
