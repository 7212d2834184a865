//! Saga workflow state machine
//!
//! Orders the three forward phases (Execute, Verify, Approve), triggers
//! Compensate on any phase failure, owns the saga state and last error, and
//! injects its trace context into every event before delivering it to the
//! registered observers.

use crate::activity::Activity;
use crate::clock::Clock;
use crate::error::{OrchestratorError, Result};
use crate::observer::{EventType, TraceContext, WorkflowEvent, WorkflowObserver, ALL_STEPS};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Saga lifecycle states
///
/// Transitions are monotonic (`Initial → Running → Completed`) except via
/// the compensation branch (`Failed → Compensating → Compensated`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Initial,
    Running,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SagaState::Initial => "Initial",
            SagaState::Running => "Running",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
            SagaState::Compensating => "Compensating",
            SagaState::Compensated => "Compensated",
        };
        f.write_str(label)
    }
}

/// Ordered observer list plus the trace context injected on delivery
struct ObserverSink {
    observers: Vec<Arc<dyn WorkflowObserver>>,
    trace: TraceContext,
}

impl ObserverSink {
    fn notify(&self, mut event: WorkflowEvent) {
        if event.context.is_none() {
            event.context = Some(self.trace.clone());
        }
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}

/// One saga run over an activity's steps
pub struct Workflow {
    activity: Activity,
    sink: Arc<ObserverSink>,
    clock: Arc<dyn Clock>,
    state: Mutex<SagaState>,
    last_error: Mutex<Option<OrchestratorError>>,
}

impl Workflow {
    /// Wire the activity's notifier through this workflow's observer sink
    ///
    /// The observer list is frozen here; it is not mutated during `run`.
    pub fn new(
        mut activity: Activity,
        trace: TraceContext,
        observers: Vec<Arc<dyn WorkflowObserver>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sink = Arc::new(ObserverSink { observers, trace });
        let notifier_sink = Arc::clone(&sink);
        activity.set_notifier(Arc::new(move |event| notifier_sink.notify(event)));

        Self {
            activity,
            sink,
            clock,
            state: Mutex::new(SagaState::Initial),
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SagaState {
        *self.state.lock().expect("state lock poisoned")
    }

    pub fn last_error(&self) -> Option<OrchestratorError> {
        self.last_error.lock().expect("error lock poisoned").clone()
    }

    pub fn trace(&self) -> &TraceContext {
        &self.sink.trace
    }

    fn set_state(&self, state: SagaState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    fn emit(&self, event_type: EventType, phase: &str, error: Option<String>) {
        let event = WorkflowEvent::new(event_type, ALL_STEPS, 0, phase, error, self.clock.now())
            .with_state(self.state().to_string());
        self.sink.notify(event);
    }

    /// Drive Execute, Verify and Approve; compensate on the first failure
    ///
    /// Phases are strictly sequential; a phase starts only after the
    /// previous one fully joined.
    pub async fn run(&self, ctx: &CancellationToken) -> Result<()> {
        self.set_state(SagaState::Running);

        self.emit(EventType::PhaseStart, "Execute", None);
        if let Err(err) = self.activity.execute(ctx).await {
            return self
                .fail_and_compensate("Execute", EventType::ExecuteFailed, err)
                .await;
        }
        self.emit(EventType::PhaseComplete, "Execute", None);

        self.emit(EventType::PhaseStart, "Verify", None);
        if let Err(err) = self.activity.verify(ctx).await {
            return self
                .fail_and_compensate("Verify", EventType::VerifyFailed, err)
                .await;
        }
        self.emit(EventType::PhaseComplete, "Verify", None);

        self.emit(EventType::PhaseStart, "Approve", None);
        if let Err(err) = self.activity.approve(ctx).await {
            return self
                .fail_and_compensate("Approve", EventType::ApproveFailed, err)
                .await;
        }
        self.emit(EventType::PhaseComplete, "Approve", None);

        self.set_state(SagaState::Completed);
        self.emit(EventType::WorkflowComplete, "Workflow", None);
        Ok(())
    }

    async fn fail_and_compensate(
        &self,
        phase: &str,
        failed_event: EventType,
        err: OrchestratorError,
    ) -> Result<()> {
        self.set_state(SagaState::Failed);
        *self.last_error.lock().expect("error lock poisoned") = Some(err.clone());
        self.emit(failed_event, phase, Some(err.to_string()));

        self.set_state(SagaState::Compensating);
        self.emit(EventType::PhaseStart, "Compensate", None);

        // Rollback must proceed even when the caller's token caused the
        // phase failure, so compensation runs on a detached token.
        let detached = CancellationToken::new();
        match self.activity.compensate(&detached).await {
            Ok(()) => {
                self.set_state(SagaState::Compensated);
                self.emit(EventType::PhaseComplete, "Compensate", None);
                Err(err)
            }
            Err(compensation_err) => {
                self.set_state(SagaState::Failed);
                self.emit(
                    EventType::CompensateFailed,
                    "Compensate",
                    Some(compensation_err.to_string()),
                );
                Err(OrchestratorError::Compensation {
                    original: Box::new(err),
                    compensation: Box::new(compensation_err),
                })
            }
        }
    }
}
