//! Concurrent phase runner
//!
//! An [`Activity`] owns the steps of one workflow run and drives a single
//! capability across all eligible steps in parallel. Every started command
//! is awaited before the phase returns, so each one emits its own event
//! pair and compensation can reason about exactly which commands ran. A
//! first-error policy aggregates the outcome after the join.

use crate::clock::Clock;
use crate::command::{Approval, Compensation, Execution, Verification};
use crate::error::Result;
use crate::observer::{EventType, WorkflowEvent};
use crate::step::Step;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Callback the workflow installs to receive activity events
pub type EventNotifier = Arc<dyn Fn(WorkflowEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    Verify,
    Approve,
    Compensate,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Execute => "Execute",
            Phase::Verify => "Verify",
            Phase::Approve => "Approve",
            Phase::Compensate => "Compensate",
        }
    }

    fn start_event(&self) -> EventType {
        match self {
            Phase::Execute => EventType::ExecuteStart,
            Phase::Verify => EventType::VerifyStart,
            Phase::Approve => EventType::ApproveStart,
            Phase::Compensate => EventType::CompensateStart,
        }
    }

    fn success_event(&self) -> EventType {
        match self {
            Phase::Execute => EventType::ExecuteSuccess,
            Phase::Verify => EventType::VerifySuccess,
            Phase::Approve => EventType::ApproveSuccess,
            Phase::Compensate => EventType::CompensateSuccess,
        }
    }

    fn failed_event(&self) -> EventType {
        match self {
            Phase::Execute => EventType::ExecuteFailed,
            Phase::Verify => EventType::VerifyFailed,
            Phase::Approve => EventType::ApproveFailed,
            Phase::Compensate => EventType::CompensateFailed,
        }
    }
}

/// One eligible command, resolved for a specific phase
enum PhaseCommand {
    Execute(Arc<dyn Execution>),
    Verify(Arc<dyn Verification>),
    Approve(Arc<dyn Approval>),
    Compensate(Arc<dyn Compensation>),
}

impl PhaseCommand {
    fn name(&self) -> &str {
        match self {
            PhaseCommand::Execute(command) => command.name(),
            PhaseCommand::Verify(command) => command.name(),
            PhaseCommand::Approve(command) => command.name(),
            PhaseCommand::Compensate(command) => command.name(),
        }
    }

    async fn invoke(&self, ctx: &CancellationToken) -> Result<()> {
        match self {
            PhaseCommand::Execute(command) => command.execute(ctx).await,
            PhaseCommand::Verify(command) => command.verify(ctx).await,
            PhaseCommand::Approve(command) => command.approve(ctx).await,
            PhaseCommand::Compensate(command) => command.compensate(ctx).await,
        }
    }

    fn mark_run(&self) {
        match self {
            PhaseCommand::Execute(command) => command.mark_run(),
            PhaseCommand::Verify(command) => command.mark_run(),
            PhaseCommand::Approve(command) => command.mark_run(),
            PhaseCommand::Compensate(command) => command.mark_run(),
        }
    }
}

/// Parallel phase runner over an ordered, append-only list of steps
pub struct Activity {
    steps: Vec<Arc<Step>>,
    notifier: EventNotifier,
    clock: Arc<dyn Clock>,
}

impl Activity {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            steps: Vec::new(),
            notifier: Arc::new(|_| {}),
            clock,
        }
    }

    /// Append a step; the list must stay stable for the duration of a phase
    pub fn add_step(&mut self, step: Step) {
        self.steps.push(Arc::new(step));
    }

    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    pub(crate) fn set_notifier(&mut self, notifier: EventNotifier) {
        self.notifier = notifier;
    }

    /// Run the forward action of every eligible step concurrently
    pub async fn execute(&self, ctx: &CancellationToken) -> Result<()> {
        self.run_phase(ctx, Phase::Execute).await
    }

    /// Confirm downstream acceptance for every executed step concurrently
    pub async fn verify(&self, ctx: &CancellationToken) -> Result<()> {
        self.run_phase(ctx, Phase::Verify).await
    }

    /// Send the commit signal for every executed step concurrently
    pub async fn approve(&self, ctx: &CancellationToken) -> Result<()> {
        self.run_phase(ctx, Phase::Approve).await
    }

    /// Roll back every executed step concurrently
    pub async fn compensate(&self, ctx: &CancellationToken) -> Result<()> {
        self.run_phase(ctx, Phase::Compensate).await
    }

    fn eligible_command(phase: Phase, step: &Step) -> Option<PhaseCommand> {
        match phase {
            Phase::Execute => step
                .execution()
                .filter(|command| !command.has_run())
                .cloned()
                .map(PhaseCommand::Execute),
            Phase::Verify => step
                .is_executed()
                .then(|| {
                    step.verification()
                        .filter(|command| !command.has_run())
                        .cloned()
                        .map(PhaseCommand::Verify)
                })
                .flatten(),
            Phase::Approve => step
                .is_executed()
                .then(|| {
                    step.approval()
                        .filter(|command| !command.has_run())
                        .cloned()
                        .map(PhaseCommand::Approve)
                })
                .flatten(),
            Phase::Compensate => step
                .is_executed()
                .then(|| {
                    step.compensation()
                        .filter(|command| !command.has_run())
                        .cloned()
                        .map(PhaseCommand::Compensate)
                })
                .flatten(),
        }
    }

    async fn run_phase(&self, ctx: &CancellationToken, phase: Phase) -> Result<()> {
        let mut tasks = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            let Some(command) = Self::eligible_command(phase, step) else {
                continue;
            };
            tasks.push(self.run_command(ctx.clone(), phase, Arc::clone(step), index, command));
        }

        // Every started command joins before the first error is surfaced.
        let results = join_all(tasks).await;
        match results.into_iter().find_map(|result| result.err()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_command(
        &self,
        ctx: CancellationToken,
        phase: Phase,
        step: Arc<Step>,
        index: usize,
        command: PhaseCommand,
    ) -> Result<()> {
        let started = self.clock.now();
        (self.notifier)(WorkflowEvent::new(
            phase.start_event(),
            command.name(),
            index,
            phase.label(),
            None,
            started,
        ));

        let outcome = command.invoke(&ctx).await;
        let duration = (self.clock.now() - started).to_std().unwrap_or_default();

        match outcome {
            Ok(()) => {
                command.mark_run();
                if matches!(command, PhaseCommand::Execute(_)) {
                    step.mark_executed();
                }
                (self.notifier)(
                    WorkflowEvent::new(
                        phase.success_event(),
                        command.name(),
                        index,
                        phase.label(),
                        None,
                        self.clock.now(),
                    )
                    .with_duration(duration),
                );
                Ok(())
            }
            Err(err) => {
                (self.notifier)(
                    WorkflowEvent::new(
                        phase.failed_event(),
                        command.name(),
                        index,
                        phase.label(),
                        Some(err.to_string()),
                        self.clock.now(),
                    )
                    .with_duration(duration),
                );
                Err(err)
            }
        }
    }
}
