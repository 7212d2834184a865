//! End-to-end tests for the user-update saga workflow

use async_trait::async_trait;
use chrono::TimeZone;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use userflow::{
    payment_update_step, user_update_step, Activity, EventType, LoggingObserver, ManualClock,
    OrchestratorError, PaymentUpdateVerification, Producer, Result, SagaState, Subscriber,
    SystemClock, TraceContext, User, Workflow, WorkflowEvent, WorkflowObserver,
};

/// Producer double that records decoded envelopes and can fail or block
/// on selected channels.
struct RecordingProducer {
    pushes: Mutex<Vec<(String, serde_json::Value)>>,
    fail_channels: Mutex<HashSet<String>>,
    block_channels: Mutex<HashSet<String>>,
}

impl RecordingProducer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pushes: Mutex::new(Vec::new()),
            fail_channels: Mutex::new(HashSet::new()),
            block_channels: Mutex::new(HashSet::new()),
        })
    }

    fn fail_on(&self, channel: &str) {
        self.fail_channels.lock().unwrap().insert(channel.to_string());
    }

    fn clear_failures(&self) {
        self.fail_channels.lock().unwrap().clear();
    }

    fn block_on(&self, channel: &str) {
        self.block_channels
            .lock()
            .unwrap()
            .insert(channel.to_string());
    }

    fn pushes(&self) -> Vec<(String, serde_json::Value)> {
        self.pushes.lock().unwrap().clone()
    }

    fn channels(&self) -> Vec<String> {
        self.pushes().into_iter().map(|(channel, _)| channel).collect()
    }

    fn count(&self, channel: &str) -> usize {
        self.channels().iter().filter(|c| *c == channel).count()
    }
}

#[async_trait]
impl Producer for RecordingProducer {
    async fn push(&self, ctx: &CancellationToken, channel: &str, payload: Vec<u8>) -> Result<()> {
        if self.block_channels.lock().unwrap().contains(channel) {
            ctx.cancelled().await;
            return Err(OrchestratorError::Cancelled(format!(
                "push to {channel} aborted"
            )));
        }
        if self.fail_channels.lock().unwrap().contains(channel) {
            return Err(OrchestratorError::Transport(format!(
                "injected failure on {channel}"
            )));
        }

        let value = serde_json::from_slice(&payload)
            .map_err(|e| OrchestratorError::Encoding(e.to_string()))?;
        self.pushes.lock().unwrap().push((channel.to_string(), value));
        Ok(())
    }
}

/// Subscriber double that replays scripted responses, then waits for
/// cancellation.
struct ScriptedSubscriber {
    responses: Mutex<VecDeque<Vec<u8>>>,
}

impl ScriptedSubscriber {
    fn new(responses: Vec<&[u8]>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(<[u8]>::to_vec).collect()),
        })
    }

    fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    async fn consume(&self, ctx: &CancellationToken, channel: &str) -> Result<Vec<u8>> {
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(raw) => Ok(raw),
            None => {
                ctx.cancelled().await;
                Err(OrchestratorError::Cancelled(format!(
                    "consume from {channel} aborted"
                )))
            }
        }
    }
}

struct RecordingObserver {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const ACCEPTED: &[u8] = br#"{"ServiceName":"payment","Accepted":true,"Message":"","Error":null}"#;
const REJECTED: &[u8] =
    br#"{"ServiceName":"payment","Accepted":false,"Message":"insufficient funds","Error":null}"#;

fn old_user() -> User {
    User::new("u1", "A", "a@x", "1", "P")
}

fn new_user() -> User {
    let mut user = old_user();
    user.name = "B".to_string();
    user.email = "b@x".to_string();
    user
}

fn trace() -> TraceContext {
    TraceContext {
        workflow_id: "user_updation_test".to_string(),
        workflow_type: "user_updation".to_string(),
        entity_id: "u1".to_string(),
    }
}

fn build_workflow(
    producer: Arc<RecordingProducer>,
    subscriber: Arc<ScriptedSubscriber>,
    observer: Arc<RecordingObserver>,
    verification_timeout: Duration,
) -> Workflow {
    let old = old_user();
    let new = new_user();
    let clock = Arc::new(SystemClock::new());

    let mut activity = Activity::new(clock.clone());
    activity.add_step(user_update_step(
        Arc::clone(&producer) as Arc<dyn Producer>,
        &old,
        &new,
    ));
    activity.add_step(payment_update_step(
        producer as Arc<dyn Producer>,
        subscriber as Arc<dyn Subscriber>,
        &old,
        &new,
        verification_timeout,
    ));

    Workflow::new(
        activity,
        trace(),
        vec![
            observer as Arc<dyn WorkflowObserver>,
            Arc::new(LoggingObserver::new()),
        ],
        clock,
    )
}

#[tokio::test]
async fn test_happy_path_completes_and_publishes_in_phase_order() {
    init_tracing();
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::new(vec![ACCEPTED]);
    let observer = RecordingObserver::new();
    let workflow = build_workflow(
        Arc::clone(&producer),
        subscriber,
        Arc::clone(&observer),
        Duration::from_secs(5),
    );

    workflow.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(workflow.state(), SagaState::Completed);
    assert!(workflow.last_error().is_none());

    let channels = producer.channels();
    assert_eq!(channels.len(), 3);
    // Execute publishes pending before any approval leaves the Approve phase.
    assert_eq!(channels[0], "payment.pending");
    assert_eq!(producer.count("user.approve"), 1);
    assert_eq!(producer.count("payment.approve"), 1);
    assert_eq!(producer.count("user.rollback"), 0);
    assert_eq!(producer.count("payment.rollback"), 0);

    for (_, envelope) in producer.pushes() {
        assert_eq!(envelope["user_id"], "u1");
    }

    let events = observer.events();
    assert!(events.iter().all(|event| !event.event_type.is_failure()));
    assert_eq!(
        events
            .iter()
            .filter(|event| event.event_type == EventType::WorkflowComplete)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_verification_rejection_rolls_back_both_steps() {
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::new(vec![REJECTED]);
    let observer = RecordingObserver::new();
    let workflow = build_workflow(
        Arc::clone(&producer),
        subscriber,
        Arc::clone(&observer),
        Duration::from_secs(5),
    );

    let err = workflow.run(&CancellationToken::new()).await.unwrap_err();

    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(workflow.state(), SagaState::Compensated);

    assert_eq!(producer.count("payment.pending"), 1);
    assert_eq!(producer.count("user.approve"), 0);
    assert_eq!(producer.count("payment.approve"), 0);
    assert_eq!(producer.count("user.rollback"), 1);
    assert_eq!(producer.count("payment.rollback"), 1);

    // Exactly one phase failed, and it failed before compensation started.
    let events = observer.events();
    let failed_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, event)| {
            event.event_type.is_failure() && event.event_type != EventType::CompensateFailed
        })
        .map(|(index, _)| index)
        .collect();
    let first_compensate = events
        .iter()
        .position(|event| event.event_type == EventType::CompensateStart)
        .unwrap();
    assert!(!failed_positions.is_empty());
    assert!(failed_positions.iter().all(|index| *index < first_compensate));
    assert!(failed_positions
        .iter()
        .all(|index| matches!(events[*index].event_type, EventType::VerifyFailed)));
}

#[tokio::test]
async fn test_verification_timeout_rolls_back_both_steps() {
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::silent();
    let observer = RecordingObserver::new();
    let workflow = build_workflow(
        Arc::clone(&producer),
        subscriber,
        observer,
        Duration::from_millis(100),
    );

    let err = workflow.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Timeout(_)));
    assert_eq!(workflow.state(), SagaState::Compensated);
    assert_eq!(producer.count("user.rollback"), 1);
    assert_eq!(producer.count("payment.rollback"), 1);
}

#[tokio::test]
async fn test_compensation_double_failure_keeps_failed_state() {
    init_tracing();
    let producer = RecordingProducer::new();
    producer.fail_on("payment.pending");
    producer.fail_on("user.rollback");
    let subscriber = ScriptedSubscriber::silent();
    let observer = RecordingObserver::new();
    let workflow = build_workflow(
        Arc::clone(&producer),
        subscriber,
        observer,
        Duration::from_secs(5),
    );

    let err = workflow.run(&CancellationToken::new()).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("execution"));
    assert!(message.contains("compensation"));
    assert!(matches!(err, OrchestratorError::Compensation { .. }));
    assert_eq!(workflow.state(), SagaState::Failed);

    // The payment step never executed, so only the user rollback was tried.
    assert_eq!(producer.count("payment.rollback"), 0);
}

#[tokio::test]
async fn test_pre_marked_user_step_participates_without_execution() {
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::new(vec![ACCEPTED]);
    let observer = RecordingObserver::new();
    let workflow = build_workflow(
        Arc::clone(&producer),
        subscriber,
        Arc::clone(&observer),
        Duration::from_secs(5),
    );

    workflow.run(&CancellationToken::new()).await.unwrap();

    // The user step approved even though it carries no Execution...
    assert_eq!(producer.count("user.approve"), 1);

    // ...and only the payment step ever produced execute events.
    let events = observer.events();
    let execute_steps: HashSet<String> = events
        .iter()
        .filter(|event| {
            matches!(
                event.event_type,
                EventType::ExecuteStart | EventType::ExecuteSuccess
            )
        })
        .map(|event| event.step_name.clone())
        .collect();
    assert_eq!(
        execute_steps,
        HashSet::from(["PaymentUpdateExecute".to_string()])
    );
}

#[tokio::test]
async fn test_rollback_scenario_still_compensates_pre_marked_step() {
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::new(vec![REJECTED]);
    let observer = RecordingObserver::new();
    let workflow = build_workflow(Arc::clone(&producer), subscriber, observer, Duration::from_secs(5));

    workflow.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(producer.count("user.rollback"), 1);
}

#[tokio::test]
async fn test_cancellation_mid_execute_still_compensates() {
    let producer = RecordingProducer::new();
    producer.block_on("payment.pending");
    let subscriber = ScriptedSubscriber::silent();
    let observer = RecordingObserver::new();
    let workflow = Arc::new(build_workflow(
        Arc::clone(&producer),
        subscriber,
        observer,
        Duration::from_secs(5),
    ));

    let ctx = CancellationToken::new();
    let run = tokio::spawn({
        let workflow = Arc::clone(&workflow);
        let ctx = ctx.clone();
        async move { workflow.run(&ctx).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, OrchestratorError::Cancelled(_)));
    assert_eq!(workflow.state(), SagaState::Compensated);

    // The pre-marked user step had completed, so its rollback ran on the
    // detached compensation token; the payment step never executed.
    assert_eq!(producer.count("user.rollback"), 1);
    assert_eq!(producer.count("payment.rollback"), 0);
}

#[tokio::test]
async fn test_rerunning_compensate_skips_successful_compensations() {
    let producer = RecordingProducer::new();
    producer.fail_on("payment.rollback");
    let old = old_user();
    let new = new_user();

    let mut activity = Activity::new(Arc::new(SystemClock::new()));
    activity.add_step(user_update_step(
        Arc::clone(&producer) as Arc<dyn Producer>,
        &old,
        &new,
    ));
    // A payment step whose execution already happened in a previous run.
    let payment_step = payment_update_step(
        Arc::clone(&producer) as Arc<dyn Producer>,
        ScriptedSubscriber::silent() as Arc<dyn Subscriber>,
        &old,
        &new,
        Duration::from_secs(5),
    );
    activity.add_step(payment_step);
    let ctx = CancellationToken::new();
    activity.execute(&ctx).await.unwrap();

    // First compensation pass: user rollback succeeds, payment rollback fails.
    let err = activity.compensate(&ctx).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Transport(_)));
    assert_eq!(producer.count("user.rollback"), 1);

    // Second pass skips the already-compensated user step.
    producer.clear_failures();
    activity.compensate(&ctx).await.unwrap();
    assert_eq!(producer.count("user.rollback"), 1);
    assert_eq!(producer.count("payment.rollback"), 1);
}

#[tokio::test]
async fn test_events_carry_trace_and_injected_clock_timestamps() {
    let instant = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(instant));
    let producer = RecordingProducer::new();
    let subscriber = ScriptedSubscriber::new(vec![ACCEPTED]);
    let observer = RecordingObserver::new();
    let old = old_user();
    let new = new_user();

    let mut activity = Activity::new(clock.clone());
    activity.add_step(user_update_step(
        Arc::clone(&producer) as Arc<dyn Producer>,
        &old,
        &new,
    ));
    activity.add_step(payment_update_step(
        producer as Arc<dyn Producer>,
        subscriber as Arc<dyn Subscriber>,
        &old,
        &new,
        Duration::from_secs(5),
    ));
    let workflow = Workflow::new(
        activity,
        trace(),
        vec![Arc::clone(&observer) as Arc<dyn WorkflowObserver>],
        clock,
    );

    workflow.run(&CancellationToken::new()).await.unwrap();

    let events = observer.events();
    assert!(!events.is_empty());
    for event in &events {
        assert_eq!(event.timestamp, instant);
        assert_eq!(event.context.as_ref(), Some(workflow.trace()));
    }
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[tokio::test]
async fn test_verification_timeout_uses_configured_deadline() {
    let started = std::time::Instant::now();
    let verification = PaymentUpdateVerification::new(
        ScriptedSubscriber::silent() as Arc<dyn Subscriber>,
    )
    .with_timeout(Duration::from_millis(50));

    let err = userflow::Verification::verify(&verification, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
