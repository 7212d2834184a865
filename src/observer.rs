//! Workflow events, trace context and the observer channel
//!
//! Every phase and command transition is published as a [`WorkflowEvent`]
//! value to the registered observers. Events are plain values and stay safe
//! to copy across observer boundaries; the workflow injects its trace
//! context into any event whose context is unset before delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

/// Sentinel step name used by workflow-level events
pub const ALL_STEPS: &str = "All Commands";

/// The kind of workflow transition an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ExecuteStart,
    ExecuteSuccess,
    ExecuteFailed,
    VerifyStart,
    VerifySuccess,
    VerifyFailed,
    ApproveStart,
    ApproveSuccess,
    ApproveFailed,
    CompensateStart,
    CompensateSuccess,
    CompensateFailed,
    PhaseStart,
    PhaseComplete,
    WorkflowComplete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ExecuteStart => "execute.start",
            EventType::ExecuteSuccess => "execute.success",
            EventType::ExecuteFailed => "execute.failed",
            EventType::VerifyStart => "verify.start",
            EventType::VerifySuccess => "verify.success",
            EventType::VerifyFailed => "verify.failed",
            EventType::ApproveStart => "approve.start",
            EventType::ApproveSuccess => "approve.success",
            EventType::ApproveFailed => "approve.failed",
            EventType::CompensateStart => "compensate.start",
            EventType::CompensateSuccess => "compensate.success",
            EventType::CompensateFailed => "compensate.failed",
            EventType::PhaseStart => "phase.start",
            EventType::PhaseComplete => "phase.complete",
            EventType::WorkflowComplete => "workflow.complete",
        }
    }

    /// True for the `*.failed` members of the cross product
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventType::ExecuteFailed
                | EventType::VerifyFailed
                | EventType::ApproveFailed
                | EventType::CompensateFailed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation identifiers propagated onto every emitted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Unique workflow execution ID
    pub workflow_id: String,
    /// Type of workflow (e.g. "user_updation")
    pub workflow_type: String,
    /// ID of the entity being processed (e.g. the user ID)
    pub entity_id: String,
}

/// An event that occurred during workflow execution
#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub event_type: EventType,
    pub step_name: String,
    pub step_index: usize,
    pub phase: String,
    pub state: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub context: Option<TraceContext>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowEvent {
    pub fn new(
        event_type: EventType,
        step_name: impl Into<String>,
        step_index: usize,
        phase: impl Into<String>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            step_name: step_name.into(),
            step_index,
            phase: phase.into(),
            state: None,
            error,
            timestamp,
            duration: None,
            context: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach workflow trace context to the event
    pub fn with_context(mut self, context: TraceContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the duration of the operation the event describes
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the saga state label carried by workflow-level events
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Add custom metadata to the event
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Synchronous sink for workflow events
///
/// Delivery happens on the workflow's task; observers that need to defer
/// work must do so internally.
pub trait WorkflowObserver: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent);
}

/// Observer that routes events to the structured logger
///
/// Events carrying an error log at error level, everything else at info.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

impl LoggingObserver {
    pub fn new() -> Self {
        Self
    }

    fn format_event(event: &WorkflowEvent) -> String {
        let timestamp = event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");

        let mut message = if event.step_name == ALL_STEPS && event.step_index == 0 {
            format!(
                "[{}] Phase: {} | Type: {}",
                timestamp, event.phase, event.event_type
            )
        } else {
            format!(
                "[{}] Phase: {} | Step: {} (idx:{}) | Type: {}",
                timestamp, event.phase, event.step_name, event.step_index, event.event_type
            )
        };

        if let Some(state) = &event.state {
            message.push_str(&format!(" | State: {state}"));
        }

        if let Some(err) = &event.error {
            message.push_str(&format!(" | Error: {err}"));
        }

        message
    }
}

impl WorkflowObserver for LoggingObserver {
    fn on_event(&self, event: &WorkflowEvent) {
        let message = Self::format_event(event);

        if event.error.is_some() {
            error!("{message}");
        } else {
            info!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::ExecuteStart.as_str(), "execute.start");
        assert_eq!(EventType::CompensateFailed.as_str(), "compensate.failed");
        assert_eq!(EventType::WorkflowComplete.as_str(), "workflow.complete");
        assert!(EventType::VerifyFailed.is_failure());
        assert!(!EventType::PhaseStart.is_failure());
    }

    #[test]
    fn test_step_event_format() {
        let event = WorkflowEvent::new(
            EventType::ExecuteSuccess,
            "PaymentUpdateExecute",
            1,
            "Execute",
            None,
            timestamp(),
        );

        let message = LoggingObserver::format_event(&event);
        assert_eq!(
            message,
            "[2024-03-04 10:30:00.000] Phase: Execute | Step: PaymentUpdateExecute (idx:1) | Type: execute.success"
        );
    }

    #[test]
    fn test_workflow_event_omits_step_qualifier() {
        let event = WorkflowEvent::new(
            EventType::PhaseStart,
            ALL_STEPS,
            0,
            "Verify",
            None,
            timestamp(),
        )
        .with_state("Running");

        let message = LoggingObserver::format_event(&event);
        assert_eq!(
            message,
            "[2024-03-04 10:30:00.000] Phase: Verify | Type: phase.start | State: Running"
        );
    }

    #[test]
    fn test_failed_event_carries_error_segment() {
        let event = WorkflowEvent::new(
            EventType::VerifyFailed,
            "PaymentUpdateVerification",
            1,
            "Verify",
            Some("payment rejected pending data: insufficient funds".to_string()),
            timestamp(),
        );

        let message = LoggingObserver::format_event(&event);
        assert!(message.ends_with("| Error: payment rejected pending data: insufficient funds"));
    }

    #[test]
    fn test_builder_enrichment() {
        let trace = TraceContext {
            workflow_id: "user_updation_1".to_string(),
            workflow_type: "user_updation".to_string(),
            entity_id: "u1".to_string(),
        };

        let event = WorkflowEvent::new(
            EventType::ExecuteSuccess,
            "PaymentUpdateExecute",
            1,
            "Execute",
            None,
            timestamp(),
        )
        .with_context(trace.clone())
        .with_duration(Duration::from_millis(42))
        .add_metadata("attempt", serde_json::json!(1));

        assert_eq!(event.context, Some(trace));
        assert_eq!(event.duration, Some(Duration::from_millis(42)));
        assert_eq!(event.metadata["attempt"], serde_json::json!(1));
    }
}
