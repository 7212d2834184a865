//! Step catalogue for the user-update saga
//!
//! Two concrete steps participate in a user update: the local user step,
//! which only approves or rolls back the already-written record, and the
//! payment step, which walks all four capabilities against the payment
//! service. Every command publishes a self-describing JSON envelope that
//! carries a fresh `command_id`, so downstream services can deduplicate
//! retries.

use crate::command::{
    Approval, Compensation, Execution, Verification, VerificationResponse, PAYMENT_UPDATE,
    PAYMENT_UPDATE_APPROVE, PAYMENT_UPDATE_COMPENSATE, PAYMENT_UPDATE_EXECUTE,
    PAYMENT_UPDATE_VERIFICATION, USER_UPDATE, USER_UPDATE_APPROVE, USER_UPDATE_COMPENSATE,
};
use crate::error::{OrchestratorError, Result};
use crate::messaging::{Producer, Subscriber};
use crate::step::Step;
use crate::user::User;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const USER_APPROVE_CHANNEL: &str = "user.approve";
pub const USER_ROLLBACK_CHANNEL: &str = "user.rollback";
pub const PAYMENT_PENDING_CHANNEL: &str = "payment.pending";
pub const PAYMENT_PENDING_RESPONSE_CHANNEL: &str = "payment.pending.response";
pub const PAYMENT_APPROVE_CHANNEL: &str = "payment.approve";
pub const PAYMENT_ROLLBACK_CHANNEL: &str = "payment.rollback";

/// Deadline for the payment verification response
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

fn encode(payload: &serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(payload)
        .map_err(|e| OrchestratorError::Encoding(format!("failed to marshal event: {e}")))
}

/// Publishes `user.approve` once every step verified
pub struct UserUpdateApproval {
    producer: Arc<dyn Producer>,
    user_id: String,
    command_id: Uuid,
    ran: AtomicBool,
}

impl UserUpdateApproval {
    pub fn new(producer: Arc<dyn Producer>, user_id: impl Into<String>) -> Self {
        Self {
            producer,
            user_id: user_id.into(),
            command_id: Uuid::new_v4(),
            ran: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Approval for UserUpdateApproval {
    fn name(&self) -> &str {
        USER_UPDATE_APPROVE
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn approve(&self, ctx: &CancellationToken) -> Result<()> {
        let payload = encode(&json!({
            "event": USER_APPROVE_CHANNEL,
            "user_id": self.user_id,
            "command_id": self.command_id,
        }))?;
        self.producer.push(ctx, USER_APPROVE_CHANNEL, payload).await
    }
}

/// Publishes `user.rollback` with the pre-update snapshot
pub struct UserUpdateCompensation {
    producer: Arc<dyn Producer>,
    old_user: User,
    command_id: Uuid,
    ran: AtomicBool,
}

impl UserUpdateCompensation {
    pub fn new(producer: Arc<dyn Producer>, old_user: User) -> Self {
        Self {
            producer,
            old_user,
            command_id: Uuid::new_v4(),
            ran: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Compensation for UserUpdateCompensation {
    fn name(&self) -> &str {
        USER_UPDATE_COMPENSATE
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn compensate(&self, ctx: &CancellationToken) -> Result<()> {
        let payload = encode(&json!({
            "event": USER_ROLLBACK_CHANNEL,
            "user": self.old_user,
            "command_id": self.command_id,
        }))?;
        self.producer
            .push(ctx, USER_ROLLBACK_CHANNEL, payload)
            .await
    }
}

/// Publishes `payment.pending` with the updated contact data
pub struct PaymentUpdateExecution {
    producer: Arc<dyn Producer>,
    new_user: User,
    command_id: Uuid,
    ran: AtomicBool,
}

impl PaymentUpdateExecution {
    pub fn new(producer: Arc<dyn Producer>, new_user: User) -> Self {
        Self {
            producer,
            new_user,
            command_id: Uuid::new_v4(),
            ran: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Execution for PaymentUpdateExecution {
    fn name(&self) -> &str {
        PAYMENT_UPDATE_EXECUTE
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn execute(&self, ctx: &CancellationToken) -> Result<()> {
        let payload = encode(&json!({
            "event": PAYMENT_PENDING_CHANNEL,
            "user_id": self.new_user.id,
            "data": {
                "name": self.new_user.name,
                "email": self.new_user.email,
                "phone": self.new_user.phone,
                "address": self.new_user.address,
            },
            "command_id": self.command_id,
        }))?;
        self.producer
            .push(ctx, PAYMENT_PENDING_CHANNEL, payload)
            .await
    }
}

/// Awaits the payment service's verdict on the pending data
pub struct PaymentUpdateVerification {
    subscriber: Arc<dyn Subscriber>,
    timeout: Duration,
    ran: AtomicBool,
}

impl PaymentUpdateVerification {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            timeout: DEFAULT_VERIFICATION_TIMEOUT,
            ran: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Verification for PaymentUpdateVerification {
    fn name(&self) -> &str {
        PAYMENT_UPDATE_VERIFICATION
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn verify(&self, ctx: &CancellationToken) -> Result<()> {
        let raw = match tokio::time::timeout(
            self.timeout,
            self.subscriber.consume(ctx, PAYMENT_PENDING_RESPONSE_CHANNEL),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(OrchestratorError::Timeout(format!(
                    "no verification response on {PAYMENT_PENDING_RESPONSE_CHANNEL} within {:?}",
                    self.timeout
                )))
            }
        };

        let response: VerificationResponse = serde_json::from_slice(&raw).map_err(|e| {
            OrchestratorError::Encoding(format!("invalid verification response: {e}"))
        })?;

        if !response.accepted {
            return Err(OrchestratorError::VerificationRejected {
                service: response.service_name,
                message: response.message,
            });
        }
        Ok(())
    }
}

/// Publishes `payment.approve` to commit the pending data
pub struct PaymentUpdateApproval {
    producer: Arc<dyn Producer>,
    user_id: String,
    command_id: Uuid,
    ran: AtomicBool,
}

impl PaymentUpdateApproval {
    pub fn new(producer: Arc<dyn Producer>, user_id: impl Into<String>) -> Self {
        Self {
            producer,
            user_id: user_id.into(),
            command_id: Uuid::new_v4(),
            ran: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Approval for PaymentUpdateApproval {
    fn name(&self) -> &str {
        PAYMENT_UPDATE_APPROVE
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn approve(&self, ctx: &CancellationToken) -> Result<()> {
        let payload = encode(&json!({
            "event": PAYMENT_APPROVE_CHANNEL,
            "user_id": self.user_id,
            "command_id": self.command_id,
        }))?;
        self.producer
            .push(ctx, PAYMENT_APPROVE_CHANNEL, payload)
            .await
    }
}

/// Publishes `payment.rollback` with the pre-update contact data
pub struct PaymentUpdateCompensation {
    producer: Arc<dyn Producer>,
    old_user: User,
    command_id: Uuid,
    ran: AtomicBool,
}

impl PaymentUpdateCompensation {
    pub fn new(producer: Arc<dyn Producer>, old_user: User) -> Self {
        Self {
            producer,
            old_user,
            command_id: Uuid::new_v4(),
            ran: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Compensation for PaymentUpdateCompensation {
    fn name(&self) -> &str {
        PAYMENT_UPDATE_COMPENSATE
    }

    fn has_run(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    fn mark_run(&self) {
        self.ran.store(true, Ordering::Release);
    }

    async fn compensate(&self, ctx: &CancellationToken) -> Result<()> {
        let payload = encode(&json!({
            "event": PAYMENT_ROLLBACK_CHANNEL,
            "user_id": self.old_user.id,
            "data": {
                "name": self.old_user.name,
                "email": self.old_user.email,
                "phone": self.old_user.phone,
                "address": self.old_user.address,
            },
            "command_id": self.command_id,
        }))?;
        self.producer
            .push(ctx, PAYMENT_ROLLBACK_CHANNEL, payload)
            .await
    }
}

/// Build the user step: approval and compensation only
///
/// With no Execution the step counts as executed from construction, which
/// is what lets its approval and compensation participate in later phases.
pub fn user_update_step(producer: Arc<dyn Producer>, old_user: &User, new_user: &User) -> Step {
    Step::new(USER_UPDATE)
        .with_approval(Arc::new(UserUpdateApproval::new(
            Arc::clone(&producer),
            new_user.id.clone(),
        )))
        .with_compensation(Arc::new(UserUpdateCompensation::new(
            producer,
            old_user.clone(),
        )))
}

/// Build the payment step with all four capabilities
pub fn payment_update_step(
    producer: Arc<dyn Producer>,
    subscriber: Arc<dyn Subscriber>,
    old_user: &User,
    new_user: &User,
    verification_timeout: Duration,
) -> Step {
    Step::new(PAYMENT_UPDATE)
        .with_execution(Arc::new(PaymentUpdateExecution::new(
            Arc::clone(&producer),
            new_user.clone(),
        )))
        .with_verification(Arc::new(
            PaymentUpdateVerification::new(subscriber).with_timeout(verification_timeout),
        ))
        .with_approval(Arc::new(PaymentUpdateApproval::new(
            Arc::clone(&producer),
            new_user.id.clone(),
        )))
        .with_compensation(Arc::new(PaymentUpdateCompensation::new(
            producer,
            old_user.clone(),
        )))
}
