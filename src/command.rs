//! Command capability seams for saga steps
//!
//! A step participates in a phase only through the capability it implements:
//! [`Execution`], [`Verification`], [`Approval`] or [`Compensation`]. Every
//! capability carries a stable name and a has-run latch; the activity reads
//! the latch before invoking and flips it after a successful invocation, so
//! each command runs at most once per workflow run.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Step names
pub const USER_UPDATE: &str = "UserUpdate";
pub const PAYMENT_UPDATE: &str = "PaymentUpdate";

/// Command names
pub const USER_UPDATE_APPROVE: &str = "UserUpdateApprove";
pub const USER_UPDATE_COMPENSATE: &str = "UserUpdateCompensate";
pub const PAYMENT_UPDATE_EXECUTE: &str = "PaymentUpdateExecute";
pub const PAYMENT_UPDATE_VERIFICATION: &str = "PaymentUpdateVerification";
pub const PAYMENT_UPDATE_APPROVE: &str = "PaymentUpdateApprove";
pub const PAYMENT_UPDATE_COMPENSATE: &str = "PaymentUpdateCompensate";

/// Forward action of a step
#[async_trait]
pub trait Execution: Send + Sync {
    fn name(&self) -> &str;
    fn has_run(&self) -> bool;
    fn mark_run(&self);
    async fn execute(&self, ctx: &CancellationToken) -> Result<()>;
}

/// Confirmation that a downstream accepted the forward action
#[async_trait]
pub trait Verification: Send + Sync {
    fn name(&self) -> &str;
    fn has_run(&self) -> bool;
    fn mark_run(&self);
    async fn verify(&self, ctx: &CancellationToken) -> Result<()>;
}

/// Commit signal once every step verified
#[async_trait]
pub trait Approval: Send + Sync {
    fn name(&self) -> &str;
    fn has_run(&self) -> bool;
    fn mark_run(&self);
    async fn approve(&self, ctx: &CancellationToken) -> Result<()>;
}

/// Rollback action paired with the forward action
#[async_trait]
pub trait Compensation: Send + Sync {
    fn name(&self) -> &str;
    fn has_run(&self) -> bool;
    fn mark_run(&self);
    async fn compensate(&self, ctx: &CancellationToken) -> Result<()>;
}

/// Downstream verdict consumed during the Verify phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerificationResponse {
    pub service_name: String,
    pub accepted: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}
