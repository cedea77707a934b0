use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{PlanId, PlanRecord, PurchaseReceipt, SessionIdentity, SubscriptionSnapshot};

/// REST boundary towards the marketplace backend so the store can be exercised in isolation.
#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<PlanRecord>, BackendError>;

    /// `Ok(None)` when the backend has no record for the employer.
    async fn current_subscription(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Option<SubscriptionSnapshot>, BackendError>;

    async fn purchase_plan(
        &self,
        identity: &SessionIdentity,
        plan_id: &PlanId,
    ) -> Result<PurchaseReceipt, BackendError>;
}

/// Error enumeration for backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected backend payload: {0}")]
    Decode(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            BackendError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Rejected { status, .. } if (400..500).contains(status))
    }
}

/// Time source for entitlement evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, used by the offline evaluator and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
