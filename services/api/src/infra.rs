use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jobmarket::workflows::subscriptions::{
    self, BackendError, Clock, PlanId, PlanLimits, PlanRecord, PurchaseReceipt, SessionIdentity,
    SubscriptionBackend, SubscriptionSnapshot, SubscriptionStatus, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Backend stand-in used by the offline demo. Purchases activate immediately.
pub(crate) struct InMemorySubscriptionBackend<C> {
    plans: Vec<PlanRecord>,
    subscriptions: Mutex<HashMap<UserId, SubscriptionSnapshot>>,
    clock: C,
}

impl<C: Clock> InMemorySubscriptionBackend<C> {
    pub(crate) fn new(plans: Vec<PlanRecord>, clock: C) -> Self {
        Self {
            plans,
            subscriptions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub(crate) fn seed(
        &self,
        user_id: &UserId,
        snapshot: SubscriptionSnapshot,
    ) -> Result<(), BackendError> {
        self.subscriptions()?.insert(user_id.clone(), snapshot);
        Ok(())
    }

    /// Records usage of one database unlock, as the backend would after a worker reveal.
    pub(crate) fn consume_unlock(&self, user_id: &UserId) -> Result<(), BackendError> {
        if let Some(snapshot) = self.subscriptions()?.get_mut(user_id) {
            snapshot.database_unlocks_used = snapshot.database_unlocks_used.saturating_add(1);
        }
        Ok(())
    }

    fn subscriptions(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<UserId, SubscriptionSnapshot>>, BackendError> {
        self.subscriptions
            .lock()
            .map_err(|_| BackendError::Unavailable("subscription table poisoned".to_string()))
    }
}

#[async_trait]
impl<C: Clock> SubscriptionBackend for InMemorySubscriptionBackend<C> {
    async fn list_plans(&self) -> Result<Vec<PlanRecord>, BackendError> {
        Ok(self.plans.clone())
    }

    async fn current_subscription(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Option<SubscriptionSnapshot>, BackendError> {
        Ok(self.subscriptions()?.get(&identity.user_id).cloned())
    }

    async fn purchase_plan(
        &self,
        identity: &SessionIdentity,
        plan_id: &PlanId,
    ) -> Result<PurchaseReceipt, BackendError> {
        let plan = self
            .plans
            .iter()
            .find(|plan| &plan.id == plan_id)
            .ok_or_else(|| BackendError::Rejected {
                status: 400,
                message: "Invalid plan".to_string(),
            })?;

        let end_date = self.clock.now() + Duration::days(i64::from(plan.duration_days));
        let snapshot = SubscriptionSnapshot {
            status: SubscriptionStatus::Active,
            plan_type: plan.id.0.clone(),
            end_date: Some(end_date),
            max_active_jobs: plan.limits.max_active_jobs,
            max_database_unlocks: plan.limits.max_database_unlocks,
            database_unlocks_used: 0,
            max_location_changes: plan.limits.max_location_changes,
            location_changes_used: 0,
            worklog_access_expiry: plan.limits.worklog_access.then_some(end_date),
        };
        self.subscriptions()?
            .insert(identity.user_id.clone(), snapshot.clone());

        Ok(PurchaseReceipt {
            message: format!("{} plan activated", plan.name),
            subscription: Some(snapshot),
        })
    }
}

pub(crate) fn demo_plans() -> Vec<PlanRecord> {
    vec![
        PlanRecord {
            id: PlanId("basic".to_string()),
            name: "Basic".to_string(),
            price: 499.0,
            duration_days: 30,
            features: vec![
                "5 active job posts".to_string(),
                "10 worker unlocks".to_string(),
            ],
            limits: PlanLimits {
                max_active_jobs: 5,
                max_database_unlocks: 10,
                max_location_changes: 1,
                worklog_access: false,
            },
        },
        PlanRecord {
            id: PlanId("premium".to_string()),
            name: "Premium".to_string(),
            price: 1499.0,
            duration_days: 30,
            features: vec![
                "20 active job posts".to_string(),
                "100 worker unlocks".to_string(),
                "Work log tracking".to_string(),
            ],
            limits: PlanLimits {
                max_active_jobs: 20,
                max_database_unlocks: 100,
                max_location_changes: 5,
                worklog_access: true,
            },
        },
    ]
}

/// clap adapter over the library's lenient timestamp parsing.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    subscriptions::parse_timestamp(raw)
        .ok_or_else(|| format!("failed to parse '{raw}' as RFC 3339 or YYYY-MM-DD"))
}
