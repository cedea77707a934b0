use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::workflows::subscriptions::backend::{BackendError, FixedClock, SubscriptionBackend};
use crate::workflows::subscriptions::domain::{
    PlanId, PlanLimits, PlanRecord, PurchaseReceipt, SessionIdentity, SubscriptionSnapshot,
    SubscriptionStatus,
};
use crate::workflows::subscriptions::store::EntitlementStore;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

pub(super) fn clock() -> FixedClock {
    FixedClock(now())
}

pub(super) fn employer() -> SessionIdentity {
    SessionIdentity::employer("emp-001").with_token("token-emp-001")
}

pub(super) fn snapshot(plan_type: &str, days: i64) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        status: SubscriptionStatus::Active,
        plan_type: plan_type.to_string(),
        end_date: Some(now() + Duration::days(days)),
        max_active_jobs: 5,
        max_database_unlocks: 10,
        database_unlocks_used: 4,
        max_location_changes: 1,
        location_changes_used: 0,
        worklog_access_expiry: None,
    }
}

pub(super) fn plans() -> Vec<PlanRecord> {
    vec![
        PlanRecord {
            id: PlanId("basic".to_string()),
            name: "Basic".to_string(),
            price: 499.0,
            duration_days: 30,
            features: vec!["5 active jobs".to_string()],
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
            features: vec!["Work logs".to_string(), "Unlimited unlocks".to_string()],
            limits: PlanLimits {
                max_active_jobs: 20,
                max_database_unlocks: 200,
                max_location_changes: 5,
                worklog_access: true,
            },
        },
    ]
}

struct Gate {
    release: oneshot::Receiver<()>,
    snapshot: Option<SubscriptionSnapshot>,
}

/// Backend double whose responses can be held back to simulate slow fetches.
pub(super) struct ScriptedBackend {
    snapshot: Mutex<Option<SubscriptionSnapshot>>,
    plans: Vec<PlanRecord>,
    fail_current: AtomicBool,
    fail_plans: AtomicBool,
    purchase_rejection: Mutex<Option<String>>,
    gates: Mutex<VecDeque<Gate>>,
    started_tx: mpsc::UnboundedSender<()>,
    started_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
    current_calls: AtomicUsize,
    plan_calls: AtomicUsize,
    purchases: Mutex<Vec<PlanId>>,
}

impl ScriptedBackend {
    pub(super) fn new(snapshot: Option<SubscriptionSnapshot>) -> Self {
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        Self {
            snapshot: Mutex::new(snapshot),
            plans: plans(),
            fail_current: AtomicBool::new(false),
            fail_plans: AtomicBool::new(false),
            purchase_rejection: Mutex::new(None),
            gates: Mutex::new(VecDeque::new()),
            started_tx,
            started_rx: tokio::sync::Mutex::new(started_rx),
            current_calls: AtomicUsize::new(0),
            plan_calls: AtomicUsize::new(0),
            purchases: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn set_snapshot(&self, snapshot: Option<SubscriptionSnapshot>) {
        *self.snapshot.lock().expect("snapshot mutex poisoned") = snapshot;
    }

    pub(super) fn fail_current(&self, fail: bool) {
        self.fail_current.store(fail, Ordering::SeqCst);
    }

    pub(super) fn fail_plans(&self, fail: bool) {
        self.fail_plans.store(fail, Ordering::SeqCst);
    }

    pub(super) fn reject_purchases(&self, message: &str) {
        *self
            .purchase_rejection
            .lock()
            .expect("rejection mutex poisoned") = Some(message.to_string());
    }

    /// Queues a held-back response for the next subscription fetch.
    pub(super) fn hold(&self, snapshot: Option<SubscriptionSnapshot>) -> oneshot::Sender<()> {
        let (release_tx, release) = oneshot::channel();
        self.gates
            .lock()
            .expect("gate mutex poisoned")
            .push_back(Gate { release, snapshot });
        release_tx
    }

    /// Resolves once a held-back fetch has reached the backend.
    pub(super) async fn wait_started(&self) {
        self.started_rx
            .lock()
            .await
            .recv()
            .await
            .expect("backend dropped");
    }

    pub(super) fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub(super) fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub(super) fn purchases(&self) -> Vec<PlanId> {
        self.purchases.lock().expect("purchase mutex poisoned").clone()
    }
}

#[async_trait]
impl SubscriptionBackend for ScriptedBackend {
    async fn list_plans(&self) -> Result<Vec<PlanRecord>, BackendError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_plans.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("catalog offline".to_string()));
        }
        Ok(self.plans.clone())
    }

    async fn current_subscription(
        &self,
        _identity: &SessionIdentity,
    ) -> Result<Option<SubscriptionSnapshot>, BackendError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().expect("gate mutex poisoned").pop_front();
        if let Some(gate) = gate {
            let _ = self.started_tx.send(());
            let _ = gate.release.await;
            return Ok(gate.snapshot);
        }

        if self.fail_current.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }
        Ok(self.snapshot.lock().expect("snapshot mutex poisoned").clone())
    }

    async fn purchase_plan(
        &self,
        _identity: &SessionIdentity,
        plan_id: &PlanId,
    ) -> Result<PurchaseReceipt, BackendError> {
        let rejection = self
            .purchase_rejection
            .lock()
            .expect("rejection mutex poisoned")
            .clone();
        if let Some(message) = rejection {
            return Err(BackendError::Rejected {
                status: 400,
                message,
            });
        }

        self.purchases
            .lock()
            .expect("purchase mutex poisoned")
            .push(plan_id.clone());

        let purchased = snapshot(&plan_id.0, 30);
        self.set_snapshot(Some(purchased.clone()));
        Ok(PurchaseReceipt {
            message: format!("Subscribed to {}", plan_id.0),
            subscription: Some(purchased),
        })
    }
}

pub(super) fn build_store(
    snapshot: Option<SubscriptionSnapshot>,
) -> (
    Arc<EntitlementStore<ScriptedBackend, FixedClock>>,
    Arc<ScriptedBackend>,
) {
    let backend = Arc::new(ScriptedBackend::new(snapshot));
    let store = Arc::new(EntitlementStore::with_clock(backend.clone(), clock()));
    (store, backend)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
