use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use super::backend::{BackendError, Clock, SubscriptionBackend, SystemClock};
use super::domain::{PlanId, PlanRecord, PurchaseReceipt, SessionIdentity, SubscriptionSnapshot};
use super::entitlements::{evaluate, Capability, EntitlementDenied, EntitlementView};

/// Unit published to readers. Replaced whole on every commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementState {
    pub generation: u64,
    pub identity: Option<SessionIdentity>,
    pub snapshot: Option<SubscriptionSnapshot>,
    pub view: EntitlementView,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl EntitlementState {
    fn signed_out(generation: u64) -> Self {
        Self {
            generation,
            identity: None,
            snapshot: None,
            view: EntitlementView::default(),
            refreshed_at: None,
        }
    }
}

/// Result of a refresh attempt that reached the backend successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Committed(Arc<EntitlementState>),
    /// A newer refresh or identity change started before this one finished.
    Superseded,
}

impl RefreshOutcome {
    pub fn committed(&self) -> Option<&Arc<EntitlementState>> {
        match self {
            RefreshOutcome::Committed(state) => Some(state),
            RefreshOutcome::Superseded => None,
        }
    }
}

/// Error raised by the entitlement store.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("subscriptions are only available to employers")]
    NotEmployer,
    #[error(transparent)]
    Denied(#[from] EntitlementDenied),
}

/// Process-wide holder of the subscription snapshot and its derived view.
///
/// Readers receive `Arc` snapshots; only [`refresh`](Self::refresh) and
/// [`set_identity`](Self::set_identity) replace the published state. Each
/// refresh takes a generation number and may only commit while it is still the
/// latest one, so a slow response can never overwrite a newer result.
pub struct EntitlementStore<B, C = SystemClock> {
    backend: Arc<B>,
    clock: C,
    state: watch::Sender<Arc<EntitlementState>>,
    generation: AtomicU64,
    identity: Mutex<Option<SessionIdentity>>,
    plans: OnceCell<Arc<Vec<PlanRecord>>>,
}

impl<B> EntitlementStore<B, SystemClock>
where
    B: SubscriptionBackend + 'static,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_clock(backend, SystemClock)
    }
}

impl<B, C> EntitlementStore<B, C>
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    pub fn with_clock(backend: Arc<B>, clock: C) -> Self {
        let (state, _) = watch::channel(Arc::new(EntitlementState::signed_out(0)));
        Self {
            backend,
            clock,
            state,
            generation: AtomicU64::new(0),
            identity: Mutex::new(None),
            plans: OnceCell::new(),
        }
    }

    pub fn current(&self) -> Arc<EntitlementState> {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> EntitlementView {
        self.state.borrow().view
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EntitlementState>> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.identity_guard().clone()
    }

    /// Gate an action against the currently published view.
    pub fn require(&self, capability: Capability) -> Result<(), SubscriptionError> {
        self.view().require(capability).map_err(SubscriptionError::from)
    }

    /// Reacts to a sign-in, sign-out or account switch.
    pub async fn set_identity(
        &self,
        identity: Option<SessionIdentity>,
    ) -> Result<RefreshOutcome, SubscriptionError> {
        // Identity and generation move together so a refresh that read the old
        // identity always holds an older generation than this change.
        let generation = {
            let mut guard = self.identity_guard();
            if *guard == identity {
                return Ok(RefreshOutcome::Committed(self.current()));
            }
            guard.clone_from(&identity);
            self.next_generation()
        };

        // Never leave the previous account's entitlements visible, even if the fetch below fails.
        let cleared = self.publish_cleared(generation, identity.clone());

        match identity {
            Some(identity) if identity.is_employer() => {
                info!(user = %identity.user_id.0, "employer signed in; refreshing entitlements");
                self.refresh().await
            }
            _ => {
                info!(generation, "entitlements cleared for non-employer session");
                Ok(RefreshOutcome::Committed(cleared))
            }
        }
    }

    fn publish_cleared(
        &self,
        generation: u64,
        identity: Option<SessionIdentity>,
    ) -> Arc<EntitlementState> {
        let mut state = EntitlementState::signed_out(generation);
        state.identity = identity;
        let state = Arc::new(state);
        if self.commit(generation, &state) {
            state
        } else {
            self.current()
        }
    }

    /// Publishes `state` only while `generation` is still the latest one handed out.
    fn commit(&self, generation: u64, state: &Arc<EntitlementState>) -> bool {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = state.clone();
            true
        })
    }

    /// Fetches the snapshot (and the plan catalog on first use) and republishes the view.
    ///
    /// On failure the previously published state stays in place.
    pub async fn refresh(&self) -> Result<RefreshOutcome, SubscriptionError> {
        let (identity, generation) = {
            let guard = self.identity_guard();
            let identity = guard.clone().ok_or(SubscriptionError::NotAuthenticated)?;
            if !identity.is_employer() {
                return Err(SubscriptionError::NotEmployer);
            }
            (identity, self.next_generation())
        };
        debug!(generation, user = %identity.user_id.0, "refresh started");

        let (snapshot, _) = tokio::try_join!(
            async {
                self.backend
                    .current_subscription(&identity)
                    .await
                    .map_err(SubscriptionError::from)
            },
            self.plans(),
        )
        .map_err(|err| {
            warn!(generation, error = %err, "refresh failed; keeping previous entitlements");
            err
        })?;

        let now = self.clock.now();
        let view = evaluate(snapshot.as_ref(), now);
        let next = Arc::new(EntitlementState {
            generation,
            identity: Some(identity),
            snapshot,
            view,
            refreshed_at: Some(now),
        });

        if self.commit(generation, &next) {
            info!(
                generation,
                active = view.has_active_subscription,
                credits = view.credits,
                days_remaining = view.days_remaining,
                "entitlements refreshed"
            );
            Ok(RefreshOutcome::Committed(next))
        } else {
            debug!(generation, "refresh superseded by a newer request");
            Ok(RefreshOutcome::Superseded)
        }
    }

    /// Plan catalog, fetched from the backend once and cached afterwards.
    pub async fn plans(&self) -> Result<Arc<Vec<PlanRecord>>, SubscriptionError> {
        let plans = self
            .plans
            .get_or_try_init(|| async {
                let plans = self.backend.list_plans().await?;
                debug!(count = plans.len(), "plan catalog cached");
                Ok::<_, SubscriptionError>(Arc::new(plans))
            })
            .await?;
        Ok(plans.clone())
    }

    /// Buys a plan for the signed-in employer. The store is not touched; call
    /// [`refresh`](Self::refresh) afterwards to pick up the new subscription.
    pub async fn purchase(&self, plan_id: &PlanId) -> Result<PurchaseReceipt, SubscriptionError> {
        let identity = self.identity().ok_or(SubscriptionError::NotAuthenticated)?;
        if !identity.is_employer() {
            return Err(SubscriptionError::NotEmployer);
        }

        match self.backend.purchase_plan(&identity, plan_id).await {
            Ok(receipt) => {
                info!(plan = %plan_id.0, user = %identity.user_id.0, "plan purchased");
                Ok(receipt)
            }
            Err(err) => {
                warn!(plan = %plan_id.0, error = %err, "plan purchase failed");
                Err(err.into())
            }
        }
    }

    /// Callers hold the identity lock.
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn identity_guard(&self) -> MutexGuard<'_, Option<SessionIdentity>> {
        // The guarded value is replaced whole, so a poisoned lock still holds a usable identity.
        self.identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
