use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::backend::{Clock, SubscriptionBackend};
use super::domain::{PlanId, SessionIdentity};
use super::entitlements::Capability;
use super::store::{EntitlementStore, RefreshOutcome, SubscriptionError};
use super::views::{EntitlementSummary, PlanSummary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CapabilityCheckRequest {
    pub(crate) capability: Capability,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PurchaseRequest {
    pub(crate) plan_id: String,
}

/// Router builder exposing the entitlement store to local consumers.
pub fn entitlement_router<B, C>(store: Arc<EntitlementStore<B, C>>) -> Router
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/api/v1/entitlements", get(entitlements_handler::<B, C>))
        .route(
            "/api/v1/entitlements/refresh",
            post(refresh_handler::<B, C>),
        )
        .route("/api/v1/entitlements/check", post(check_handler::<B, C>))
        .route(
            "/api/v1/session",
            put(set_session_handler::<B, C>).delete(clear_session_handler::<B, C>),
        )
        .route("/api/v1/subscriptions/plans", get(plans_handler::<B, C>))
        .route(
            "/api/v1/subscriptions/purchase",
            post(purchase_handler::<B, C>),
        )
        .with_state(store)
}

pub(crate) async fn entitlements_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    let summary = EntitlementSummary::from_state(&store.current());
    (StatusCode::OK, axum::Json(summary)).into_response()
}

pub(crate) async fn refresh_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match store.refresh().await {
        Ok(outcome) => outcome_response(&store, outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn check_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
    axum::Json(request): axum::Json<CapabilityCheckRequest>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match store.require(request.capability) {
        Ok(()) => {
            let payload = json!({
                "capability": request.capability,
                "allowed": true,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn set_session_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
    axum::Json(identity): axum::Json<SessionIdentity>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match store.set_identity(Some(identity)).await {
        Ok(outcome) => outcome_response(&store, outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn clear_session_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match store.set_identity(None).await {
        Ok(outcome) => outcome_response(&store, outcome),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn plans_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match store.plans().await {
        Ok(plans) => {
            let summaries: Vec<PlanSummary> = plans.iter().map(PlanSummary::from).collect();
            (StatusCode::OK, axum::Json(summaries)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn purchase_handler<B, C>(
    State(store): State<Arc<EntitlementStore<B, C>>>,
    axum::Json(request): axum::Json<PurchaseRequest>,
) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    let plan_id = PlanId(request.plan_id);
    let receipt = match store.purchase(&plan_id).await {
        Ok(receipt) => receipt,
        Err(err) => return error_response(err),
    };

    // The purchase already went through; a failed refresh only leaves the old view in place.
    let refreshed = match store.refresh().await {
        Ok(RefreshOutcome::Committed(_)) => true,
        Ok(RefreshOutcome::Superseded) => false,
        Err(err) => {
            tracing::warn!(error = %err, "refresh after purchase failed");
            false
        }
    };

    let payload = json!({
        "message": receipt.message,
        "planId": plan_id.0,
        "refreshed": refreshed,
        "entitlements": EntitlementSummary::from_state(&store.current()),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

fn outcome_response<B, C>(store: &EntitlementStore<B, C>, outcome: RefreshOutcome) -> Response
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    match outcome {
        RefreshOutcome::Committed(state) => {
            let summary = EntitlementSummary::from_state(&state);
            (StatusCode::OK, axum::Json(summary)).into_response()
        }
        RefreshOutcome::Superseded => {
            let summary = EntitlementSummary::from_state(&store.current());
            (StatusCode::ACCEPTED, axum::Json(summary)).into_response()
        }
    }
}

pub(crate) fn error_response(err: SubscriptionError) -> Response {
    let status = match &err {
        SubscriptionError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        SubscriptionError::NotEmployer => StatusCode::FORBIDDEN,
        SubscriptionError::Denied(_) => StatusCode::FORBIDDEN,
        SubscriptionError::Backend(backend) if backend.is_rejection() => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SubscriptionError::Backend(_) => StatusCode::BAD_GATEWAY,
    };

    let payload = match &err {
        SubscriptionError::Denied(denied) => json!({
            "error": err.to_string(),
            "capability": denied.capability,
            "reason": denied.reason,
            "allowed": false,
        }),
        SubscriptionError::Backend(backend) => json!({
            "error": backend.user_message(),
        }),
        _ => json!({
            "error": err.to_string(),
        }),
    };

    (status, axum::Json(payload)).into_response()
}

