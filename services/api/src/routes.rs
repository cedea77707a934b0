use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use jobmarket::workflows::subscriptions::{
    entitlement_router, Clock, EntitlementStore, SubscriptionBackend,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_entitlement_routes<B, C>(store: Arc<EntitlementStore<B, C>>) -> axum::Router
where
    B: SubscriptionBackend + 'static,
    C: Clock + 'static,
{
    entitlement_router(store)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{demo_plans, InMemorySubscriptionBackend};
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use chrono::{TimeZone, Utc};
    use jobmarket::workflows::subscriptions::FixedClock;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap());
        let backend = Arc::new(InMemorySubscriptionBackend::new(demo_plans(), clock));
        let store = Arc::new(EntitlementStore::with_clock(backend, clock));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_entitlement_routes(store).layer(Extension(state))
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_tracks_startup_flag() {
        let response = app(false)
            .oneshot(request("GET", "/ready", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json_body(response).await["status"], "initializing");

        let response = app(true)
            .oneshot(request("GET", "/ready", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = app(true)
            .oneshot(request("GET", "/metrics", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn purchase_flow_unlocks_worklogs() {
        let router = app(true);

        let response = router
            .clone()
            .oneshot(request(
                "PUT",
                "/api/v1/session",
                Some(json!({ "userId": "emp-3", "role": "employer" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json_body(response).await["statusLabel"], "No subscription");

        let response = router
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/subscriptions/purchase",
                Some(json!({ "planId": "premium" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json_body(response).await;
        assert_eq!(body["message"], "Premium plan activated");
        assert_eq!(body["entitlements"]["remainingLabel"], "30 days remaining");

        let response = router
            .oneshot(request(
                "POST",
                "/api/v1/entitlements/check",
                Some(json!({ "capability": "worklog_access" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
