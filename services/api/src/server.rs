use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_entitlement_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use jobmarket::config::{AppConfig, BackendConfig};
use jobmarket::error::AppError;
use jobmarket::telemetry;
use jobmarket::workflows::subscriptions::{
    EntitlementStore, HttpSubscriptionBackend, SubscriptionError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(base_url) = args.backend_url.take() {
        config.backend = BackendConfig::new(base_url, config.backend.timeout_secs)?;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend =
        Arc::new(HttpSubscriptionBackend::new(&config.backend).map_err(SubscriptionError::from)?);
    let store = Arc::new(EntitlementStore::new(backend));

    let app = with_entitlement_routes(store)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        backend = %config.backend.base_url,
        "entitlement gateway ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
