use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use credential_intake::config::AppConfig;
use credential_intake::error::AppError;
use credential_intake::telemetry;
use credential_intake::workflows::application::{intake_router, IntakeServices};
use std::sync::atomic::Ordering;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = Arc::new(IntakeServices::from_config(&config)?);
    let pricing_policy = services.payments.policy();
    let code_ttl_minutes = services.verification.ttl().num_minutes();

    let app = with_operational_routes(intake_router(services))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        pricing_policy = pricing_policy.label(),
        code_ttl_minutes,
        "credential intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
