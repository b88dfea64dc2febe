use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState, InMemoryEvidenceSource, TriageEngine};
use crate::routes::with_report_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use report_triage::config::AppConfig;
use report_triage::error::AppError;
use report_triage::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

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

    let evidence = Arc::new(InMemoryEvidenceSource::default());
    let engine = Arc::new(build_engine(
        config.policy.clone(),
        config.triage.clone(),
        evidence,
    ));
    spawn_expiry_sweep(engine.clone(), config.triage.expiry_interval);

    let app = with_report_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "report triage engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically evict corroboration entries past retention.
fn spawn_expiry_sweep(engine: Arc<TriageEngine>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing is stale at startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let engine = engine.clone();
            match tokio::task::spawn_blocking(move || engine.expire_corroboration()).await {
                Ok(Ok(evicted)) => debug!(evicted, "corroboration expiry sweep finished"),
                Ok(Err(error)) => warn!(%error, "corroboration expiry sweep failed"),
                Err(error) => warn!(%error, "corroboration expiry task aborted"),
            }
        }
    });
}
