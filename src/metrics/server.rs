// drbackup/src/metrics/server.rs
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use super::{HealthState, MetricsSink};

pub fn router(sink: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .with_state(sink)
}

/// Serves `/metrics` (Prometheus text format) and `/health` (JSON summary)
/// until the process is stopped.
pub async fn serve(sink: Arc<MetricsSink>, address: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", address, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics server listening");
    axum::serve(listener, router(sink).into_make_service()).await?;
    Ok(())
}

async fn metrics_handler(State(sink): State<Arc<MetricsSink>>) -> String {
    sink.render_prometheus()
}

async fn health_handler(State(sink): State<Arc<MetricsSink>>) -> impl IntoResponse {
    let report = sink.health(Utc::now());

    let http_status = match report.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        // Degraded is flagged in the body but still reports 200.
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
    };

    let body = Json(serde_json::json!({
        "status": report.status,
        "last_backup_time": report.last_backup_time.map(|t| t.to_rfc3339()),
        "last_backup_error": report.last_backup_error,
        "backup_count": report.backup_count,
        "timestamp": Utc::now().to_rfc3339(),
    }));

    (http_status, body)
}

async fn index_handler() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html>\n<html>\n<head><title>drbackup metrics</title></head>\n<body>\n\
         <h1>drbackup metrics server</h1>\n\
         <ul>\n\
         <li><a href=\"/metrics\">/metrics</a> - Prometheus exposition format</li>\n\
         <li><a href=\"/health\">/health</a> - JSON health summary</li>\n\
         </ul>\n</body>\n</html>\n",
    )
}
