// src/status_server.rs

use axum::http::StatusCode as AxumStatusCode;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::context::AppContext;
use crate::report_engine::ReportError;
use crate::timecard_client::TimecardError;

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);
        let (status_code, message) = match &self {
            ReportError::Timecard(TimecardError::Browser(_)) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Browser automation failed. Check logs.",
            ),
            ReportError::Timecard(TimecardError::ElementTimeout { .. }) => (
                AxumStatusCode::GATEWAY_TIMEOUT,
                "Timekeeping portal did not render in time.",
            ),
            ReportError::Timecard(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Timekeeping portal returned unusable data.",
            ),
        };
        (status_code, message).into_response()
    }
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/api/report", get(handle_report))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

pub async fn serve(addr: SocketAddr, ctx: Arc<AppContext>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Status server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await
}

async fn handle_status(State(ctx): State<Arc<AppContext>>) -> String {
    let schedule = ctx
        .schedule_time
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "not scheduled".to_string());
    format!(
        "hourcap running since {}\nCurrent time: {}\nDaily report: {}\nChat delivery: {}\n",
        ctx.started_at.format("%Y-%m-%d %H:%M:%S"),
        ctx.engine.clock().now().format("%Y-%m-%d %H:%M:%S"),
        schedule,
        if ctx.bot.is_some() { "configured" } else { "disabled" },
    )
}

async fn handle_report(State(ctx): State<Arc<AppContext>>) -> Result<String, ReportError> {
    info!("Handling /api/report request");
    ctx.engine.generate().await
}
