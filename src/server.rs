use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::db;
use crate::error::AppError;
use crate::models::{ALevelRankedRow, OLevelRankedRow};
use crate::report::{self, ReportParams, ReportRequest, ReportScope, RequestError};

/// Handler state; the pool is owned by `main` and shared by clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health))
        .route("/reports/alevel", get(alevel_report))
        .route("/reports/alevel/card", get(alevel_card))
        .route("/reports/olevel", get(olevel_report))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn alevel_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<Vec<ALevelRankedRow>>, AppError> {
    let request = ReportRequest::from_params(&params)?;
    let rows =
        db::fetch_alevel_marks(&state.pool, &request.class_level, &request.term, request.year)
            .await?;
    let ranked = report::assemble_alevel(&rows, &request.scope, request.tie_break);
    info!(
        class_level = %request.class_level,
        term = %request.term,
        year = request.year,
        rows = ranked.len(),
        "a-level report generated"
    );
    Ok(Json(ranked))
}

async fn olevel_report(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<Json<Vec<OLevelRankedRow>>, AppError> {
    let request = ReportRequest::from_params(&params)?;
    let rows =
        db::fetch_olevel_marks(&state.pool, &request.class_level, &request.term, request.year)
            .await?;
    let ranked = report::assemble_olevel(&rows, &request.scope, request.tie_break);
    info!(
        class_level = %request.class_level,
        term = %request.term,
        year = request.year,
        rows = ranked.len(),
        "o-level report generated"
    );
    Ok(Json(ranked))
}

async fn alevel_card(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = ReportRequest::from_params(&params)?;
    if !matches!(request.scope, ReportScope::Student(_)) {
        return Err(RequestError::MissingStudentId.into());
    }

    let rows =
        db::fetch_alevel_marks(&state.pool, &request.class_level, &request.term, request.year)
            .await?;
    let ranked = report::assemble_alevel(&rows, &request.scope, request.tie_break);
    let card = report::build_report_card(&request.term, request.year, &ranked);

    Ok(([(CONTENT_TYPE, "text/markdown; charset=utf-8")], card))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!("Failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_state() -> AppState {
        let pool = PgPool::connect_lazy("postgres://localhost/term_report").unwrap();
        AppState { pool }
    }

    fn params(term: Option<&str>, stream: Option<&str>, student_id: Option<i64>) -> ReportParams {
        ReportParams {
            year: Some(2024),
            term: term.map(str::to_string),
            class_level: Some("S5".to_string()),
            stream: stream.map(str::to_string),
            student_id,
            tie_break: None,
        }
    }

    #[tokio::test]
    async fn alevel_report_rejects_missing_term() {
        let query = Query(params(None, Some("Arts"), None));
        let result = alevel_report(State(lazy_state()), query).await;
        assert!(matches!(result, Err(AppError::BadRequest(RequestError::MissingTerm))));
    }

    #[tokio::test]
    async fn olevel_report_rejects_missing_stream() {
        let query = Query(params(Some("1"), None, None));
        let result = olevel_report(State(lazy_state()), query).await;
        assert!(matches!(result, Err(AppError::BadRequest(RequestError::MissingStream))));
    }

    #[tokio::test]
    async fn card_requires_a_student() {
        let query = Query(params(Some("1"), Some("Arts"), None));
        let result = alevel_card(State(lazy_state()), query).await;
        assert!(matches!(result, Err(AppError::BadRequest(RequestError::MissingStudentId))));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        assert_eq!(health().await, "ok");
    }
}
