use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::cli::ServeArgs;
use crate::config::Settings;
use crate::enrich::{EnrichmentCounts, EnrichmentReport, Enricher};
use crate::store::{DuckDbStore, open_database};
use crate::table::TableName;

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    enricher: Arc<Enricher>,
    allowed_tables: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(conn: Connection, enricher: Enricher, allowed_tables: Vec<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            enricher: Arc::new(enricher),
            allowed_tables: Arc::new(allowed_tables),
        }
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let settings = Settings::from_args(&opts.settings)?;
    let conn = open_database(&settings.db_path)?;
    let enricher = Enricher::from_settings(&settings)?;
    let state = AppState::new(conn, enricher, settings.allowed_tables.clone());

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!(db = %settings.db_path.display(), "Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api_health))
        .route("/enrich/by_npi", post(api_enrich_by_npi))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct EnrichPayload {
    source_table: String,
    destination_table: String,
}

#[derive(Debug, Serialize)]
struct EnrichResponse {
    message: String,
    #[serde(flatten)]
    counts: Option<EnrichmentCounts>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

fn message_response(status: StatusCode, message: String) -> Response {
    (status, Json(MessageResponse { message })).into_response()
}

async fn api_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn api_enrich_by_npi(
    State(st): State<AppState>,
    payload: Result<Json<EnrichPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return message_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let tables = TableName::parse_allowed(&payload.source_table, &st.allowed_tables).and_then(
        |source| {
            TableName::parse_allowed(&payload.destination_table, &st.allowed_tables)
                .map(|destination| (source, destination))
        },
    );
    let (source, destination) = match tables {
        Ok(t) => t,
        Err(e) => return message_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match enrich_tables(&st, &source, &destination).await {
        Ok(report) => {
            let counts = (!report.nothing_to_do()).then_some(report.counts);
            Json(EnrichResponse {
                message: report.message(),
                counts,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(
                source = %source,
                destination = %destination,
                error = %format!("{e:#}"),
                "Enrichment batch failed"
            );
            message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An unexpected error occurred: {e:#}"),
            )
        }
    }
}

async fn enrich_tables(
    st: &AppState,
    source: &TableName,
    destination: &TableName,
) -> anyhow::Result<EnrichmentReport> {
    let mut db = st.db.lock().await;
    let mut store = DuckDbStore::new(&mut db);
    st.enricher.run(&mut store, source, destination).await
}
