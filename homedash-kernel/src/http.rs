/**
 * API REST HOMEDASH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose les vues courantes des widgets au front-end et reçoit les métriques
 * poussées par les agents (format telegraf).
 *
 * ROUTES :
 * - GET  /health                      : "ok"
 * - GET  /api/dashboards              : liste des dashboards + options globales
 * - GET  /api/dashboard/{slug}        : instances du dashboard (404 si inconnu)
 * - POST /api/telegraf/ingest         : ingestion métriques (x-node-id, x-ingestion-key)
 * - GET  /api/static/icons/{*path}    : icônes servies depuis $STORAGE_DIR/icons
 *
 * Chaque requête est journalisée (méthode, chemin, statut, latence).
 */

use crate::config::DashboardConfig;
use crate::metrics::{map_metrics, MetricPayload};
use crate::registry::SharedViews;
use crate::store::Store;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DashboardConfig>,
    pub views: SharedViews,
    pub metrics: Arc<Store>,
    pub icons_dir: PathBuf,
}

#[derive(Serialize)]
struct DashboardSummary {
    slug: String,
    label: String,
}

#[derive(Serialize)]
struct DashboardsResponse {
    dashboards: Vec<DashboardSummary>,
    message: String,
    custom_script: String,
    custom_css: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/dashboards", get(list_dashboards))
        .route("/api/dashboard/{slug}", get(get_dashboard))
        .route("/api/telegraf/ingest", post(ingest_metrics))
        .route("/api/static/icons/{*path}", get(get_icon))
        .with_state(app_state)
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

// GET /api/dashboards
async fn list_dashboards(State(app): State<AppState>) -> Json<DashboardsResponse> {
    let options = &app.config.config;
    Json(DashboardsResponse {
        dashboards: app
            .config
            .dashboards
            .iter()
            .map(|d| DashboardSummary {
                slug: d.slug.clone(),
                label: d.label.clone(),
            })
            .collect(),
        message: options.message.clone().unwrap_or_default(),
        custom_script: options.custom_script.clone().unwrap_or_default(),
        custom_css: options.custom_css.clone().unwrap_or_default(),
    })
}

// GET /api/dashboard/{slug}
async fn get_dashboard(State(app): State<AppState>, Path(slug): Path<String>) -> Response {
    if app.config.dashboard(&slug).is_none() {
        return json_error(StatusCode::NOT_FOUND, "Dashboard not found");
    }
    Json(json!({ "widgets": app.views.for_dashboard(&slug) })).into_response()
}

// POST /api/telegraf/ingest
async fn ingest_metrics(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(expected) = app.config.ingestion_token() {
        if header_value("x-ingestion-key") != Some(expected) {
            warn!("metrics ingestion rejected: bad ingestion key");
            return json_error(StatusCode::UNAUTHORIZED, "Invalid ingestion key");
        }
    }

    let Some(node) = header_value("x-node-id").filter(|n| !n.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing node id");
    };

    let payload: MetricPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(node, error = %e, "undecodable metrics payload");
            return json_error(StatusCode::BAD_REQUEST, "Invalid metrics payload");
        }
    };

    let record = map_metrics(&payload);
    match app.metrics.set(node, &record) {
        Ok(()) => {
            debug!(node, measurements = payload.metrics.len(), "metrics ingested");
            Json(json!({ "success": true })).into_response()
        }
        Err(e) => {
            error!(node, error = %e, "failed to store metrics");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store metrics")
        }
    }
}

fn content_type(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

// GET /api/static/icons/{*path}
async fn get_icon(State(app): State<AppState>, Path(path): Path<String>) -> Response {
    let relative = PathBuf::from(&path);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        warn!(path = %path, "icon path rejected");
        return json_error(StatusCode::BAD_REQUEST, "Invalid icon path");
    }

    let full = app.icons_dir.join(&relative);
    match tokio::fs::read(&full).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&full))], bytes).into_response(),
        Err(_) => json_error(StatusCode::NOT_FOUND, "Icon not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::metrics::MetricRecord;
    use crate::registry::{ViewRegistry, WidgetInstance};
    use crate::view::View;
    use axum::http::HeaderValue;
    use serde_json::Value;
    use tempfile::{tempdir, TempDir};

    const CONFIG: &str = r#"
version: 1
dashboards:
  - { slug: home, label: Home }
  - { slug: work, label: Work }
config:
  metric_ingestion_token: s3cret
  message: Welcome
"#;

    fn app(dir: &TempDir, yaml: &str) -> AppState {
        let views = ViewRegistry::shared();
        for (dashboard, id) in [("home", "a"), ("work", "b"), ("home", "c")] {
            views.register(WidgetInstance {
                dashboard_id: dashboard.into(),
                kind: "bookmark".into(),
                instance_id: id.into(),
                view: View::new("bookmark"),
            });
        }
        AppState {
            config: Arc::new(parse_config(yaml).unwrap()),
            views,
            metrics: Arc::new(Store::open(dir.path().join("metric.json")).unwrap()),
            icons_dir: dir.path().join("icons"),
        }
    }

    async fn body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(name, value) in pairs {
            map.insert(name, HeaderValue::from_static(value));
        }
        map
    }

    const PAYLOAD: &str = r#"{"metrics":[{"name":"cpu","tags":{"cpu":"cpu-total"},"fields":{"usage_idle":80.0}}]}"#;

    #[tokio::test]
    async fn test_dashboards_listing() {
        let dir = tempdir().unwrap();
        let Json(resp) = list_dashboards(State(app(&dir, CONFIG))).await;
        let value = serde_json::to_value(resp).unwrap();
        assert_eq!(value["dashboards"][1]["slug"], "work");
        assert_eq!(value["message"], "Welcome");
        assert_eq!(value["custom_css"], "", "unset options are empty strings");
        assert_eq!(value["custom_script"], "");
    }

    #[tokio::test]
    async fn test_dashboard_views_are_isolated() {
        let dir = tempdir().unwrap();
        let state = app(&dir, CONFIG);

        let home = body(get_dashboard(State(state.clone()), Path("home".into())).await).await;
        let ids: Vec<_> = home["widgets"].as_array().unwrap().iter().map(|w| w["id"].clone()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(home["widgets"][0]["dashboardId"], "home");

        let missing = get_dashboard(State(state), Path("nope".into())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(missing).await, json!({"error": "Dashboard not found"}));
    }

    #[tokio::test]
    async fn test_ingest_without_node_id_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let state = app(&dir, CONFIG);
        let resp = ingest_metrics(
            State(state.clone()),
            headers(&[("x-ingestion-key", "s3cret")]),
            Bytes::from_static(PAYLOAD.as_bytes()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(resp).await, json!({"error": "Missing node id"}));
        assert_eq!(state.metrics.len(), 0);
    }

    #[tokio::test]
    async fn test_ingest_checks_key_then_payload() {
        let dir = tempdir().unwrap();
        let state = app(&dir, CONFIG);

        let resp = ingest_metrics(
            State(state.clone()),
            headers(&[("x-node-id", "nas"), ("x-ingestion-key", "wrong")]),
            Bytes::from_static(PAYLOAD.as_bytes()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = ingest_metrics(
            State(state.clone()),
            headers(&[("x-node-id", "nas"), ("x-ingestion-key", "s3cret")]),
            Bytes::from_static(b"not json"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(resp).await, json!({"error": "Invalid metrics payload"}));
        assert_eq!(state.metrics.len(), 0);
    }

    #[tokio::test]
    async fn test_ingest_stores_mapped_record() {
        let dir = tempdir().unwrap();
        let state = app(&dir, CONFIG);
        let resp = ingest_metrics(
            State(state.clone()),
            headers(&[("x-node-id", "nas"), ("x-ingestion-key", "s3cret")]),
            Bytes::from_static(PAYLOAD.as_bytes()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(resp).await, json!({"success": true}));

        let record: MetricRecord = state.metrics.get_as("nas").unwrap().unwrap();
        assert_eq!(record.cpu.usage, 20.0);
    }

    #[tokio::test]
    async fn test_ingest_without_configured_token_accepts_any_key() {
        let dir = tempdir().unwrap();
        let state = app(&dir, "version: 1\ndashboards:\n  - { slug: home, label: Home }\n");
        let resp = ingest_metrics(
            State(state),
            headers(&[("x-node-id", "pi")]),
            Bytes::from_static(PAYLOAD.as_bytes()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_icons_are_served_and_traversal_rejected() {
        let dir = tempdir().unwrap();
        let state = app(&dir, CONFIG);
        std::fs::create_dir_all(&state.icons_dir).unwrap();
        std::fs::write(state.icons_dir.join("nas.svg"), "<svg/>").unwrap();

        let resp = get_icon(State(state.clone()), Path("nas.svg".into())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");

        let resp = get_icon(State(state.clone()), Path("../metric.json".into())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get_icon(State(state), Path("missing.png".into())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
