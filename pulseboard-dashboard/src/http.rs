/**
 * DASHBOARD HTTP API - Read side of the live fleet store
 *
 * ROLE: exposes the current summary, history, connectivity, filtered host
 * lists and per-host latency charts as JSON for UI consumers.
 *
 * ROUTES: /health, /system/health, /status, /summary, /history, /hosts,
 * /hosts/{id}, /hosts/{id}/history, /hosts/{id}/latency, /filter, /public
 *
 * Handlers only read snapshots from the stores; the scheduler is the only
 * writer of fleet state.
 */

use crate::health::{DashboardHealth, HealthTracker};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pulseboard_core::config::LatencyConfig;
use pulseboard_core::filter::{group_counts, visible_hosts};
use pulseboard_core::format::{country_code, format_age, format_bytes, format_speed, format_uptime};
use pulseboard_core::latency::{build_chart, LatencyView};
use pulseboard_core::{
    host_series, DashboardStore, FilterState, FilterStore, HistoryEntry, HostSample, HostSnapshot, LinkState,
    PublicInfo, SmoothingParams, StatusFilter, TelemetrySource,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

#[derive(Serialize)]
struct HostView {
    #[serde(flatten)]
    host: Arc<HostSnapshot>,
    mem_percent: f64,
    swap_percent: f64,
    disk_percent: f64,
    country: Option<String>,
    uptime: String,
    net_in: String,
    net_out: String,
    transfer_in: String,
    transfer_out: String,
    last_seen: Option<String>,
}

fn to_view(h: &Arc<HostSnapshot>, now: DateTime<Utc>) -> HostView {
    HostView {
        host: Arc::clone(h),
        mem_percent: h.mem_percent(),
        swap_percent: h.swap_percent(),
        disk_percent: h.disk_percent(),
        country: country_code(&h.region),
        uptime: format_uptime(h.status.uptime),
        net_in: format_speed(h.status.net_in_speed),
        net_out: format_speed(h.status.net_out_speed),
        transfer_in: format_bytes(h.status.net_in_transfer),
        transfer_out: format_bytes(h.status.net_out_transfer),
        last_seen: format_age(&h.updated_at, now),
    }
}

#[derive(Serialize)]
struct StatusView {
    loading: bool,
    error: Option<String>,
    link: LinkState,
    reconnects: u32,
    server_version: String,
}

#[derive(Serialize)]
struct HostList {
    filter: FilterState,
    groups: BTreeMap<String, usize>,
    hosts: Vec<HostView>,
}

/// Theme switches the UI reads from the public settings
#[derive(Serialize)]
struct DisplayOptions {
    show_tags: bool,
    show_flags: bool,
    show_net_transfer: bool,
    fixed_top_server_name: bool,
}

impl DisplayOptions {
    fn from_info(info: &PublicInfo) -> Self {
        Self {
            show_tags: info.theme_setting("showTag", true),
            show_flags: info.theme_setting("showFlag", true),
            show_net_transfer: info.theme_setting("showNetTransfer", false),
            fixed_top_server_name: info.theme_setting("fixedTopServerName", false),
        }
    }
}

#[derive(Serialize)]
struct PublicView<'a> {
    #[serde(flatten)]
    info: &'a PublicInfo,
    display: DisplayOptions,
}

#[derive(Debug, Default, Deserialize)]
struct HostsQuery {
    status: Option<StatusFilter>,
    group: Option<String>,
    network: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LatencyQuery {
    task: Option<String>,
    #[serde(default)]
    smooth: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub store: DashboardStore,
    pub filter: FilterStore,
    pub source: Arc<dyn TelemetrySource>,
    pub latency: LatencyConfig,
    pub health_tracker: HealthTracker,
    public: Arc<OnceCell<PublicInfo>>,
}

impl AppState {
    pub fn new(
        store: DashboardStore,
        filter: FilterStore,
        source: Arc<dyn TelemetrySource>,
        latency: LatencyConfig,
    ) -> Self {
        Self {
            store,
            filter,
            source,
            latency,
            health_tracker: HealthTracker::new(),
            public: Arc::new(OnceCell::new()),
        }
    }
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "error": message.into() }))).into_response()
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/status", get(get_status))
        .route("/summary", get(get_summary))
        .route("/history", get(get_history))
        .route("/hosts", get(get_hosts))
        .route("/hosts/{id}", get(get_host))
        .route("/hosts/{id}/history", get(get_host_history))
        .route("/hosts/{id}/latency", get(get_latency))
        .route("/filter", get(get_filter).post(set_filter))
        .route("/public", get(get_public))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<DashboardHealth> {
    Json(app.health_tracker.get_health(&app.store.get()))
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    let state = app.store.get();
    Json(StatusView {
        loading: state.loading,
        error: state.error.clone(),
        link: state.link,
        reconnects: state.reconnects,
        server_version: state.server_version.clone(),
    })
}

// GET /summary
async fn get_summary(State(app): State<AppState>) -> Response {
    let state = app.store.get();
    match (&state.summary, &state.error) {
        (Some(summary), _) => Json(Arc::clone(summary)).into_response(),
        (None, Some(error)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, error.clone()),
        (None, None) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "state": "loading" }))).into_response(),
    }
}

// GET /history (newest first)
async fn get_history(State(app): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(app.store.get().history.clone())
}

// GET /hosts?status=&group=&network=
async fn get_hosts(State(app): State<AppState>, Query(q): Query<HostsQuery>) -> Json<HostList> {
    let mut filter = (*app.filter.get()).clone();
    if let Some(status) = q.status {
        filter = filter.with_status(status);
    }
    match q.network {
        Some(true) => filter = filter.with_network_sort(),
        Some(false) => filter.network_sort = false,
        None => {}
    }
    if let Some(group) = q.group {
        filter = filter.with_group(Some(group));
    }

    let state = app.store.get();
    let now = Utc::now();
    let (groups, hosts) = match &state.summary {
        Some(summary) => (
            group_counts(summary, filter.status),
            visible_hosts(summary, &filter).iter().map(|h| to_view(h, now)).collect(),
        ),
        None => (BTreeMap::new(), Vec::new()),
    };
    Json(HostList { filter, groups, hosts })
}

// GET /hosts/{id}
async fn get_host(State(app): State<AppState>, Path(id): Path<String>) -> Result<Json<HostView>, StatusCode> {
    let state = app.store.get();
    let Some(host) = state.summary.as_ref().and_then(|s| s.host(&id)) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(to_view(host, Utc::now())))
}

// GET /hosts/{id}/history (oldest first)
async fn get_host_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HostSample>>, StatusCode> {
    let state = app.store.get();
    if state.summary.as_ref().and_then(|s| s.host(&id)).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(host_series(&state.history, &id)))
}

// GET /hosts/{id}/latency?task=&smooth=
async fn get_latency(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LatencyQuery>,
) -> Response {
    let history = match app.source.ping_history(&id, app.latency.window_hours).await {
        Ok(history) => history,
        Err(e) => {
            warn!("Ping history for {} failed: {}", id, e);
            return error_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };
    if history.is_empty() {
        return Json(json!({ "state": "no_data" })).into_response();
    }

    let view = q.task.filter(|t| !t.is_empty()).map_or(LatencyView::All, LatencyView::Task);
    let smoothing = q.smooth.then(|| SmoothingParams {
        window_size: app.latency.smoothing_window,
        alpha: app.latency.smoothing_alpha,
    });
    match build_chart(&history, &view, smoothing) {
        Some(chart) => Json(json!({ "state": "ready", "chart": chart })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "unknown task"),
    }
}

// GET /filter
async fn get_filter(State(app): State<AppState>) -> Json<FilterState> {
    Json((*app.filter.get()).clone())
}

// POST /filter: network sorting wins over a status in the same body
async fn set_filter(State(app): State<AppState>, Json(body): Json<FilterState>) -> Json<FilterState> {
    let base = FilterState::default().with_group(body.group);
    let next = if body.network_sort { base.with_network_sort() } else { base.with_status(body.status) };
    app.filter.set(next.clone());
    Json(next)
}

// GET /public (fetched once, failures retried on the next call)
async fn get_public(State(app): State<AppState>) -> Response {
    let source = Arc::clone(&app.source);
    match app.public.get_or_try_init(|| async move { source.public_info().await }).await {
        Ok(info) => Json(PublicView { info, display: DisplayOptions::from_info(info) }).into_response(),
        Err(e) => {
            warn!("Public info unavailable: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
