use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use waymark_engine::{Engine, UnknownMarker};
use waymark_map::{MapConfig, MapError, MapSession};
use waymark_protocol::{
    FrameView, ImportInput, ImportReport, InputEvent, MapMeta, Marker, MarkerFilter,
    ProgressImportInput, ProgressRecord, RouteView, Scope, SetDone, ViewportView,
};

#[cfg(test)]
mod tests;

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub struct AppState {
    pub engine: Engine,
    pub session: Mutex<MapSession>,
}

impl AppState {
    pub fn new(engine: Engine, config: MapConfig) -> Self {
        Self {
            engine,
            session: Mutex::new(MapSession::new(config)),
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, MapSession>, ApiError> {
        self.session.lock().map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "map session lock poisoned".to_string(),
            )
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/maps", get(api_maps))
        .route("/api/markers", get(api_markers))
        .route("/api/markers/done", post(api_markers_done))
        .route("/api/markers/import", post(api_markers_import))
        .route("/api/backup/markers", get(api_backup_markers))
        .route(
            "/api/backup/progress",
            get(api_backup_progress).post(api_backup_progress_import),
        )
        .route("/api/map/select", post(api_map_select))
        .route("/api/map/filter", post(api_map_filter))
        .route("/api/map/resize", post(api_map_resize))
        .route("/api/map/fit", post(api_map_fit))
        .route("/api/map/zoom-in", post(api_map_zoom_in))
        .route("/api/map/zoom-out", post(api_map_zoom_out))
        .route("/api/map/clustering", post(api_map_clustering))
        .route("/api/map/input", post(api_map_input))
        .route("/api/map/tick", post(api_map_tick))
        .route("/api/map/frame", get(api_map_frame))
        .route("/api/map/marker/select", post(api_marker_select))
        .route("/api/map/marker/toggle", post(api_marker_toggle))
        .route("/api/map/cluster/zoom", post(api_cluster_zoom))
        .route("/api/route", get(api_route))
        .route("/api/route/generate", post(api_route_generate))
        .route("/api/route/next", post(api_route_next))
        .route("/api/route/prev", post(api_route_prev))
        .route("/api/route/goto", post(api_route_goto))
        .route("/api/route/clear", post(api_route_clear))
        .route("/api/route/center", post(api_route_center))
        .with_state(Arc::new(state))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never use `Access-Control-Allow-Origin: *` here; any page in the
        // browser could read and rewrite local progress.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

fn internal(e: anyhow::Error) -> ApiError {
    warn!(error = %format!("{e:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

fn map_error(e: MapError) -> ApiError {
    let status = match &e {
        MapError::NoMapMeta(_) | MapError::UnknownMarker(_) | MapError::UnknownCluster(_) => {
            StatusCode::NOT_FOUND
        }
        MapError::NoMapSelected | MapError::NoStartSelected => StatusCode::CONFLICT,
        MapError::TooManyCandidates { .. }
        | MapError::MissingCoordinates(_)
        | MapError::Config(_) => StatusCode::BAD_REQUEST,
        MapError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %e, "map operation failed");
    }
    (status, e.to_string())
}

fn require_character(scope: Scope, character_id: Option<&str>) -> Result<(), ApiError> {
    if scope == Scope::Character && character_id.map_or(true, |c| c.trim().is_empty()) {
        return Err((
            StatusCode::BAD_REQUEST,
            "character scope requires characterId".to_string(),
        ));
    }
    Ok(())
}

/// Re-reads the session snapshot after a write that bypassed it.
fn resync_session(state: &AppState) -> Result<(), ApiError> {
    let mut session = state.session()?;
    if session.meta().is_some() {
        session.refresh(&state.engine).map_err(map_error)?;
    }
    Ok(())
}

async fn api_maps(State(state): State<Arc<AppState>>) -> ApiResult<Vec<MapMeta>> {
    Ok(Json(state.engine.list_map_meta().map_err(internal)?))
}

async fn api_markers(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<MarkerFilter>,
) -> ApiResult<Vec<Marker>> {
    require_character(filter.scope, filter.character_id.as_deref())?;
    Ok(Json(state.engine.list_markers(&filter).map_err(internal)?))
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

async fn api_markers_done(
    State(state): State<Arc<AppState>>,
    Json(cmd): Json<SetDone>,
) -> ApiResult<Ack> {
    require_character(cmd.scope, cmd.character_id.as_deref())?;
    state.engine.set_done(&cmd).map_err(|e| {
        if e.downcast_ref::<UnknownMarker>().is_some() {
            (StatusCode::NOT_FOUND, e.to_string())
        } else {
            internal(e)
        }
    })?;
    resync_session(&state)?;
    Ok(Json(Ack { ok: true }))
}

async fn api_markers_import(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ImportInput>,
) -> ApiResult<ImportReport> {
    let report = state.engine.import_markers(&input).map_err(internal)?;
    info!(
        inserted = report.inserted,
        updated = report.updated,
        "markers imported"
    );
    resync_session(&state)?;
    Ok(Json(report))
}

async fn api_backup_markers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Marker>> {
    Ok(Json(state.engine.export_markers().map_err(internal)?))
}

async fn api_backup_progress(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<ProgressRecord>> {
    Ok(Json(state.engine.export_progress().map_err(internal)?))
}

async fn api_backup_progress_import(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ProgressImportInput>,
) -> ApiResult<ImportReport> {
    let report = state.engine.import_progress(&input).map_err(internal)?;
    info!(
        inserted = report.inserted,
        updated = report.updated,
        "progress restored"
    );
    resync_session(&state)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct SelectMapInput {
    map: String,
}

async fn api_map_select(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SelectMapInput>,
) -> ApiResult<FrameView> {
    let mut session = state.session()?;
    session
        .select_map(&state.engine, input.map.trim())
        .map_err(map_error)?;
    Ok(Json(session.frame()))
}

async fn api_map_filter(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<MarkerFilter>,
) -> ApiResult<FrameView> {
    require_character(filter.scope, filter.character_id.as_deref())?;
    let mut session = state.session()?;
    session
        .set_filter(&state.engine, filter)
        .map_err(map_error)?;
    Ok(Json(session.frame()))
}

#[derive(Debug, Deserialize)]
struct ResizeInput {
    width: f64,
    height: f64,
}

async fn api_map_resize(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ResizeInput>,
) -> ApiResult<ViewportView> {
    let mut session = state.session()?;
    session.resize(input.width, input.height);
    Ok(Json(session.viewport_view()))
}

async fn api_map_fit(State(state): State<Arc<AppState>>) -> ApiResult<ViewportView> {
    let mut session = state.session()?;
    session.fit().map_err(map_error)?;
    Ok(Json(session.viewport_view()))
}

async fn api_map_zoom_in(State(state): State<Arc<AppState>>) -> ApiResult<ViewportView> {
    let mut session = state.session()?;
    session.zoom_in().map_err(map_error)?;
    Ok(Json(session.viewport_view()))
}

async fn api_map_zoom_out(State(state): State<Arc<AppState>>) -> ApiResult<ViewportView> {
    let mut session = state.session()?;
    session.zoom_out().map_err(map_error)?;
    Ok(Json(session.viewport_view()))
}

#[derive(Debug, Deserialize)]
struct ClusteringInput {
    enabled: bool,
}

async fn api_map_clustering(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ClusteringInput>,
) -> ApiResult<FrameView> {
    let mut session = state.session()?;
    session.set_clustering(input.enabled);
    Ok(Json(session.frame()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewportChange {
    changed: bool,
    viewport: ViewportView,
}

async fn api_map_input(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InputEvent>,
) -> ApiResult<ViewportChange> {
    let mut session = state.session()?;
    let changed = session.input(event);
    Ok(Json(ViewportChange {
        changed,
        viewport: session.viewport_view(),
    }))
}

async fn api_map_tick(State(state): State<Arc<AppState>>) -> ApiResult<ViewportChange> {
    let mut session = state.session()?;
    let changed = session.tick();
    Ok(Json(ViewportChange {
        changed,
        viewport: session.viewport_view(),
    }))
}

async fn api_map_frame(State(state): State<Arc<AppState>>) -> ApiResult<FrameView> {
    Ok(Json(state.session()?.frame()))
}

#[derive(Debug, Deserialize)]
struct MarkerInput {
    #[serde(default)]
    id: Option<String>,
}

async fn api_marker_select(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MarkerInput>,
) -> ApiResult<FrameView> {
    let mut session = state.session()?;
    session
        .select_marker(input.id.as_deref())
        .map_err(map_error)?;
    Ok(Json(session.frame()))
}

async fn api_marker_toggle(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MarkerInput>,
) -> ApiResult<FrameView> {
    let Some(id) = input.id else {
        return Err((StatusCode::BAD_REQUEST, "id is required".to_string()));
    };
    let mut session = state.session()?;
    session
        .toggle_done(&state.engine, &id)
        .map_err(map_error)?;
    Ok(Json(session.frame()))
}

#[derive(Debug, Deserialize)]
struct ClusterInput {
    key: String,
}

async fn api_cluster_zoom(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ClusterInput>,
) -> ApiResult<ViewportView> {
    let mut session = state.session()?;
    session.click_cluster(&input.key).map_err(map_error)?;
    Ok(Json(session.viewport_view()))
}

async fn api_route(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    Ok(Json(state.session()?.route_view()))
}

async fn api_route_generate(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.generate_route().map_err(map_error)?;
    Ok(Json(session.route_view()))
}

async fn api_route_next(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.next();
    Ok(Json(session.route_view()))
}

async fn api_route_prev(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.prev();
    Ok(Json(session.route_view()))
}

#[derive(Debug, Deserialize)]
struct GotoInput {
    index: usize,
}

async fn api_route_goto(
    State(state): State<Arc<AppState>>,
    Json(input): Json<GotoInput>,
) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.goto_index(input.index);
    Ok(Json(session.route_view()))
}

async fn api_route_clear(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.clear_route();
    Ok(Json(session.route_view()))
}

async fn api_route_center(State(state): State<Arc<AppState>>) -> ApiResult<RouteView> {
    let mut session = state.session()?;
    session.recenter();
    Ok(Json(session.route_view()))
}

pub async fn serve(addr: SocketAddr, db_path: PathBuf, config: MapConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(listener, db_path, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    db_path: PathBuf,
    config: MapConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let engine = Engine::new(db_path);
    // Fail fast if sqlite is unavailable.
    engine.open()?;
    let app = build_router(AppState::new(engine, config));
    let addr = listener.local_addr()?;
    info!(%addr, "waymark server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    info!("waymark server stopped");
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    warn!(%ip, "rejected non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(_v6) => false,
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // scheme://host[:port] only
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
