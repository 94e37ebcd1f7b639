use super::*;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderValue, Request};
use serde_json::json;
use tower::ServiceExt;

fn temp_engine() -> Engine {
    let p = std::env::temp_dir().join(format!(
        "waymark-server-test-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    let engine = Engine::new(p);
    let _ = engine.open().expect("open db");
    engine
}

fn seeded_state() -> Arc<AppState> {
    let engine = temp_engine();
    engine
        .import_markers(&ImportInput {
            items: vec![
                json!({ "id": "s", "kind": "TRACE", "map": "World_L_A", "name": "Start", "x": 0.0, "y": 0.0 }),
                json!({ "id": "a", "kind": "TRACE", "map": "World_L_A", "name": "A", "x": 10.0, "y": 0.0 }),
                json!({ "id": "b", "kind": "TRACE", "map": "World_L_A", "name": "B", "x": 0.0, "y": 10.0 }),
                json!({ "id": "c", "kind": "CUBE", "map": "World_L_A", "name": "C", "x": 10.0, "y": 10.0 }),
            ],
            default_source: None,
        })
        .unwrap();
    Arc::new(AppState::new(engine, MapConfig::default()))
}

async fn select_world_l_a(state: &Arc<AppState>) {
    api_map_select(
        State(state.clone()),
        Json(SelectMapInput {
            map: "World_L_A".into(),
        }),
    )
    .await
    .unwrap();
    api_map_resize(
        State(state.clone()),
        Json(ResizeInput {
            width: 800.0,
            height: 600.0,
        }),
    )
    .await
    .unwrap();
}

#[test]
fn peer_allowlist() {
    assert!(is_allowed_peer_ip("127.0.0.1".parse().unwrap()));
    assert!(is_allowed_peer_ip("::1".parse().unwrap()));
    assert!(is_allowed_peer_ip("100.100.1.2".parse().unwrap()));
    assert!(!is_allowed_peer_ip("100.128.0.1".parse().unwrap()));
    assert!(!is_allowed_peer_ip("192.168.1.10".parse().unwrap()));
}

#[test]
fn cors_accepts_only_local_origins() {
    let ok = |s: &str| is_allowed_local_origin(&HeaderValue::from_str(s).unwrap());
    assert!(ok("http://localhost:5173"));
    assert!(ok("http://127.0.0.1"));
    assert!(!ok("http://localhost.evil.com"));
    assert!(!ok("https://example.com"));
}

#[tokio::test]
async fn unknown_map_is_404_with_placeholder_frame() {
    let state = seeded_state();
    let err = api_map_select(
        State(state.clone()),
        Json(SelectMapInput {
            map: "Nowhere".into(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    let frame = api_map_frame(State(state)).await.unwrap();
    assert!(frame.0.singles.is_empty());
    assert_eq!(frame.0.map.as_deref(), Some("Nowhere"));
}

#[tokio::test]
async fn route_without_start_is_conflict() {
    let state = seeded_state();
    select_world_l_a(&state).await;
    let err = api_route_generate(State(state)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
    assert!(err.1.contains("start marker"));
}

#[tokio::test]
async fn route_generation_and_stepping() {
    let state = seeded_state();
    select_world_l_a(&state).await;
    api_marker_select(
        State(state.clone()),
        Json(MarkerInput {
            id: Some("s".into()),
        }),
    )
    .await
    .unwrap();

    let route = api_route_generate(State(state.clone())).await.unwrap().0;
    let order: Vec<_> = route.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(order, vec!["s", "a", "c", "b"]);
    assert!(route.fixed_start);
    assert_eq!(route.current_index, Some(0));

    let route = api_route_next(State(state.clone())).await.unwrap().0;
    assert_eq!(route.current_index, Some(1));
    let route = api_route_goto(State(state.clone()), Json(GotoInput { index: 3 }))
        .await
        .unwrap()
        .0;
    assert_eq!(route.current_index, Some(3));
    let route = api_route_next(State(state.clone())).await.unwrap().0;
    assert_eq!(route.current_index, Some(3));

    let route = api_route_clear(State(state)).await.unwrap().0;
    assert!(route.steps.is_empty());
}

#[tokio::test]
async fn toggle_done_refreshes_from_store() {
    let state = seeded_state();
    select_world_l_a(&state).await;

    let frame = api_marker_toggle(
        State(state.clone()),
        Json(MarkerInput {
            id: Some("c".into()),
        }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(frame.total_done, 1);

    let listed = state
        .engine
        .list_markers(&MarkerFilter {
            only_remaining: true,
            ..MarkerFilter::default()
        })
        .unwrap();
    assert!(listed.iter().all(|m| m.id != "c"));

    api_marker_select(
        State(state.clone()),
        Json(MarkerInput {
            id: Some("s".into()),
        }),
    )
    .await
    .unwrap();
    let route = api_route_generate(State(state)).await.unwrap().0;
    assert!(route.steps.iter().all(|s| s.id != "c"));
}

#[tokio::test]
async fn direct_done_validates_scope_and_marker() {
    let state = seeded_state();
    let err = api_markers_done(
        State(state.clone()),
        Json(SetDone {
            scope: Scope::Character,
            character_id: None,
            marker_id: "a".into(),
            done: true,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let err = api_markers_done(
        State(state),
        Json(SetDone {
            scope: Scope::Account,
            character_id: None,
            marker_id: "ghost".into(),
            done: true,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn drag_applies_on_tick() {
    let state = seeded_state();
    select_world_l_a(&state).await;
    let before = api_map_frame(State(state.clone())).await.unwrap();
    assert!(before.0.error.is_none());
    let start = state.session().unwrap().viewport_view();

    for ev in [
        InputEvent::PointerDown {
            pointer_id: 7,
            button: 0,
            x: 100.0,
            y: 100.0,
        },
        InputEvent::PointerMove {
            pointer_id: 7,
            x: 130.0,
            y: 90.0,
        },
    ] {
        api_map_input(State(state.clone()), Json(ev)).await.unwrap();
    }
    let pending = state.session().unwrap().viewport_view();
    assert_eq!(pending, start);

    let ticked = api_map_tick(State(state)).await.unwrap().0;
    assert!(ticked.changed);
    assert_eq!(ticked.viewport.pan_x, start.pan_x + 30.0);
    assert_eq!(ticked.viewport.pan_y, start.pan_y - 10.0);
}

#[tokio::test]
async fn router_serves_maps_from_loopback() {
    let engine = temp_engine();
    engine
        .import_markers(&ImportInput {
            items: vec![json!({ "id": "x", "kind": "TRACE", "map": "World_D_A", "name": "X", "x": 1.0, "y": 1.0 })],
            default_source: None,
        })
        .unwrap();
    let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
    let app = build_router(AppState::new(engine, MapConfig::default())).layer(MockConnectInfo(peer));

    let res = app
        .oneshot(Request::get("/api/maps").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let maps: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(maps[0]["name"], "World_D_A");
    assert_eq!(maps[0]["type"], "dark");
}

#[tokio::test]
async fn router_rejects_remote_peer() {
    let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();
    let app = build_router(AppState::new(temp_engine(), MapConfig::default()))
        .layer(MockConnectInfo(peer));
    let res = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn clustering_toggle_changes_frame() {
    let state = seeded_state();
    select_world_l_a(&state).await;
    let frame = api_map_frame(State(state.clone())).await.unwrap().0;
    assert!(frame.clustered);

    let frame = api_map_clustering(
        State(state.clone()),
        Json(ClusteringInput { enabled: false }),
    )
    .await
    .unwrap()
    .0;
    assert!(!frame.clustered);
    assert!(frame.clusters.is_empty());
    assert_eq!(frame.singles.len(), 4);

    let frame = api_map_clustering(State(state), Json(ClusteringInput { enabled: true }))
        .await
        .unwrap()
        .0;
    assert!(frame.clustered);
}

#[tokio::test]
async fn progress_restore_updates_the_session() {
    let state = seeded_state();
    select_world_l_a(&state).await;

    let report = api_backup_progress_import(
        State(state.clone()),
        Json(ProgressImportInput {
            progress: vec![
                json!({ "scope": "ACCOUNT", "markerId": "a", "doneAtMs": 1000 }),
                json!({ "scope": "ACCOUNT", "markerId": "ghost" }),
            ],
        }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!((report.inserted, report.total), (1, 1));

    let frame = api_map_frame(State(state.clone())).await.unwrap().0;
    assert_eq!(frame.total_done, 1);

    let progress = api_backup_progress(State(state)).await.unwrap().0;
    assert_eq!(
        progress,
        vec![ProgressRecord {
            scope: Scope::Account,
            character_id: None,
            marker_id: "a".into(),
            done_at_ms: 1000,
        }]
    );
}
