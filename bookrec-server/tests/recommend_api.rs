use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bookrec_core::{Embedder, Entity, HashingEmbedder};
use bookrec_server::config::ServerConfig;
use bookrec_server::error::ServerError;
use bookrec_server::handlers;
use bookrec_server::models::{KParams, RecommendRequest};
use bookrec_server::rebuild::spawn_rebuild;
use bookrec_server::state::AppState;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn write_catalog(path: &FsPath, books: &[(&str, &str)]) {
    let lines: Vec<String> = books
        .iter()
        .map(|(id, description)| serde_json::to_string(&Entity::new(*id, *description)).unwrap())
        .collect();
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn test_state(data_path: PathBuf, source_path: Option<PathBuf>) -> AppState {
    let config = ServerConfig { data_path, source_path, ..ServerConfig::default() };
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(HashingEmbedder::DEFAULT_DIMENSIONS).unwrap());
    AppState::new(config, embedder)
}

fn status_of(err: ServerError) -> StatusCode {
    err.into_response().status()
}

const BOOKS: &[(&str, &str)] = &[("A", "space opera"), ("B", "space adventure"), ("C", "cooking recipes")];

async fn built_state() -> (tempfile::TempDir, AppState) {
    let dir = tempdir().unwrap();
    let source = dir.path().join("books.jsonl");
    write_catalog(&source, BOOKS);
    let state = test_state(dir.path().join("data"), Some(source));
    spawn_rebuild(&state).unwrap().await.unwrap();
    (dir, state)
}

fn ids(response: &Json<bookrec_server::models::RecommendationsResponse>) -> Vec<&str> {
    response.recommendations.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_routes_report_unavailable_before_first_build() {
    let dir = tempdir().unwrap();
    let state = test_state(dir.path().to_path_buf(), None);
    assert!(!state.load_on_startup().await);

    let err = handlers::recommend(
        State(state.clone()),
        Json(RecommendRequest { description: Some("space".into()), ..Default::default() }),
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);

    let err = handlers::index_stats(State(state.clone())).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);

    // no source configured
    let err = handlers::rebuild_index(State(state)).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommend_by_book_id_and_description() {
    let (_dir, state) = built_state().await;

    let by_path = handlers::recommend_for_book(State(state.clone()), Path("A".to_string()), Query(KParams { k: Some(2) }))
        .await
        .unwrap();
    assert_eq!(ids(&by_path), vec!["B", "C"]);

    let by_body = handlers::recommend(
        State(state.clone()),
        Json(RecommendRequest { book_id: Some("A".into()), k: Some(2), ..Default::default() }),
    )
    .await
    .unwrap();
    assert_eq!(ids(&by_body), vec!["B", "C"]);

    let by_text = handlers::recommend(
        State(state.clone()),
        Json(RecommendRequest { description: Some("space opera".into()), exclude_id: Some("A".into()), k: Some(1), ..Default::default() }),
    )
    .await
    .unwrap();
    assert_eq!(ids(&by_text), vec!["B"]);

    let unknown = handlers::recommend_for_book(State(state.clone()), Path("Z".to_string()), Query(KParams::default()))
        .await
        .unwrap();
    assert!(unknown.recommendations.is_empty());

    let blank = handlers::recommend(
        State(state),
        Json(RecommendRequest { description: Some("   ".into()), ..Default::default() }),
    )
    .await
    .unwrap();
    assert!(blank.recommendations.is_empty());
}

#[tokio::test]
async fn test_request_validation() {
    let (_dir, state) = built_state().await;

    for request in [
        RecommendRequest::default(),
        RecommendRequest { description: Some("a".into()), book_id: Some("A".into()), ..Default::default() },
        RecommendRequest { description: Some("a".into()), k: Some(0), ..Default::default() },
        RecommendRequest { description: Some("a".into()), k: Some(101), ..Default::default() },
        RecommendRequest { vector: Some(vec![1.0, 2.0]), ..Default::default() },
    ] {
        let err = handlers::recommend(State(state.clone()), Json(request)).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_rebuild_swaps_in_new_index_and_rejects_concurrent_rebuilds() {
    let (dir, state) = built_state().await;

    let stats = handlers::index_stats(State(state.clone())).await.unwrap();
    assert_eq!(stats.index.count, 3);
    assert!(stats.last_rebuild.as_ref().and_then(|o| o.report.as_ref()).is_some());

    let mut grown: Vec<(&str, &str)> = BOOKS.to_vec();
    grown.push(("D", "space station mystery"));
    write_catalog(&dir.path().join("books.jsonl"), &grown);

    let handle = spawn_rebuild(&state).unwrap();
    let err = handlers::rebuild_index(State(state.clone())).await.unwrap_err();
    assert_eq!(status_of(err), StatusCode::CONFLICT);
    handle.await.unwrap();

    assert!(!state.is_rebuilding());
    let stats = handlers::index_stats(State(state.clone())).await.unwrap();
    assert_eq!(stats.index.count, 4);

    let (status, _) = handlers::rebuild_index(State(state.clone())).await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_startup_loads_completed_build() {
    let (dir, _state) = built_state().await;
    let restarted = test_state(dir.path().join("data"), None);
    assert!(restarted.load_on_startup().await);
    let stats = handlers::index_stats(State(restarted)).await.unwrap();
    assert_eq!(stats.index.count, 3);
}
