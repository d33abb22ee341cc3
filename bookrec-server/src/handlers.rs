use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bookrec_core::Query as RecQuery;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};
use crate::models::{KParams, RebuildAccepted, RecommendRequest, RecommendationsResponse, StatsResponse};
use crate::rebuild::spawn_rebuild;
use crate::state::AppState;

fn resolve_k(state: &AppState, k: Option<usize>) -> ServerResult<usize> {
    let k = k.unwrap_or(state.config.default_k);
    if k == 0 || k > state.config.max_k {
        return Err(ServerError::BadRequest(format!("k must be between 1 and {}", state.config.max_k)));
    }
    Ok(k)
}

/// Handler for `POST /recommendations`
#[axum::debug_handler]
pub async fn recommend(
    State(state): State<AppState>,
    Json(payload): Json<RecommendRequest>,
) -> ServerResult<Json<RecommendationsResponse>> {
    let k = resolve_k(&state, payload.k)?;
    let recommender = state.current().await?;

    let recommendations = match (payload.description, payload.vector, payload.book_id) {
        (Some(description), None, None) => {
            debug!(k, "Recommending by description");
            recommender.recommend(&RecQuery::Description(description), payload.exclude_id.as_deref(), k).await?
        }
        (None, Some(vector), None) => {
            debug!(k, dims = vector.len(), "Recommending by vector");
            recommender.recommend(&RecQuery::Vector(vector), payload.exclude_id.as_deref(), k).await?
        }
        (None, None, Some(book_id)) => {
            debug!(k, book_id = %book_id, "Recommending by stored vector");
            recommender.recommend_for_id(&book_id, k).await?
        }
        _ => {
            return Err(ServerError::BadRequest(
                "exactly one of description, vector or book_id is required".to_string(),
            ))
        }
    };
    Ok(Json(RecommendationsResponse { recommendations }))
}

/// Handler for `GET /recommendations/:book_id`
#[axum::debug_handler]
pub async fn recommend_for_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(params): Query<KParams>,
) -> ServerResult<Json<RecommendationsResponse>> {
    let k = resolve_k(&state, params.k)?;
    let recommender = state.current().await?;
    let recommendations = recommender.recommend_for_id(&book_id, k).await?;
    debug!(book_id = %book_id, k, returned = recommendations.len(), "Returning recommendations");
    Ok(Json(RecommendationsResponse { recommendations }))
}

/// Handler for `POST /index/rebuild`
#[axum::debug_handler]
pub async fn rebuild_index(State(state): State<AppState>) -> ServerResult<(StatusCode, Json<RebuildAccepted>)> {
    spawn_rebuild(&state)?;
    info!("Index rebuild accepted");
    Ok((StatusCode::ACCEPTED, Json(RebuildAccepted { status: "accepted" })))
}

/// Handler for `GET /index/stats`
#[axum::debug_handler]
pub async fn index_stats(State(state): State<AppState>) -> ServerResult<Json<StatsResponse>> {
    let recommender = state.current().await?;
    Ok(Json(StatsResponse {
        index: recommender.stats(),
        rebuilding: state.is_rebuilding(),
        last_rebuild: state.last_rebuild().await,
    }))
}
