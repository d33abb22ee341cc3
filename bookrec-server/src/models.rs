//! Defines the data structures used for API request and response bodies.

use bookrec_core::{EntityId, IndexStats, Recommendation};
use serde::{Deserialize, Serialize};

use crate::state::RebuildOutcome;

// --- Request Bodies ---

/// Request body for `POST /recommendations`. Exactly one of `description`,
/// `vector` or `book_id` selects the reference.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Use the stored vector of an indexed book; the book itself is excluded.
    #[serde(default)]
    pub book_id: Option<EntityId>,
    #[serde(default)]
    pub exclude_id: Option<EntityId>,
    #[serde(default)]
    pub k: Option<usize>,
}

/// Query string for `GET /recommendations/:book_id`.
#[derive(Debug, Default, Deserialize)]
pub struct KParams {
    pub k: Option<usize>,
}

// --- Response Bodies ---

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
pub struct RebuildAccepted {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub index: IndexStats,
    pub rebuilding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rebuild: Option<RebuildOutcome>,
}
