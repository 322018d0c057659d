//! HTTP endpoints served next to the WebSocket relay.
//!
//! Users and projects live in the browser for now, so the collaborator
//! endpoints return fixed sample data. `/ai/get-result` exposes the AI
//! client to the developer sandbox without going through a room.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::relay::RelayState;

/// A user record as the frontend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Email address.
    pub email: String,
}

/// A project record as the frontend expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ids of collaborating users.
    pub users: Vec<String>,
    /// File tree of the project.
    pub file_tree: serde_json::Map<String, serde_json::Value>,
}

/// Response of `GET /users/all`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    /// All known users.
    pub users: Vec<User>,
}

/// Response of `GET /projects/all`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectsResponse {
    /// All known projects.
    pub projects: Vec<Project>,
}

/// Response of `GET /projects/get-project/{projectId}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectResponse {
    /// The requested project.
    pub project: Project,
}

/// Query of `GET /ai/get-result`.
#[derive(Debug, Deserialize)]
pub struct PromptQuery {
    /// Prompt text.
    #[serde(default)]
    pub prompt: String,
}

/// Builds the HTTP routes.
pub fn routes() -> axum::Router<Arc<RelayState>> {
    axum::Router::new()
        .route("/users/all", axum::routing::get(all_users))
        .route("/projects/all", axum::routing::get(all_projects))
        .route(
            "/projects/get-project/{project_id}",
            axum::routing::get(project_by_id),
        )
        .route("/ai/get-result", axum::routing::get(ai_result))
}

async fn all_users() -> Json<UsersResponse> {
    let users = (1..=3)
        .map(|n| User {
            id: format!("user{n}"),
            email: format!("user{n}@example.com"),
        })
        .collect();
    Json(UsersResponse { users })
}

async fn all_projects() -> Json<ProjectsResponse> {
    Json(ProjectsResponse {
        projects: Vec::new(),
    })
}

async fn project_by_id(Path(project_id): Path<String>) -> Json<ProjectResponse> {
    Json(ProjectResponse {
        project: Project {
            id: project_id,
            name: "Sample Project".to_string(),
            users: vec!["user1".to_string(), "user2".to_string()],
            file_tree: serde_json::Map::new(),
        },
    })
}

async fn ai_result(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<PromptQuery>,
) -> impl IntoResponse {
    tracing::debug!(prompt_len = query.prompt.len(), "AI request over HTTP");
    let envelope = state.ai.generate(&query.prompt).await;
    ([(header::CONTENT_TYPE, "application/json")], envelope)
}
