//! One handler per endpoint. Each performs exactly one store call.
//!
//! Malformed parameters or bodies are reported like store failures, so every
//! error a client sees has the same `{message}` shape.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use super::error::{AppError, AppResult};
use super::AppState;
use crate::api::types::{
  NewProject, NewTask, Project, SearchResults, StatusUpdate, Task, Team, User,
};
use crate::db::Database;

#[derive(Debug, Deserialize)]
pub struct TasksParams {
  #[serde(rename = "projectId")]
  pub project_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  #[serde(default)]
  pub query: String,
}

pub async fn root() -> &'static str {
  "taskboard api"
}

/// Run a store call on the blocking pool; failures and panics become `AppError`.
async fn store<T, F>(state: &AppState, action: &'static str, call: F) -> AppResult<T>
where
  T: Send + 'static,
  F: FnOnce(&Database) -> color_eyre::Result<T> + Send + 'static,
{
  let db = Arc::clone(&state.db);
  tokio::task::spawn_blocking(move || call(&db))
    .await
    .map_err(AppError::during(action))?
    .map_err(AppError::during(action))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// GET /projects
pub async fn get_projects(State(state): State<AppState>) -> AppResult<Json<Vec<Project>>> {
  let projects = store(&state, "retrieving projects", |db| db.list_projects()).await?;
  Ok(Json(projects))
}

/// POST /projects
pub async fn create_project(
  State(state): State<AppState>,
  body: Result<Json<NewProject>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Project>)> {
  const ACTION: &str = "creating project";
  let Json(project) = body.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let project = store(&state, ACTION, move |db| db.create_project(&project)).await?;
  tracing::info!(id = project.id, name = %project.name, "project created");
  Ok((StatusCode::CREATED, Json(project)))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// GET /tasks?projectId={id}
pub async fn get_tasks(
  State(state): State<AppState>,
  params: Result<Query<TasksParams>, QueryRejection>,
) -> AppResult<Json<Vec<Task>>> {
  const ACTION: &str = "retrieving tasks";
  let Query(params) = params.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let project_id = params.project_id;
  let tasks = store(&state, ACTION, move |db| db.list_tasks(project_id)).await?;
  tracing::debug!(project_id = params.project_id, count = tasks.len(), "listed tasks");
  Ok(Json(tasks))
}

/// POST /tasks
pub async fn create_task(
  State(state): State<AppState>,
  body: Result<Json<NewTask>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Task>)> {
  const ACTION: &str = "creating task";
  let Json(task) = body.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let task = store(&state, ACTION, move |db| db.create_task(&task)).await?;
  tracing::info!(id = task.id, project_id = task.project_id, "task created");
  Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /tasks/{task_id}/status
pub async fn update_task_status(
  State(state): State<AppState>,
  task_id: Result<Path<i64>, PathRejection>,
  body: Result<Json<StatusUpdate>, JsonRejection>,
) -> AppResult<Json<Task>> {
  const ACTION: &str = "updating task";
  let Path(task_id) = task_id.map_err(|e| AppError::new(ACTION, e.body_text()))?;
  let Json(update) = body.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let status = update.status;
  let task = store(&state, ACTION, move |db| db.update_task_status(task_id, status)).await?;
  tracing::info!(id = task_id, status = %status, "task status updated");
  Ok(Json(task))
}

/// GET /tasks/user/{user_id}
pub async fn get_user_tasks(
  State(state): State<AppState>,
  user_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<Vec<Task>>> {
  const ACTION: &str = "retrieving user's tasks";
  let Path(user_id) = user_id.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let tasks = store(&state, ACTION, move |db| db.list_user_tasks(user_id)).await?;
  Ok(Json(tasks))
}

// ---------------------------------------------------------------------------
// Users, teams, search
// ---------------------------------------------------------------------------

/// GET /users
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
  let users = store(&state, "retrieving users", |db| db.list_users()).await?;
  Ok(Json(users))
}

/// GET /teams
pub async fn get_teams(State(state): State<AppState>) -> AppResult<Json<Vec<Team>>> {
  let teams = store(&state, "retrieving teams", |db| db.list_teams()).await?;
  Ok(Json(teams))
}

/// GET /search?query={q}
pub async fn search(
  State(state): State<AppState>,
  params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Json<SearchResults>> {
  const ACTION: &str = "performing search";
  let Query(params) = params.map_err(|e| AppError::new(ACTION, e.body_text()))?;

  let query = params.query;
  let results = store(&state, ACTION, move |db| db.search(&query)).await?;
  Ok(Json(results))
}
