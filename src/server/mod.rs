//! HTTP backend: routes every endpoint to a handler over the shared store.

pub mod error;
pub mod handlers;

use axum::routing::{get, patch};
use axum::Router;
use color_eyre::{eyre::eyre, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::db::Database;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
  pub db: Arc<Database>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(handlers::root))
    .route(
      "/projects",
      get(handlers::get_projects).post(handlers::create_project),
    )
    .route("/tasks", get(handlers::get_tasks).post(handlers::create_task))
    .route("/tasks/{task_id}/status", patch(handlers::update_task_status))
    .route("/tasks/user/{user_id}", get(handlers::get_user_tasks))
    .route("/users", get(handlers::get_users))
    .route("/teams", get(handlers::get_teams))
    .route("/search", get(handlers::search))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, db: Database) -> Result<()> {
  let listener = TcpListener::bind(addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;
  tracing::info!("Starting server on {}", listener.local_addr()?);

  let app = router(AppState { db: Arc::new(db) });
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))?;

  tracing::info!("Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}

/// Start the router on an ephemeral local port; returns the base URL.
#[cfg(test)]
pub async fn spawn_test_server(db: Database) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let app = router(AppState { db: Arc::new(db) });
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  format!("http://{}/", addr)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  async fn server() -> (reqwest::Client, String) {
    let db = Database::open_in_memory().unwrap();
    (reqwest::Client::new(), spawn_test_server(db).await)
  }

  #[tokio::test]
  async fn test_create_project_returns_201() {
    let (http, base) = server().await;

    let response = http
      .post(format!("{}projects", base))
      .json(&json!({"name": "Alpha", "endDate": "2024-05-01"}))
      .send()
      .await
      .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Alpha");
    assert_eq!(body["endDate"], "2024-05-01");
    assert!(body["id"].as_i64().unwrap() > 0);
  }

  #[tokio::test]
  async fn test_store_failure_is_500_with_message() {
    let (http, base) = server().await;

    let response = http
      .post(format!("{}tasks", base))
      .json(&json!({"title": "orphan", "projectId": 42}))
      .send()
      .await
      .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Error creating task : "), "{}", message);
  }

  #[tokio::test]
  async fn test_bad_parameters_use_the_same_error_shape() {
    let (http, base) = server().await;

    let response = http
      .get(format!("{}tasks?projectId=abc", base))
      .send()
      .await
      .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"]
      .as_str()
      .unwrap()
      .starts_with("Error retrieving tasks : "));

    let response = http
      .patch(format!("{}tasks/1/status", base))
      .json(&json!({"status": "Done"}))
      .send()
      .await
      .unwrap();
    assert_eq!(response.status(), 500);
  }

  #[tokio::test]
  async fn test_update_missing_task_is_500() {
    let (http, base) = server().await;

    let response = http
      .patch(format!("{}tasks/7/status", base))
      .json(&json!({"status": "Completed"}))
      .send()
      .await
      .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
      body["message"],
      "Error updating task : No task found with id 7"
    );
  }

  #[tokio::test]
  async fn test_empty_collections_are_ok() {
    let (http, base) = server().await;

    for path in ["projects", "users", "teams", "tasks?projectId=1", "tasks/user/1"] {
      let response = http.get(format!("{}{}", base, path)).send().await.unwrap();
      assert_eq!(response.status(), 200, "{}", path);
      let body: Value = response.json().await.unwrap();
      assert_eq!(body, json!([]), "{}", path);
    }
  }
}
