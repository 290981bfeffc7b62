use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use super::error::ApiError;
use super::types::{
  ErrorBody, NewProject, NewTask, Project, SearchResults, Status, StatusUpdate, Task, Team, User,
};

/// HTTP client for the taskboard backend.
///
/// Issues one request per call, with no caching; see `CachedApiClient` for
/// the cached layer.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(base_url: &str) -> Result<Self, ApiError> {
    // Relative joins drop the last path segment unless the base ends in '/'
    let base_url = if base_url.ends_with('/') {
      Url::parse(base_url)?
    } else {
      Url::parse(&format!("{}/", base_url))?
    };

    let http = reqwest::Client::builder()
      .user_agent(concat!("taskboard/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { http, base_url })
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    Ok(self.base_url.join(path)?)
  }

  async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    debug!(%method, %url, "request");
    let mut request = self.http.request(method, url);
    if let Some(body) = body {
      request = request.json(body);
    }

    let response = request.send().await?;
    decode(response).await
  }

  async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
    self.send::<(), T>(Method::GET, url, None).await
  }

  /// List all projects
  pub async fn get_projects(&self) -> Result<Vec<Project>, ApiError> {
    self.get(self.url("projects")?).await
  }

  /// Create a project; the server assigns its id
  pub async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
    self
      .send(Method::POST, self.url("projects")?, Some(project))
      .await
  }

  /// List a project's tasks with author, assignee, comments and attachments
  pub async fn get_tasks(&self, project_id: i64) -> Result<Vec<Task>, ApiError> {
    let mut url = self.url("tasks")?;
    url
      .query_pairs_mut()
      .append_pair("projectId", &project_id.to_string());
    self.get(url).await
  }

  pub async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
    self.send(Method::POST, self.url("tasks")?, Some(task)).await
  }

  /// Set a task's status, returning the updated task
  pub async fn update_task_status(&self, task_id: i64, status: Status) -> Result<Task, ApiError> {
    let url = self.url(&format!("tasks/{}/status", task_id))?;
    self
      .send(Method::PATCH, url, Some(&StatusUpdate { status }))
      .await
  }

  /// Tasks a user authored or is assigned to
  pub async fn get_user_tasks(&self, user_id: i64) -> Result<Vec<Task>, ApiError> {
    self
      .get(self.url(&format!("tasks/user/{}", user_id))?)
      .await
  }

  pub async fn get_users(&self) -> Result<Vec<User>, ApiError> {
    self.get(self.url("users")?).await
  }

  pub async fn get_teams(&self) -> Result<Vec<Team>, ApiError> {
    self.get(self.url("teams")?).await
  }

  pub async fn search(&self, query: &str) -> Result<SearchResults, ApiError> {
    let mut url = self.url("search")?;
    url.query_pairs_mut().append_pair("query", query);
    self.get(url).await
  }
}

/// Decode a success body, or turn an error status into `ApiError::Status`
/// carrying the server's `{message}` when it sent one.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response.json::<T>().await?);
  }

  let text = response.text().await.unwrap_or_default();
  let message = match serde_json::from_str::<ErrorBody>(&text) {
    Ok(body) => body.message,
    Err(_) if text.is_empty() => status
      .canonical_reason()
      .unwrap_or("Unknown error")
      .to_string(),
    Err(_) => text,
  };

  Err(ApiError::Status {
    status: status.as_u16(),
    message,
  })
}
