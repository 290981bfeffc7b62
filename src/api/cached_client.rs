//! Cached API client that wraps ApiClient with tag-based caching.

use crate::cache::{NoopStorage, ResourceKind, Tag};
use crate::query::{MutationHandle, QueryClient, QueryHandle};

use super::client::ApiClient;
use super::error::ApiError;
use super::types::{NewProject, NewTask, Project, SearchResults, Status, Task, Team, User};

/// Argument of `updateTaskStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
  pub task_id: i64,
  pub status: Status,
}

/// Tags for a task list: one per task, or the blanket tag when the list is empty.
#[allow(clippy::ptr_arg)]
fn task_list_tags(tasks: &Vec<Task>) -> Vec<Tag> {
  Tag::per_id_or_blanket(ResourceKind::Tasks, tasks.iter().map(|task| task.id))
}

/// API client with transparent caching support.
///
/// Every endpoint is a query or mutation handle defined against one shared
/// cache. Queries file their results under tags, mutations invalidate tags,
/// and callers never manage staleness themselves.
#[derive(Clone)]
pub struct CachedApiClient {
  pub get_projects: QueryHandle<(), Vec<Project>>,
  pub create_project: MutationHandle<NewProject, Project>,
  pub get_tasks: QueryHandle<i64, Vec<Task>>,
  pub create_task: MutationHandle<NewTask, Task>,
  pub update_task_status: MutationHandle<StatusChange, Task>,
  pub get_user_tasks: QueryHandle<i64, Vec<Task>>,
  pub get_users: QueryHandle<(), Vec<User>>,
  pub get_teams: QueryHandle<(), Vec<Team>>,
  pub search: QueryHandle<String, SearchResults, NoopStorage>,
}

impl CachedApiClient {
  /// Create a new cached client for the backend at `base_url`.
  pub fn new(base_url: &str) -> Result<Self, ApiError> {
    Ok(Self::with_client(ApiClient::new(base_url)?))
  }

  pub fn with_client(inner: ApiClient) -> Self {
    let queries = QueryClient::new();

    let get_projects = queries.define_query(
      "getProjects",
      |_: &()| String::new(),
      |_: &Vec<Project>| vec![Tag::Blanket(ResourceKind::Projects)],
      {
        let api = inner.clone();
        move |()| {
          let api = api.clone();
          async move { api.get_projects().await }
        }
      },
    );

    let create_project = queries.define_mutation(
      "createProject",
      |_: &NewProject, _: &Project| vec![Tag::Blanket(ResourceKind::Projects)],
      {
        let api = inner.clone();
        move |project: NewProject| {
          let api = api.clone();
          async move { api.create_project(&project).await }
        }
      },
    );

    let get_tasks = queries.define_query(
      "getTasks",
      |project_id: &i64| project_id.to_string(),
      task_list_tags,
      {
        let api = inner.clone();
        move |project_id: i64| {
          let api = api.clone();
          async move { api.get_tasks(project_id).await }
        }
      },
    );

    let create_task = queries.define_mutation(
      "createTask",
      |_: &NewTask, _: &Task| vec![Tag::Blanket(ResourceKind::Tasks)],
      {
        let api = inner.clone();
        move |task: NewTask| {
          let api = api.clone();
          async move { api.create_task(&task).await }
        }
      },
    );

    let update_task_status = queries.define_mutation(
      "updateTaskStatus",
      |change: &StatusChange, _: &Task| vec![Tag::Scoped(ResourceKind::Tasks, change.task_id)],
      {
        let api = inner.clone();
        move |change: StatusChange| {
          let api = api.clone();
          async move { api.update_task_status(change.task_id, change.status).await }
        }
      },
    );

    let get_user_tasks = queries.define_query(
      "getUserTasks",
      |user_id: &i64| user_id.to_string(),
      task_list_tags,
      {
        let api = inner.clone();
        move |user_id: i64| {
          let api = api.clone();
          async move { api.get_user_tasks(user_id).await }
        }
      },
    );

    let get_users = queries.define_query(
      "getUsers",
      |_: &()| String::new(),
      |_: &Vec<User>| vec![Tag::Blanket(ResourceKind::Users)],
      {
        let api = inner.clone();
        move |()| {
          let api = api.clone();
          async move { api.get_users().await }
        }
      },
    );

    let get_teams = queries.define_query(
      "getTeams",
      |_: &()| String::new(),
      |_: &Vec<Team>| vec![Tag::Blanket(ResourceKind::Teams)],
      {
        let api = inner.clone();
        move |()| {
          let api = api.clone();
          async move { api.get_teams().await }
        }
      },
    );

    let search = queries.define_uncached_query("search", |query: &String| query.clone(), {
      let api = inner;
      move |query: String| {
        let api = api.clone();
        async move { api.search(&query).await }
      }
    });

    Self {
      get_projects,
      create_project,
      get_tasks,
      create_task,
      update_task_status,
      get_user_tasks,
      get_users,
      get_teams,
      search,
    }
  }

  // Convenience wrappers returning the data only

  pub async fn projects(&self) -> Result<Vec<Project>, ApiError> {
    Ok(self.get_projects.fetch(()).await?.data)
  }

  pub async fn tasks(&self, project_id: i64) -> Result<Vec<Task>, ApiError> {
    Ok(self.get_tasks.fetch(project_id).await?.data)
  }

  pub async fn user_tasks(&self, user_id: i64) -> Result<Vec<Task>, ApiError> {
    Ok(self.get_user_tasks.fetch(user_id).await?.data)
  }

  pub async fn users(&self) -> Result<Vec<User>, ApiError> {
    Ok(self.get_users.fetch(()).await?.data)
  }

  pub async fn teams(&self) -> Result<Vec<Team>, ApiError> {
    Ok(self.get_teams.fetch(()).await?.data)
  }

  pub async fn search_all(&self, query: &str) -> Result<SearchResults, ApiError> {
    Ok(self.search.fetch(query.to_string()).await?.data)
  }

  pub async fn set_task_status(&self, task_id: i64, status: Status) -> Result<Task, ApiError> {
    self
      .update_task_status
      .run(StatusChange { task_id, status })
      .await
  }
}
