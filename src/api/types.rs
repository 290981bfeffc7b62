//! Resource records shared by the client and the server as the wire contract.
//!
//! Field names follow the JSON contract (camelCase); optional fields are
//! omitted from the payload when absent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: i64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
  #[serde(rename = "To Do")]
  ToDo,
  #[serde(rename = "Work In Progress")]
  WorkInProgress,
  #[serde(rename = "Under Review")]
  UnderReview,
  #[serde(rename = "Completed")]
  Completed,
}

impl Status {
  pub const ALL: [Status; 4] = [
    Status::ToDo,
    Status::WorkInProgress,
    Status::UnderReview,
    Status::Completed,
  ];

  /// Wire name of the status (e.g. "Work In Progress").
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::ToDo => "To Do",
      Status::WorkInProgress => "Work In Progress",
      Status::UnderReview => "Under Review",
      Status::Completed => "Completed",
    }
  }

  /// Parse a status from its wire name or its compact variant name,
  /// ignoring case and separators ("todo", "Work In Progress", "under-review").
  pub fn parse(s: &str) -> Option<Status> {
    let wanted = compact(s);
    Self::ALL
      .into_iter()
      .find(|status| compact(status.as_str()) == wanted)
  }
}

impl std::fmt::Display for Status {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
  Urgent,
  High,
  Medium,
  Low,
  Backlog,
}

impl Priority {
  pub const ALL: [Priority; 5] = [
    Priority::Urgent,
    Priority::High,
    Priority::Medium,
    Priority::Low,
    Priority::Backlog,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Priority::Urgent => "Urgent",
      Priority::High => "High",
      Priority::Medium => "Medium",
      Priority::Low => "Low",
      Priority::Backlog => "Backlog",
    }
  }

  pub fn parse(s: &str) -> Option<Priority> {
    let wanted = compact(s);
    Self::ALL
      .into_iter()
      .find(|priority| compact(priority.as_str()) == wanted)
  }
}

impl std::fmt::Display for Priority {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Lowercase and drop everything that is not alphanumeric.
fn compact(s: &str) -> String {
  s.chars()
    .filter(|c| c.is_alphanumeric())
    .flat_map(char::to_lowercase)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub user_id: i64,
  pub username: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile_picture_url: Option<String>,
  pub cognito_id: String,
  pub team_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
  pub team_id: i64,
  pub team_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_owner_user_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_manager_user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  pub id: i64,
  #[serde(rename = "fileURL")]
  pub file_url: String,
  pub file_name: String,
  pub task_id: i64,
  pub uploaded_by_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: i64,
  pub text: String,
  pub task_id: i64,
  pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: i64,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<i64>,
  pub project_id: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<i64>,

  // Expanded relations, present only when the endpoint includes them
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<User>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee: Option<User>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comments: Option<Vec<Comment>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tasks: Option<Vec<Task>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub projects: Option<Vec<Project>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub users: Option<Vec<User>>,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Body of `POST /projects`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub end_date: Option<String>,
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<i64>,
  pub project_id: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<i64>,
}

/// Body of `PATCH /tasks/{taskId}/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
  pub status: Status,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_uses_spaced_wire_names() {
    let json = serde_json::to_string(&Status::WorkInProgress).unwrap();
    assert_eq!(json, "\"Work In Progress\"");

    let parsed: Status = serde_json::from_str("\"To Do\"").unwrap();
    assert_eq!(parsed, Status::ToDo);
  }

  #[test]
  fn test_unknown_status_is_rejected() {
    assert!(serde_json::from_str::<Status>("\"Done\"").is_err());
    assert!(serde_json::from_str::<Priority>("\"Critical\"").is_err());
  }

  #[test]
  fn test_status_parse_is_lenient() {
    assert_eq!(Status::parse("todo"), Some(Status::ToDo));
    assert_eq!(Status::parse("under-review"), Some(Status::UnderReview));
    assert_eq!(Status::parse("Work In Progress"), Some(Status::WorkInProgress));
    assert_eq!(Status::parse("done"), None);
    assert_eq!(Priority::parse("backlog"), Some(Priority::Backlog));
  }

  #[test]
  fn test_task_camel_case_fields() {
    let json = r#"{
      "id": 3,
      "title": "Write docs",
      "status": "Under Review",
      "priority": "Low",
      "projectId": 1,
      "assignedUserId": 2,
      "attachments": [
        {"id": 1, "fileURL": "a.png", "fileName": "a", "taskId": 3, "uploadedById": 2}
      ]
    }"#;
    let task: Task = serde_json::from_str(json).unwrap();
    assert_eq!(task.project_id, 1);
    assert_eq!(task.assigned_user_id, Some(2));
    assert_eq!(task.status, Some(Status::UnderReview));
    assert_eq!(task.attachments.as_ref().unwrap()[0].file_url, "a.png");
    assert!(task.author.is_none());
  }

  #[test]
  fn test_new_project_omits_absent_fields() {
    let body = NewProject {
      name: "Alpha".into(),
      ..Default::default()
    };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value, serde_json::json!({"name": "Alpha"}));
  }
}
