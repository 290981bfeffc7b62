//! Bulk loading of a JSON snapshot into the store.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::api::types::{Attachment, Comment, Project, Task, Team, User};
use crate::db::Database;

/// A snapshot of every resource. Missing sections are treated as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
  pub teams: Vec<Team>,
  pub users: Vec<User>,
  pub projects: Vec<Project>,
  pub tasks: Vec<Task>,
  pub comments: Vec<Comment>,
  pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
  pub teams: usize,
  pub users: usize,
  pub projects: usize,
  pub tasks: usize,
  pub comments: usize,
  pub attachments: usize,
}

impl SeedData {
  pub fn from_file(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read seed file {}: {}", path.display(), e))?;
    serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse seed file {}: {}", path.display(), e))
  }

  /// Insert everything in one transaction, parents before children, keeping
  /// the given ids. On failure the database is left unchanged.
  pub fn apply(&self, db: &Database) -> Result<SeedSummary> {
    db.batch(|batch| {
      for team in &self.teams {
        batch.insert_team(team)?;
      }
      for user in &self.users {
        batch.insert_user(user)?;
      }
      for project in &self.projects {
        batch.insert_project(project)?;
      }
      for task in &self.tasks {
        batch.insert_task(task)?;
      }
      for comment in &self.comments {
        batch.insert_comment(comment)?;
      }
      for attachment in &self.attachments {
        batch.insert_attachment(attachment)?;
      }
      Ok(())
    })?;

    let summary = SeedSummary {
      teams: self.teams.len(),
      users: self.users.len(),
      projects: self.projects.len(),
      tasks: self.tasks.len(),
      comments: self.comments.len(),
      attachments: self.attachments.len(),
    };
    info!(?summary, "seeded database");
    Ok(summary)
  }
}
