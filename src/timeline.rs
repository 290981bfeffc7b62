//! Gantt timeline rows built from projects or from a project's tasks.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;

use crate::api::types::{Project, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
  Project,
  Task,
}

/// One bar on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineItem {
  pub id: String,
  pub name: String,
  pub kind: ItemKind,
  pub start: NaiveDate,
  pub end: NaiveDate,
  /// Percent complete, 0-100
  pub progress: f64,
}

/// Accepts plain dates ("2024-05-01") and ISO timestamps
/// ("2024-05-01T00:00:00.000Z", "2024-05-01T09:30:00").
pub fn parse_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Some(date);
  }
  if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
    return Some(datetime.date_naive());
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .ok()
    .map(|dt| dt.date())
}

fn span(start: Option<&str>, end: Option<&str>) -> Option<(NaiveDate, NaiveDate)> {
  Some((parse_date(start?)?, parse_date(end?)?))
}

/// One row per project with both dates; progress is fixed at 50%.
pub fn project_rows(projects: &[Project]) -> Vec<TimelineItem> {
  projects
    .iter()
    .filter_map(|project| {
      let (start, end) = span(project.start_date.as_deref(), project.end_date.as_deref())?;
      Some(TimelineItem {
        id: format!("Project-{}", project.id),
        name: project.name.clone(),
        kind: ItemKind::Project,
        start,
        end,
        progress: 50.0,
      })
    })
    .collect()
}

/// One row per task with a start and due date; progress is points out of 10.
pub fn task_rows(tasks: &[Task]) -> Vec<TimelineItem> {
  tasks
    .iter()
    .filter_map(|task| {
      let (start, end) = span(task.start_date.as_deref(), task.due_date.as_deref())?;
      Some(TimelineItem {
        id: format!("Task-{}", task.id),
        name: task.title.clone(),
        kind: ItemKind::Task,
        start,
        end,
        progress: task
          .points
          .map(|points| points as f64 / 10.0 * 100.0)
          .unwrap_or(0.0),
      })
    })
    .collect()
}

impl fmt::Display for TimelineItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:<12} {:<30} {} -> {} ({:.0}%)",
      self.id, self.name, self.start, self.end, self.progress
    )
  }
}
