//! Aggregations behind the home dashboard.

use std::collections::BTreeMap;
use std::fmt;

use crate::api::types::{Priority, Project, Status, Task};

/// Derived project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectStatus {
  Active,
  Completed,
}

impl fmt::Display for ProjectStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProjectStatus::Active => f.write_str("Active"),
      ProjectStatus::Completed => f.write_str("Completed"),
    }
  }
}

/// A project is completed once it has an end date.
pub fn project_status(project: &Project) -> ProjectStatus {
  if project.end_date.is_some() {
    ProjectStatus::Completed
  } else {
    ProjectStatus::Active
  }
}

/// Number of tasks per priority. Tasks without a priority are not counted.
pub fn priority_distribution(tasks: &[Task]) -> BTreeMap<Priority, usize> {
  tasks
    .iter()
    .filter_map(|task| task.priority)
    .fold(BTreeMap::new(), |mut counts, priority| {
      *counts.entry(priority).or_insert(0) += 1;
      counts
    })
}

/// Number of projects per derived status.
pub fn status_distribution(projects: &[Project]) -> BTreeMap<ProjectStatus, usize> {
  projects
    .iter()
    .map(project_status)
    .fold(BTreeMap::new(), |mut counts, status| {
      *counts.entry(status).or_insert(0) += 1;
      counts
    })
}

/// One row of the dashboard task grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
  pub title: String,
  pub status: Option<Status>,
  pub priority: Option<Priority>,
  pub due_date: Option<String>,
}

/// Everything the dashboard shows for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
  pub priorities: BTreeMap<Priority, usize>,
  pub project_statuses: BTreeMap<ProjectStatus, usize>,
  pub tasks: Vec<TaskRow>,
}

impl Dashboard {
  pub fn build(tasks: &[Task], projects: &[Project]) -> Self {
    Self {
      priorities: priority_distribution(tasks),
      project_statuses: status_distribution(projects),
      tasks: tasks
        .iter()
        .map(|task| TaskRow {
          title: task.title.clone(),
          status: task.status,
          priority: task.priority,
          due_date: task.due_date.clone(),
        })
        .collect(),
    }
  }
}

impl fmt::Display for Dashboard {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Task Priority Distribution")?;
    for (priority, count) in &self.priorities {
      writeln!(f, "  {:<10} {}", priority, count)?;
    }

    writeln!(f, "\nProject Status")?;
    for (status, count) in &self.project_statuses {
      writeln!(f, "  {:<10} {}", status, count)?;
    }

    writeln!(f, "\nYour Tasks")?;
    writeln!(
      f,
      "  {:<30} {:<18} {:<10} {}",
      "Title", "Status", "Priority", "Due Date"
    )?;
    for row in &self.tasks {
      writeln!(
        f,
        "  {:<30} {:<18} {:<10} {}",
        row.title,
        row.status.map(|s| s.as_str()).unwrap_or("-"),
        row.priority.map(|p| p.as_str()).unwrap_or("-"),
        row.due_date.as_deref().unwrap_or("-"),
      )?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(id: i64, priority: Option<Priority>) -> Task {
    Task {
      id,
      title: format!("task {}", id),
      description: None,
      status: Some(Status::ToDo),
      priority,
      tags: None,
      start_date: None,
      due_date: None,
      points: None,
      project_id: 1,
      author_user_id: None,
      assigned_user_id: None,
      author: None,
      assignee: None,
      comments: None,
      attachments: None,
    }
  }

  fn project(id: i64, end_date: Option<&str>) -> Project {
    Project {
      id,
      name: format!("project {}", id),
      description: None,
      start_date: Some("2024-01-01".into()),
      end_date: end_date.map(String::from),
    }
  }

  #[test]
  fn test_priority_distribution_ignores_order() {
    let expected = BTreeMap::from([(Priority::High, 2), (Priority::Low, 1)]);

    let tasks = vec![
      task(1, Some(Priority::High)),
      task(2, Some(Priority::High)),
      task(3, Some(Priority::Low)),
    ];
    assert_eq!(priority_distribution(&tasks), expected);

    let shuffled = vec![
      task(3, Some(Priority::Low)),
      task(1, Some(Priority::High)),
      task(2, Some(Priority::High)),
    ];
    assert_eq!(priority_distribution(&shuffled), expected);
  }

  #[test]
  fn test_tasks_without_priority_are_skipped() {
    let tasks = vec![task(1, None), task(2, Some(Priority::Urgent))];
    assert_eq!(
      priority_distribution(&tasks),
      BTreeMap::from([(Priority::Urgent, 1)])
    );
    assert!(priority_distribution(&[]).is_empty());
  }

  #[test]
  fn test_project_status_from_end_date() {
    assert_eq!(
      project_status(&project(1, Some("2024-06-01"))),
      ProjectStatus::Completed
    );
    assert_eq!(project_status(&project(2, None)), ProjectStatus::Active);
  }

  #[test]
  fn test_dashboard_build() {
    let tasks = vec![task(1, Some(Priority::Medium))];
    let projects = vec![project(1, None), project(2, None), project(3, Some("2024-02-01"))];

    let dashboard = Dashboard::build(&tasks, &projects);
    assert_eq!(
      dashboard.project_statuses,
      BTreeMap::from([(ProjectStatus::Active, 2), (ProjectStatus::Completed, 1)])
    );
    assert_eq!(dashboard.tasks[0].title, "task 1");

    let rendered = dashboard.to_string();
    assert!(rendered.contains("Medium"));
    assert!(rendered.contains("Completed"));
  }
}
