//! SQLite store behind the HTTP handlers.
//!
//! Each public method is one store operation. Errors are returned as-is so the
//! handler can prefix them with what it was doing.

pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::api::types::{
  Attachment, Comment, NewProject, NewTask, Priority, Project, SearchResults, Status, Task, Team,
  User,
};

/// Database connection wrapper
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("taskboard").join("taskboard.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  // ==========================================================================
  // Projects
  // ==========================================================================

  pub fn list_projects(&self) -> Result<Vec<Project>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {} FROM projects ORDER BY id", PROJECT_COLUMNS))?;
    let projects = stmt
      .query_map([], project_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(projects)
  }

  pub fn create_project(&self, project: &NewProject) -> Result<Project> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT INTO projects (name, description, start_date, end_date) VALUES (?, ?, ?, ?)",
      params![
        project.name,
        project.description,
        project.start_date,
        project.end_date
      ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, "project created");

    let project = conn.query_row(
      &format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS),
      params![id],
      project_from_row,
    )?;
    Ok(project)
  }

  // ==========================================================================
  // Tasks
  // ==========================================================================

  /// Tasks of a project with author, assignee, comments and attachments.
  pub fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT {} FROM tasks WHERE project_id = ? ORDER BY id",
      TASK_COLUMNS
    ))?;
    let mut tasks = stmt
      .query_map(params![project_id], task_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    for task in &mut tasks {
      include_people(&conn, task)?;
      include_activity(&conn, task)?;
    }
    Ok(tasks)
  }

  /// Tasks the user authored or is assigned to, with author and assignee.
  pub fn list_user_tasks(&self, user_id: i64) -> Result<Vec<Task>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!(
      "SELECT {} FROM tasks WHERE author_user_id = ?1 OR assigned_user_id = ?1 ORDER BY id",
      TASK_COLUMNS
    ))?;
    let mut tasks = stmt
      .query_map(params![user_id], task_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    for task in &mut tasks {
      include_people(&conn, task)?;
    }
    Ok(tasks)
  }

  pub fn create_task(&self, task: &NewTask) -> Result<Task> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT INTO tasks (title, description, status, priority, tags, start_date, due_date,
                          points, project_id, author_user_id, assigned_user_id)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        task.title,
        task.description,
        task.status,
        task.priority,
        task.tags,
        task.start_date,
        task.due_date,
        task.points,
        task.project_id,
        task.author_user_id,
        task.assigned_user_id
      ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, project_id = task.project_id, "task created");

    Ok(find_task(&conn, id)?)
  }

  /// Set a task's status and return the updated task.
  pub fn update_task_status(&self, task_id: i64, status: Status) -> Result<Task> {
    let conn = self.lock()?;
    let changed = conn.execute(
      "UPDATE tasks SET status = ? WHERE id = ?",
      params![status, task_id],
    )?;
    if changed == 0 {
      return Err(eyre!("No task found with id {}", task_id));
    }

    Ok(find_task(&conn, task_id)?)
  }

  // ==========================================================================
  // Users and teams
  // ==========================================================================

  pub fn list_users(&self) -> Result<Vec<User>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY user_id", USER_COLUMNS))?;
    let users = stmt
      .query_map([], user_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
  }

  pub fn list_teams(&self) -> Result<Vec<Team>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT team_id, team_name, product_owner_user_id, project_manager_user_id
       FROM teams ORDER BY team_id",
    )?;
    let teams = stmt
      .query_map([], |row| {
        Ok(Team {
          team_id: row.get(0)?,
          team_name: row.get(1)?,
          product_owner_user_id: row.get(2)?,
          project_manager_user_id: row.get(3)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(teams)
  }

  // ==========================================================================
  // Search
  // ==========================================================================

  /// Case-insensitive substring search over task titles and descriptions,
  /// project names and descriptions, and usernames.
  pub fn search(&self, query: &str) -> Result<SearchResults> {
    let conn = self.lock()?;

    let tasks = {
      let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks
         WHERE instr(lower(title), lower(?1)) > 0
            OR instr(lower(coalesce(description, '')), lower(?1)) > 0
         ORDER BY id",
        TASK_COLUMNS
      ))?;
      let rows = stmt
        .query_map(params![query], task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      rows
    };

    let projects = {
      let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects
         WHERE instr(lower(name), lower(?1)) > 0
            OR instr(lower(coalesce(description, '')), lower(?1)) > 0
         ORDER BY id",
        PROJECT_COLUMNS
      ))?;
      let rows = stmt
        .query_map(params![query], project_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      rows
    };

    let users = {
      let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE instr(lower(username), lower(?1)) > 0 ORDER BY user_id",
        USER_COLUMNS
      ))?;
      let rows = stmt
        .query_map(params![query], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      rows
    };

    Ok(SearchResults {
      tasks: Some(tasks),
      projects: Some(projects),
      users: Some(users),
    })
  }

  // ==========================================================================
  // Seeding
  // ==========================================================================

  /// Run `f` in one transaction; nothing is kept unless it returns `Ok`.
  pub fn batch<T>(&self, f: impl FnOnce(&Batch<'_>) -> Result<T>) -> Result<T> {
    let mut conn = self.lock()?;
    let batch = Batch {
      tx: conn.transaction()?,
    };
    let value = f(&batch)?;
    batch.tx.commit()?;
    Ok(value)
  }
}

/// Inserts inside a [`Database::batch`] transaction. Ids are kept as given.
pub struct Batch<'conn> {
  tx: Transaction<'conn>,
}

impl Batch<'_> {
  pub fn insert_team(&self, team: &Team) -> Result<()> {
    self.tx.execute(
      "INSERT INTO teams (team_id, team_name, product_owner_user_id, project_manager_user_id)
       VALUES (?, ?, ?, ?)",
      params![
        team.team_id,
        team.team_name,
        team.product_owner_user_id,
        team.project_manager_user_id
      ],
    )?;
    Ok(())
  }

  pub fn insert_user(&self, user: &User) -> Result<()> {
    self.tx.execute(
      "INSERT INTO users (user_id, username, email, profile_picture_url, cognito_id, team_id)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        user.user_id,
        user.username,
        user.email,
        user.profile_picture_url,
        user.cognito_id,
        user.team_id
      ],
    )?;
    Ok(())
  }

  pub fn insert_project(&self, project: &Project) -> Result<()> {
    self.tx.execute(
      "INSERT INTO projects (id, name, description, start_date, end_date) VALUES (?, ?, ?, ?, ?)",
      params![
        project.id,
        project.name,
        project.description,
        project.start_date,
        project.end_date
      ],
    )?;
    Ok(())
  }

  pub fn insert_task(&self, task: &Task) -> Result<()> {
    self.tx.execute(
      "INSERT INTO tasks (id, title, description, status, priority, tags, start_date, due_date,
                          points, project_id, author_user_id, assigned_user_id)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        task.id,
        task.title,
        task.description,
        task.status,
        task.priority,
        task.tags,
        task.start_date,
        task.due_date,
        task.points,
        task.project_id,
        task.author_user_id,
        task.assigned_user_id
      ],
    )?;
    Ok(())
  }

  pub fn insert_comment(&self, comment: &Comment) -> Result<()> {
    self.tx.execute(
      "INSERT INTO comments (id, text, task_id, user_id) VALUES (?, ?, ?, ?)",
      params![comment.id, comment.text, comment.task_id, comment.user_id],
    )?;
    Ok(())
  }

  pub fn insert_attachment(&self, attachment: &Attachment) -> Result<()> {
    self.tx.execute(
      "INSERT INTO attachments (id, file_url, file_name, task_id, uploaded_by_id)
       VALUES (?, ?, ?, ?, ?)",
      params![
        attachment.id,
        attachment.file_url,
        attachment.file_name,
        attachment.task_id,
        attachment.uploaded_by_id
      ],
    )?;
    Ok(())
  }
}

// ============================================================================
// Row mapping
// ============================================================================

const PROJECT_COLUMNS: &str = "id, name, description, start_date, end_date";

const TASK_COLUMNS: &str = "id, title, description, status, priority, tags, start_date, \
                            due_date, points, project_id, author_user_id, assigned_user_id";

const USER_COLUMNS: &str =
  "user_id, username, email, profile_picture_url, cognito_id, team_id";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
  Ok(Project {
    id: row.get(0)?,
    name: row.get(1)?,
    description: row.get(2)?,
    start_date: row.get(3)?,
    end_date: row.get(4)?,
  })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
  Ok(Task {
    id: row.get(0)?,
    title: row.get(1)?,
    description: row.get(2)?,
    status: row.get(3)?,
    priority: row.get(4)?,
    tags: row.get(5)?,
    start_date: row.get(6)?,
    due_date: row.get(7)?,
    points: row.get(8)?,
    project_id: row.get(9)?,
    author_user_id: row.get(10)?,
    assigned_user_id: row.get(11)?,
    author: None,
    assignee: None,
    comments: None,
    attachments: None,
  })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
  Ok(User {
    user_id: row.get(0)?,
    username: row.get(1)?,
    email: row.get(2)?,
    profile_picture_url: row.get(3)?,
    cognito_id: row.get(4)?,
    team_id: row.get(5)?,
  })
}

fn find_task(conn: &Connection, id: i64) -> rusqlite::Result<Task> {
  conn.query_row(
    &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
    params![id],
    task_from_row,
  )
}

fn find_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<User>> {
  conn
    .query_row(
      &format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS),
      params![user_id],
      user_from_row,
    )
    .optional()
}

/// Fill in author and assignee.
fn include_people(conn: &Connection, task: &mut Task) -> rusqlite::Result<()> {
  if let Some(author_id) = task.author_user_id {
    task.author = find_user(conn, author_id)?;
  }
  if let Some(assignee_id) = task.assigned_user_id {
    task.assignee = find_user(conn, assignee_id)?;
  }
  Ok(())
}

/// Fill in comments and attachments (empty lists when there are none).
fn include_activity(conn: &Connection, task: &mut Task) -> rusqlite::Result<()> {
  let mut stmt =
    conn.prepare_cached("SELECT id, text, task_id, user_id FROM comments WHERE task_id = ? ORDER BY id")?;
  let comments = stmt
    .query_map(params![task.id], |row| {
      Ok(Comment {
        id: row.get(0)?,
        text: row.get(1)?,
        task_id: row.get(2)?,
        user_id: row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut stmt = conn.prepare_cached(
    "SELECT id, file_url, file_name, task_id, uploaded_by_id FROM attachments
     WHERE task_id = ? ORDER BY id",
  )?;
  let attachments = stmt
    .query_map(params![task.id], |row| {
      Ok(Attachment {
        id: row.get(0)?,
        file_url: row.get(1)?,
        file_name: row.get(2)?,
        task_id: row.get(3)?,
        uploaded_by_id: row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  task.comments = Some(comments);
  task.attachments = Some(attachments);
  Ok(())
}

// Enums are stored by their wire names

impl ToSql for Status {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for Status {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    let text = value.as_str()?;
    Status::parse(text)
      .ok_or_else(|| FromSqlError::Other(format!("unknown task status '{}'", text).into()))
  }
}

impl ToSql for Priority {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(ToSqlOutput::from(self.as_str()))
  }
}

impl FromSql for Priority {
  fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
    let text = value.as_str()?;
    Priority::parse(text)
      .ok_or_else(|| FromSqlError::Other(format!("unknown task priority '{}'", text).into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn seeded() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.batch(|batch| {
      batch.insert_team(&Team {
        team_id: 1,
        team_name: "Core".into(),
        product_owner_user_id: Some(1),
        project_manager_user_id: None,
      })?;
      for (id, name) in [(1, "alice"), (2, "bob")] {
        batch.insert_user(&User {
          user_id: id,
          username: name.into(),
          email: format!("{}@example.com", name),
          profile_picture_url: None,
          cognito_id: format!("cognito-{}", id),
          team_id: 1,
        })?;
      }
      Ok(())
    })
    .unwrap();
    db
  }

  fn new_task(project_id: i64, title: &str) -> NewTask {
    NewTask {
      title: title.into(),
      project_id,
      ..Default::default()
    }
  }

  #[test]
  fn test_create_project_assigns_id() {
    let db = seeded();
    let project = db
      .create_project(&NewProject {
        name: "Alpha".into(),
        ..Default::default()
      })
      .unwrap();
    assert!(project.id > 0);

    let projects = db.list_projects().unwrap();
    assert_eq!(projects, vec![project]);
  }

  #[test]
  fn test_task_requires_existing_project() {
    let db = seeded();
    assert!(db.create_task(&new_task(99, "orphan")).is_err());
  }

  #[test]
  fn test_list_tasks_includes_relations() {
    let db = seeded();
    let project = db
      .create_project(&NewProject {
        name: "Alpha".into(),
        ..Default::default()
      })
      .unwrap();
    let task = db
      .create_task(&NewTask {
        author_user_id: Some(1),
        assigned_user_id: Some(2),
        priority: Some(Priority::High),
        ..new_task(project.id, "Build")
      })
      .unwrap();
    db.batch(|batch| {
      batch.insert_comment(&Comment {
        id: 1,
        text: "looks good".into(),
        task_id: task.id,
        user_id: 2,
      })
    })
    .unwrap();

    let tasks = db.list_tasks(project.id).unwrap();
    assert_eq!(tasks.len(), 1);
    let listed = &tasks[0];
    assert_eq!(listed.priority, Some(Priority::High));
    assert_eq!(listed.author.as_ref().unwrap().username, "alice");
    assert_eq!(listed.assignee.as_ref().unwrap().username, "bob");
    assert_eq!(listed.comments.as_ref().unwrap().len(), 1);
    assert_eq!(listed.attachments.as_deref(), Some(&[][..]));
  }

  #[test]
  fn test_user_tasks_match_author_or_assignee() {
    let db = seeded();
    let project = db
      .create_project(&NewProject {
        name: "Alpha".into(),
        ..Default::default()
      })
      .unwrap();
    db.create_task(&NewTask {
      author_user_id: Some(1),
      ..new_task(project.id, "authored")
    })
    .unwrap();
    db.create_task(&NewTask {
      assigned_user_id: Some(1),
      ..new_task(project.id, "assigned")
    })
    .unwrap();
    db.create_task(&NewTask {
      author_user_id: Some(2),
      ..new_task(project.id, "other")
    })
    .unwrap();

    let titles: Vec<String> = db
      .list_user_tasks(1)
      .unwrap()
      .into_iter()
      .map(|t| t.title)
      .collect();
    assert_eq!(titles, vec!["authored", "assigned"]);
  }

  #[test]
  fn test_update_task_status() {
    let db = seeded();
    let project = db
      .create_project(&NewProject {
        name: "Alpha".into(),
        ..Default::default()
      })
      .unwrap();
    let task = db.create_task(&new_task(project.id, "Build")).unwrap();

    let updated = db.update_task_status(task.id, Status::Completed).unwrap();
    assert_eq!(updated.status, Some(Status::Completed));
    assert_eq!(updated.id, task.id);

    let err = db.update_task_status(999, Status::ToDo).unwrap_err();
    assert!(err.to_string().contains("999"));
  }

  #[test]
  fn test_search_is_case_insensitive_substring() {
    let db = seeded();
    db.create_project(&NewProject {
      name: "Website Redesign".into(),
      ..Default::default()
    })
    .unwrap();
    db.create_project(&NewProject {
      name: "Payroll".into(),
      description: Some("new WEB portal".into()),
      ..Default::default()
    })
    .unwrap();

    let results = db.search("web").unwrap();
    assert_eq!(results.projects.unwrap().len(), 2);
    assert_eq!(results.tasks.unwrap().len(), 0);

    let results = db.search("ALI").unwrap();
    assert_eq!(results.users.unwrap()[0].username, "alice");
  }
}
