//! CLI subcommands and their execution.

use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::types::{NewProject, NewTask, Priority, Project, Status, Task, Team, User};
use crate::api::CachedApiClient;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::db::Database;
use crate::seed::SeedData;
use crate::timeline;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Run the HTTP backend
  Serve {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,
  },

  /// Load a JSON snapshot into the database
  Seed {
    file: PathBuf,
    #[arg(long)]
    database: Option<PathBuf>,
  },

  /// List projects
  Projects,

  /// List users
  Users,

  /// List teams
  Teams,

  /// List the tasks of a project
  Tasks { project_id: i64 },

  /// List tasks a user authored or is assigned to
  UserTasks { user_id: i64 },

  /// Search tasks, projects and users
  Search { query: String },

  /// Create a project
  CreateProject {
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    start_date: Option<String>,
    #[arg(long)]
    end_date: Option<String>,
  },

  /// Create a task
  CreateTask(CreateTaskArgs),

  /// Change a task's status
  SetStatus {
    task_id: i64,
    #[arg(value_parser = parse_status)]
    status: Status,
  },

  /// Priority and status overview for a project
  Dashboard { project_id: i64 },

  /// Gantt rows for all projects, or for one project's tasks
  Timeline {
    #[arg(long)]
    project: Option<i64>,
  },
}

#[derive(Args, Debug)]
pub struct CreateTaskArgs {
  pub project_id: i64,
  pub title: String,
  #[arg(long)]
  pub description: Option<String>,
  #[arg(long, value_parser = parse_status)]
  pub status: Option<Status>,
  #[arg(long, value_parser = parse_priority)]
  pub priority: Option<Priority>,
  #[arg(long)]
  pub tags: Option<String>,
  #[arg(long)]
  pub start_date: Option<String>,
  #[arg(long)]
  pub due_date: Option<String>,
  #[arg(long)]
  pub points: Option<i64>,
  #[arg(long)]
  pub author: Option<i64>,
  #[arg(long)]
  pub assignee: Option<i64>,
}

impl From<CreateTaskArgs> for NewTask {
  fn from(args: CreateTaskArgs) -> Self {
    NewTask {
      title: args.title,
      description: args.description,
      status: args.status,
      priority: args.priority,
      tags: args.tags,
      start_date: args.start_date,
      due_date: args.due_date,
      points: args.points,
      project_id: args.project_id,
      author_user_id: args.author,
      assigned_user_id: args.assignee,
    }
  }
}

fn parse_status(s: &str) -> Result<Status, String> {
  Status::parse(s).ok_or_else(|| {
    let names: Vec<_> = Status::ALL.iter().map(|s| s.as_str()).collect();
    format!("unknown status '{}', expected one of: {}", s, names.join(", "))
  })
}

fn parse_priority(s: &str) -> Result<Priority, String> {
  Priority::parse(s).ok_or_else(|| {
    let names: Vec<_> = Priority::ALL.iter().map(|p| p.as_str()).collect();
    format!("unknown priority '{}', expected one of: {}", s, names.join(", "))
  })
}

fn database_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
  match flag.or_else(|| config.server.database.clone()) {
    Some(path) => Ok(path),
    None => Database::default_path(),
  }
}

/// Execute a subcommand.
pub async fn run(command: Command, config: &Config) -> Result<()> {
  match command {
    Command::Serve {
      host,
      port,
      database,
    } => {
      let host = host.unwrap_or_else(|| config.server.host.clone());
      let port = port.unwrap_or(config.server.port);
      let addr = tokio::net::lookup_host((host.as_str(), port))
        .await?
        .next()
        .ok_or_else(|| eyre!("Could not resolve {}:{}", host, port))?;

      let path = database_path(database, config)?;
      info!(path = %path.display(), "opening database");
      let db = Database::open(&path)?;
      crate::server::serve(addr, db).await
    }

    Command::Seed { file, database } => seed(&file, &database_path(database, config)?),

    command => {
      let client = CachedApiClient::new(&config.api.base_url)?;
      query(&client, command).await
    }
  }
}

fn seed(file: &Path, database: &Path) -> Result<()> {
  let data = SeedData::from_file(file)?;
  let db = Database::open(database)?;
  let summary = data.apply(&db)?;
  println!(
    "Seeded {} teams, {} users, {} projects, {} tasks, {} comments, {} attachments into {}",
    summary.teams,
    summary.users,
    summary.projects,
    summary.tasks,
    summary.comments,
    summary.attachments,
    database.display()
  );
  Ok(())
}

/// Commands that talk to a running backend.
async fn query(client: &CachedApiClient, command: Command) -> Result<()> {
  match command {
    Command::Projects => print_projects(&client.projects().await?),
    Command::Users => print_users(&client.users().await?),
    Command::Teams => print_teams(&client.teams().await?),
    Command::Tasks { project_id } => print_tasks(&client.tasks(project_id).await?),
    Command::UserTasks { user_id } => print_tasks(&client.user_tasks(user_id).await?),

    Command::Search { query } => {
      let results = client.search_all(&query).await?;
      println!("Tasks");
      print_tasks(results.tasks.as_deref().unwrap_or_default());
      println!("\nProjects");
      print_projects(results.projects.as_deref().unwrap_or_default());
      println!("\nUsers");
      print_users(results.users.as_deref().unwrap_or_default());
    }

    Command::CreateProject {
      name,
      description,
      start_date,
      end_date,
    } => {
      let project = client
        .create_project
        .run(NewProject {
          name,
          description,
          start_date,
          end_date,
        })
        .await?;
      println!("Created project {} ({})", project.id, project.name);
    }

    Command::CreateTask(args) => {
      let task = client.create_task.run(args.into()).await?;
      println!("Created task {} ({})", task.id, task.title);
    }

    Command::SetStatus { task_id, status } => {
      let task = client.set_task_status(task_id, status).await?;
      println!("Task {} is now {}", task.id, status);
    }

    Command::Dashboard { project_id } => {
      let (tasks, projects) = futures::try_join!(client.tasks(project_id), client.projects())?;
      print!("{}", Dashboard::build(&tasks, &projects));
    }

    Command::Timeline { project } => {
      let rows = match project {
        Some(project_id) => timeline::task_rows(&client.tasks(project_id).await?),
        None => timeline::project_rows(&client.projects().await?),
      };
      for row in rows {
        println!("{}", row);
      }
    }

    Command::Serve { .. } | Command::Seed { .. } => {
      return Err(eyre!("serve and seed do not use the API client"))
    }
  }
  Ok(())
}

fn print_projects(projects: &[Project]) {
  for project in projects {
    println!(
      "{:>4}  {:<30} {} -> {}",
      project.id,
      project.name,
      project.start_date.as_deref().unwrap_or("-"),
      project.end_date.as_deref().unwrap_or("-"),
    );
  }
}

fn print_tasks(tasks: &[Task]) {
  for task in tasks {
    println!(
      "{:>4}  {:<30} {:<18} {:<8} {}",
      task.id,
      task.title,
      task.status.map(|s| s.as_str()).unwrap_or("-"),
      task.priority.map(|p| p.as_str()).unwrap_or("-"),
      task
        .assignee
        .as_ref()
        .map(|u| u.username.as_str())
        .unwrap_or("-"),
    );
  }
}

fn print_users(users: &[User]) {
  for user in users {
    println!("{:>4}  {:<20} {}", user.user_id, user.username, user.email);
  }
}

fn print_teams(teams: &[Team]) {
  for team in teams {
    println!("{:>4}  {}", team.team_id, team.team_name);
  }
}
