/// Schema for the taskboard store. Idempotent; run on every open.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS teams (
    team_id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_name TEXT NOT NULL,
    product_owner_user_id INTEGER,
    project_manager_user_id INTEGER
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    profile_picture_url TEXT,
    cognito_id TEXT NOT NULL UNIQUE,
    team_id INTEGER NOT NULL REFERENCES teams(team_id)
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    start_date TEXT,
    end_date TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT,
    priority TEXT,
    tags TEXT,
    start_date TEXT,
    due_date TEXT,
    points INTEGER,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    author_user_id INTEGER REFERENCES users(user_id),
    assigned_user_id INTEGER REFERENCES users(user_id)
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_author ON tasks(author_user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assigned_user_id);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    user_id INTEGER NOT NULL REFERENCES users(user_id)
);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_url TEXT NOT NULL,
    file_name TEXT NOT NULL,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    uploaded_by_id INTEGER NOT NULL REFERENCES users(user_id)
);
"#;
