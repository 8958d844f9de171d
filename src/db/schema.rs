use rusqlite::Connection;

use crate::error::Result;

const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version == 0 {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY CHECK (id LIKE 'task_%'),
                title TEXT NOT NULL,
                description TEXT,
                kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Open',
                priority TEXT NOT NULL DEFAULT 'Medium',
                due_date TEXT,
                assigned_to TEXT CHECK (assigned_to LIKE 'usr_%'),
                lifecycle TEXT NOT NULL DEFAULT 'Active',
                trashed_at TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY CHECK (id LIKE 'usr_%'),
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                lifecycle TEXT NOT NULL DEFAULT 'Active',
                trashed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE CHECK (task_id LIKE 'task_%'),
                depends_on_task_id TEXT NOT NULL CHECK (depends_on_task_id LIKE 'task_%'),
                PRIMARY KEY (task_id, depends_on_task_id)
            );

            CREATE TABLE IF NOT EXISTS task_status_updates (
                task_id TEXT NOT NULL CHECK (task_id LIKE 'task_%'),
                status TEXT NOT NULL,
                updated_by TEXT NOT NULL CHECK (updated_by LIKE 'usr_%'),
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY CHECK (id LIKE 'cmt_%'),
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                author_id TEXT NOT NULL CHECK (author_id LIKE 'usr_%'),
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY CHECK (id LIKE 'att_%'),
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                stored_path TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_assigned ON tasks(assigned_to);
            CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date);
            CREATE INDEX IF NOT EXISTS idx_deps_prerequisite ON task_dependencies(depends_on_task_id);
            CREATE INDEX IF NOT EXISTS idx_status_updates_task ON task_status_updates(task_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_owner ON comments(owner_kind, owner_id);
            CREATE INDEX IF NOT EXISTS idx_attachments_owner ON attachments(owner_kind, owner_id);

            PRAGMA journal_mode = WAL;
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

pub fn open_db(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}
