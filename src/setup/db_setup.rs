use crate::models::db_operations::gateway::{Collection, GatewayError, RedbGateway};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn setup_identity_db(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    println!("- Creating 'users' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_login_time TEXT
        )",
        [],
    )?;

    println!("- Creating 'sessions' table...");
    tx.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            revoked INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id)", [])?;

    tx.commit()?;
    Ok(())
}

/// Creates the content store file with one table per collection.
pub fn setup_content_db(path: &Path) -> Result<RedbGateway, SetupError> {
    if let Some(parent_dir) = path.parent() {
        fs::create_dir_all(parent_dir)?;
    }
    let gateway = RedbGateway::open(path)?;
    for collection in Collection::ALL {
        println!("- Table '{}' is ready in Redb", collection.name());
    }
    Ok(gateway)
}
