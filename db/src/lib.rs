pub mod models;
pub mod test_utils;

use sea_orm::{Database, DatabaseConnection, DbErr};
use std::path::Path;

pub async fn connect() -> DatabaseConnection {
    let path_or_url = common::Config::get().database_path.clone();
    // If it's already a DSN, use it as-is; otherwise treat it as a SQLite file path.
    let url = if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url
    } else {
        // Ensure parent directory exists (SQLite won't create intermediate dirs).
        if let Some(parent) = Path::new(&path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path_or_url}")
    };

    Database::connect(&url)
        .await
        .expect("Failed to connect to database")
}

/// Whether a `DbErr` is a unique-constraint violation from the driver.
///
/// SQLite reports these as execution errors with a "UNIQUE constraint failed"
/// message; callers map them to domain conflicts (`AlreadyCheckedIn`,
/// `CommitFailed`) instead of surfacing a generic storage error.
pub fn is_unique_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) => {
            let msg = runtime.to_string();
            msg.contains("UNIQUE constraint failed") || msg.contains("unique constraint")
        }
        DbErr::RecordNotInserted => true,
        _ => false,
    }
}
