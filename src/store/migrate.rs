use std::fs;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{Error, Result};

const BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    fn label(&self) -> String {
        format!("{:04}_{}", self.version, self.name)
    }
}

/// Applies every migration not yet recorded in `schema_migrations`, each in
/// its own transaction. Returns the number of migrations applied.
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    conn.execute_batch(BOOKKEEPING)?;

    let mut applied = 0;
    for migration in migrations {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            debug!("Migration {} already applied", migration.label());
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql)
            .map_err(|e| Error::Migration {
                name: migration.label(),
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        info!("Applied migration {}", migration.label());
        applied += 1;
    }

    Ok(applied)
}

/// Reads `NNNN_name.sql` files from `dir`, ordered by version.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let mut migrations = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let (version, name) = parse_file_stem(stem).ok_or_else(|| Error::Migration {
            name: path.display().to_string(),
            reason: "file name must look like NNNN_name.sql".to_string(),
        })?;

        let sql = fs::read_to_string(&path)?;
        migrations.push(Migration::new(version, name, sql));
    }

    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(Error::Migration {
            name: pair[1].label(),
            reason: format!("duplicate version {}", pair[1].version),
        });
    }

    if migrations.is_empty() {
        return Err(Error::Migration {
            name: dir.display().to_string(),
            reason: "no .sql migrations found".to_string(),
        });
    }

    Ok(migrations)
}

fn parse_file_stem(stem: &str) -> Option<(i64, &str)> {
    let (version, name) = stem.split_once('_')?;
    let version = version.parse().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((version, name))
}
