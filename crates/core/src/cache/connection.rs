//! Opening the store database.

use std::path::Path;

use tokio_rusqlite::Connection;

use super::migrations;
use crate::Error;

/// Applied to every connection before the schema is touched. Entries cascade
/// from their store, so foreign keys must be on.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// SQLite-backed set of named stores.
///
/// Cloning is cheap: clones share one background connection thread.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

impl CacheDb {
    /// Open (or create) the store database at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening store database");
        Self::prepare(Connection::open(path).await).await
    }

    /// Open a private in-memory database; contents vanish with the last clone.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::prepare(Connection::open_in_memory().await).await
    }

    async fn prepare<E>(opened: Result<Connection, E>) -> Result<Self, Error>
    where
        Error: From<E>,
    {
        let conn = opened?;
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;
        migrations::run(&conn).await?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_rusqlite::rusqlite::types::Value;

    async fn pragma(db: &CacheDb, name: &'static str) -> String {
        let value = db
            .conn
            .call(move |conn| conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get::<_, Value>(0)))
            .await
            .unwrap();
        match value {
            Value::Integer(i) => i.to_string(),
            Value::Text(s) => s,
            other => format!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_has_foreign_keys() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(pragma(&db, "foreign_keys").await, "1");
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let path = std::env::temp_dir().join(format!("gramsevak-conn-{}.sqlite", std::process::id()));
        let db = CacheDb::open(&path).await.unwrap();

        assert_eq!(pragma(&db, "journal_mode").await, "wal");

        drop(db);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
