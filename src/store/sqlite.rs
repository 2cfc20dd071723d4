//! SQLite-backed `MetadataStore` — the crate's one persistent,
//! production-shaped metadata backend (a real DynamoDB/Redis client
//! is out of scope, but the crate still needs something runnable): an
//! `r2d2` connection pool, migrations run once at construction, and sync
//! helper methods called directly from the `async_trait` methods (no
//! `spawn_blocking` indirection).

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{MetadataStore, Page, Precondition, StoreError, StoreResult};

pub struct SqliteMetadataStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteMetadataStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager).map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| StoreError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool.get().map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get_sync(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        conn.query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn put_if_sync(&self, key: &str, value: Vec<u8>, precondition: Precondition) -> StoreResult<()> {
        let conn = self.conn()?;
        match precondition {
            Precondition::Absent => {
                let rows = conn
                    .execute("INSERT OR IGNORE INTO metadata (key, value) VALUES (?1, ?2)", params![key, value])
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if rows == 0 {
                    return Err(StoreError::PreconditionFailed(key.to_string()));
                }
                Ok(())
            }
            Precondition::Equals(expected) => {
                let rows = conn
                    .execute(
                        "UPDATE metadata SET value = ?2 WHERE key = ?1 AND value = ?3",
                        params![key, value, expected],
                    )
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if rows == 0 {
                    return Err(StoreError::PreconditionFailed(key.to_string()));
                }
                Ok(())
            }
            Precondition::None => {
                conn.execute(
                    "INSERT INTO metadata (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(())
            }
        }
    }

    fn delete_sync(&self, key: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM metadata WHERE key = ?1", params![key])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn list_sync(&self, prefix: &str, cursor: Option<String>, limit: usize) -> StoreResult<Page> {
        let conn = self.conn()?;
        let lower = match &cursor {
            Some(c) if c.as_str() > prefix => c.clone(),
            _ => prefix.to_string(),
        };
        let upper = prefix_upper_bound(prefix);

        let fetch_limit = (limit + 1) as i64;
        let mut stmt = conn
            .prepare(
                "SELECT key, value FROM metadata
                 WHERE key > ?1 AND key >= ?2 AND (?3 IS NULL OR key < ?3)
                 ORDER BY key ASC LIMIT ?4",
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // `key > cursor` must not exclude the prefix's first key when no
        // cursor was given, so pass an empty-string lower bound in that case.
        let cursor_exclusive = cursor.clone().unwrap_or_default();

        let rows = stmt
            .query_map(params![cursor_exclusive, lower, upper, fetch_limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut items: Vec<(String, Vec<u8>)> = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| StoreError::Backend(e.to_string()))?);
        }

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|(k, _)| k.clone())
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }
}

fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if (last as u32) < 0x10FFFF {
            chars.push(char::from_u32(last as u32 + 1).unwrap());
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.get_sync(key)
    }

    async fn put_if(&self, key: &str, value: Vec<u8>, precondition: Precondition) -> StoreResult<()> {
        self.put_if_sync(key, value, precondition)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.delete_sync(key)
    }

    async fn list(&self, prefix: &str, cursor: Option<String>, limit: usize) -> StoreResult<Page> {
        self.list_sync(prefix, cursor, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_then_conflict() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.put_if("k", b"a".to_vec(), Precondition::Absent).await.unwrap();
        let result = store.put_if("k", b"b".to_vec(), Precondition::Absent).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_put_if_equals_cas() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.put_if("k", b"a".to_vec(), Precondition::Absent).await.unwrap();
        store.put_if("k", b"b".to_vec(), Precondition::Equals(b"a".to_vec())).await.unwrap();
        let stale = store.put_if("k", b"c".to_vec(), Precondition::Equals(b"a".to_vec())).await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_list_prefix_pagination() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        for i in 0..5 {
            store.put_if(&format!("p#{i}"), vec![i as u8], Precondition::None).await.unwrap();
        }
        store.put_if("q#0", vec![9], Precondition::None).await.unwrap();

        let page = store.list("p#", None, 3).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_some());

        let page2 = store.list("p#", page.next_cursor, 3).await.unwrap();
        assert_eq!(page2.items.len(), 2);
        assert!(page2.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.put_if("k", b"a".to_vec(), Precondition::None).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
