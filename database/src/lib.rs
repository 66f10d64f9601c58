//! SQLite persistence layer for the coordination server.
//!
//! Implements [`cortex_core::repository::CoordRepository`] and
//! [`cortex_core::repository::FileLockStore`] on top of sqlx with embedded
//! migrations. The store is the single source of truth; horizontal scaling
//! runs multiple server processes against the same database file.

mod common;
mod sqlite;

pub use sqlite::SqliteCoordStore;

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::repository::CoordRepository;

    #[tokio::test]
    async fn test_store_creation_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("coord.sqlite");
        let store = SqliteCoordStore::new(db_path.to_str().unwrap())
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
    }
}
