use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sqlx::any::{AnyKind, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::{error, info};

use crate::models::{Consumed, NotFoundReason, Paste};

const PASTE_COLUMNS: &str = "id, content, ttl_seconds, max_views, view_count, created_at";

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Connect to a database by URL.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Create the `paste` table if it does not exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        #[allow(unreachable_patterns)]
        let schema = match self.pool.any_kind() {
            #[cfg(feature = "sqlite")]
            AnyKind::Sqlite => include_str!("../schema/sqlite.sql"),
            #[cfg(feature = "postgres")]
            AnyKind::Postgres => include_str!("../schema/postgres.sql"),
            kind => bail!("unsupported database kind: {kind:?}"),
        };

        sqlx::query(schema)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;
        info!("database schema is up to date");
        Ok(())
    }

    /// Trivial round-trip to the database. Never fails; problems are logged
    /// and reported as `false`.
    pub async fn is_available(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(err) => {
                error!("database health check failed: {err}");
                false
            }
        }
    }

    /// Insert a paste. Returns `None` when the id is already taken.
    pub async fn insert_paste(
        &self,
        id: &str,
        content: &str,
        ttl_seconds: Option<i64>,
        max_views: Option<i64>,
    ) -> crate::AppResult<Option<Paste>> {
        let result = sqlx::query_as::<_, Paste>(&format!(
            "INSERT INTO paste (id, content, ttl_seconds, max_views) VALUES ($1, $2, $3, $4) \
             RETURNING {PASTE_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .bind(ttl_seconds)
        .bind(max_views)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(paste) => Ok(Some(paste)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Record one view of a paste, if it is still visible at `now`.
    ///
    /// The view counter only moves through a single conditional `UPDATE`
    /// whose predicate carries the view limit, so concurrent readers can
    /// never push `view_count` past `max_views`. A row that turns out to be
    /// time-expired has its increment rolled back. When nothing was updated
    /// the row is re-read in the same transaction to work out why.
    pub async fn consume_paste(&self, id: &str, now: &DateTime<Utc>) -> crate::AppResult<Consumed> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Paste>(&format!(
            "UPDATE paste SET view_count = view_count + 1 \
             WHERE id = $1 AND (max_views IS NULL OR view_count < max_views) \
             RETURNING {PASTE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut tx)
        .await?;

        match updated {
            Some(paste) if paste.is_expired_at(now) => {
                tx.rollback().await?;
                Ok(Consumed::NotFound(NotFoundReason::Expired))
            }
            Some(paste) => {
                tx.commit().await?;
                Ok(Consumed::Found(paste.into()))
            }
            None => {
                let paste = sqlx::query_as::<_, Paste>(&format!(
                    "SELECT {PASTE_COLUMNS} FROM paste WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&mut tx)
                .await?;
                tx.rollback().await?;
                Ok(Consumed::NotFound(NotFoundReason::classify(
                    paste.as_ref(),
                    now,
                )))
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    // postgres unique_violation, sqlite SQLITE_CONSTRAINT_UNIQUE / _PRIMARYKEY
    match err {
        sqlx::Error::Database(err) => {
            matches!(err.code().as_deref(), Some("23505" | "2067" | "1555"))
        }
        _ => false,
    }
}

#[cfg(all(test, feature = "sqlite"))]
pub(crate) mod test_util {
    use std::path::Path;

    use sqlx::any::AnyPoolOptions;

    use super::{Database, PASTE_COLUMNS};
    use crate::models::Paste;

    impl Database {
        /// Get a paste by id without touching its view count.
        pub async fn get_paste(&self, id: &str) -> crate::AppResult<Option<Paste>> {
            let paste = sqlx::query_as::<_, Paste>(&format!(
                "SELECT {PASTE_COLUMNS} FROM paste WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(paste)
        }
    }

    /// A fresh in-memory SQLite database with the schema applied. Pinned to a
    /// single connection, since each SQLite memory connection is its own
    /// database.
    pub async fn memory_database() -> Database {
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let database = Database { pool };
        database.migrate().await.unwrap();
        database
    }

    /// A SQLite database in a file, shared by `max_connections` connections
    /// so that transactions really overlap.
    pub async fn file_database(path: &Path, max_connections: u32) -> Database {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let database = Database::connect(&url, max_connections).await.unwrap();
        database.migrate().await.unwrap();
        database
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use chrono::Duration;

    use super::test_util::memory_database;
    use super::*;

    #[tokio::test]
    async fn insert_assigns_defaults() {
        let db = memory_database().await;
        let before = Utc::now() - Duration::seconds(1);

        let paste = db
            .insert_paste("abcdefghij", "hello", Some(60), None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(paste.id, "abcdefghij");
        assert_eq!(paste.view_count, 0);
        assert_eq!(paste.ttl_seconds, Some(60));
        assert_eq!(paste.max_views, None);
        assert!(paste.created_at >= before);
        assert!(paste.created_at <= Utc::now() + Duration::seconds(1));
    }

    #[tokio::test]
    async fn duplicate_id_is_reported_as_taken() {
        let db = memory_database().await;
        assert!(db.insert_paste("abcdefghij", "a", None, None).await.unwrap().is_some());
        assert!(db.insert_paste("abcdefghij", "b", None, None).await.unwrap().is_none());

        let stored = db.get_paste("abcdefghij").await.unwrap().unwrap();
        assert_eq!(stored.content, "a");
    }

    #[tokio::test]
    async fn expired_read_leaves_counter_untouched() {
        let db = memory_database().await;
        let paste = db
            .insert_paste("abcdefghij", "hello", Some(10), Some(3))
            .await
            .unwrap()
            .unwrap();

        let later = paste.created_at + Duration::seconds(10);
        assert_eq!(
            db.consume_paste(&paste.id, &later).await.unwrap(),
            Consumed::NotFound(NotFoundReason::Expired)
        );

        let stored = db.get_paste(&paste.id).await.unwrap().unwrap();
        assert_eq!(stored.view_count, 0);
    }

    #[tokio::test]
    async fn exhausted_read_does_not_overcount() {
        let db = memory_database().await;
        let paste = db
            .insert_paste("abcdefghij", "hello", None, Some(1))
            .await
            .unwrap()
            .unwrap();
        let now = Utc::now();

        assert!(matches!(
            db.consume_paste(&paste.id, &now).await.unwrap(),
            Consumed::Found(_)
        ));
        for _ in 0..3 {
            assert_eq!(
                db.consume_paste(&paste.id, &now).await.unwrap(),
                Consumed::NotFound(NotFoundReason::ViewLimitExceeded)
            );
        }

        let stored = db.get_paste(&paste.id).await.unwrap().unwrap();
        assert_eq!(stored.view_count, 1);
    }

    #[tokio::test]
    async fn health_check_round_trips() {
        let db = memory_database().await;
        assert!(db.is_available().await);
    }
}
