//! PostgreSQL follower store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Commit protocol
//!
//! One transaction per import:
//!
//! 1. `pg_advisory_xact_lock(hashtext(account))` serializes imports of one account
//! 2. the live snapshot is re-read and its fingerprint compared with the caller's
//! 3. the import row, the current set, the left set and the events are written
//!    as four set-based statements regardless of list size

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::FollowerStore;
use crate::diff::DiffResult;
use crate::types::{
    AccountId, Event, EventKind, FollowerRecord, FollowerStatus, FollowerSummary, Identifier,
    ImportId, ImportMetadata, ImportRecord, Snapshot, SourceKind,
};

/// SQL schema for imports, follower records and events.
pub const FOLLOWER_DIFF_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS follower_imports (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL,
    source_kind TEXT NOT NULL,
    imported_at TIMESTAMPTZ NOT NULL,
    source_digest TEXT NOT NULL,
    degraded BOOLEAN NOT NULL DEFAULT FALSE,
    snapshot_fingerprint TEXT NOT NULL,

    CONSTRAINT follower_imports_source_kind_check
        CHECK (source_kind IN ('archive', 'json_file', 'csv_file'))
);

CREATE INDEX IF NOT EXISTS idx_follower_imports_account
    ON follower_imports(account_id, imported_at);

CREATE TABLE IF NOT EXISTS followers (
    account_id UUID NOT NULL,
    identifier TEXT NOT NULL,
    first_seen TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    status TEXT NOT NULL,

    PRIMARY KEY (account_id, identifier),
    CONSTRAINT followers_status_check CHECK (status IN ('current', 'left'))
);

CREATE INDEX IF NOT EXISTS idx_followers_current
    ON followers(account_id) WHERE status = 'current';

CREATE TABLE IF NOT EXISTS follower_events (
    id BIGSERIAL PRIMARY KEY,
    account_id UUID NOT NULL,
    import_id UUID NOT NULL REFERENCES follower_imports(id),
    identifier TEXT NOT NULL,
    kind TEXT NOT NULL,
    happened_at TIMESTAMPTZ NOT NULL,

    CONSTRAINT follower_events_kind_check CHECK (kind IN ('follow', 'unfollow'))
);

CREATE INDEX IF NOT EXISTS idx_follower_events_account
    ON follower_events(account_id, happened_at, identifier);
CREATE INDEX IF NOT EXISTS idx_follower_events_import
    ON follower_events(import_id);
"#;

/// Configuration for PostgreSQL connection pool.
///
/// Defaults suit a small managed Postgres behind a container platform:
/// short acquire timeout, idle connections released, periodic reconnection.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/follower_diff".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The live snapshot changed since the caller read it.
    #[error("Import conflict for account {account}: expected snapshot {expected}, found {actual}")]
    Conflict {
        /// Account being committed.
        account: AccountId,
        /// Fingerprint the caller diffed against.
        expected: String,
        /// Fingerprint of the live snapshot.
        actual: String,
    },
    /// A stored row holds a value outside its closed set.
    #[error("Invalid stored {column}: {value}")]
    InvalidRow {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: String,
    },
}

/// PostgreSQL follower store.
pub struct PostgresFollowerStore {
    pool: PgPool,
}

impl PostgresFollowerStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        self.pool.execute(FOLLOWER_DIFF_SCHEMA).await?;
        tracing::info!("Follower schema ready");
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    async fn live_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        account: &AccountId,
    ) -> Result<Snapshot, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT identifier
            FROM followers
            WHERE account_id = $1 AND status = 'current'
            ORDER BY identifier
            "#,
        )
        .bind(account.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        let mut snapshot = Vec::with_capacity(rows.len());
        for row in &rows {
            let identifier: String = row.try_get("identifier")?;
            snapshot.extend(Identifier::parse(&identifier));
        }
        Ok(Snapshot::from_iter(snapshot))
    }

    fn parse_follower_row(row: &PgRow) -> Result<FollowerRecord, PostgresError> {
        let status: String = row.try_get("status")?;
        let identifier: String = row.try_get("identifier")?;
        Ok(FollowerRecord {
            identifier: Identifier::parse(&identifier).ok_or_else(|| PostgresError::InvalidRow {
                column: "identifier",
                value: identifier.clone(),
            })?,
            first_seen: row.try_get("first_seen")?,
            last_seen: row.try_get("last_seen")?,
            status: FollowerStatus::from_str(&status).ok_or_else(|| PostgresError::InvalidRow {
                column: "status",
                value: status.clone(),
            })?,
        })
    }

    fn parse_event_row(row: &PgRow) -> Result<Event, PostgresError> {
        let kind: String = row.try_get("kind")?;
        let identifier: String = row.try_get("identifier")?;
        let import_id: Uuid = row.try_get("import_id")?;
        Ok(Event {
            identifier: Identifier::parse(&identifier).ok_or_else(|| PostgresError::InvalidRow {
                column: "identifier",
                value: identifier.clone(),
            })?,
            kind: EventKind::from_str(&kind).ok_or_else(|| PostgresError::InvalidRow {
                column: "kind",
                value: kind.clone(),
            })?,
            happened_at: row.try_get("happened_at")?,
            import_id: ImportId::new(import_id),
        })
    }

    fn parse_import_row(row: &PgRow) -> Result<ImportRecord, PostgresError> {
        let source_kind: String = row.try_get("source_kind")?;
        let id: Uuid = row.try_get("id")?;
        Ok(ImportRecord {
            id: ImportId::new(id),
            source_kind: SourceKind::from_str(&source_kind).ok_or_else(|| PostgresError::InvalidRow {
                column: "source_kind",
                value: source_kind.clone(),
            })?,
            imported_at: row.try_get("imported_at")?,
            source_digest: row.try_get("source_digest")?,
            degraded: row.try_get("degraded")?,
            snapshot_fingerprint: row.try_get("snapshot_fingerprint")?,
        })
    }
}

fn to_strings<'a>(ids: impl IntoIterator<Item = &'a Identifier>) -> Vec<String> {
    ids.into_iter().map(|id| id.as_str().to_string()).collect()
}

#[async_trait]
impl FollowerStore for PostgresFollowerStore {
    type Error = PostgresError;

    async fn read_previous_snapshot(&self, account: &AccountId) -> Result<Snapshot, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let snapshot = Self::live_snapshot(&mut tx, account).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    async fn commit(
        &self,
        account: &AccountId,
        diff: &DiffResult,
        current: &Snapshot,
        meta: ImportMetadata,
    ) -> Result<ImportId, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let account_uuid = account.as_uuid();
        let at: DateTime<Utc> = meta.imported_at;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(account.to_string())
            .execute(&mut *tx)
            .await?;

        let actual = Self::live_snapshot(&mut tx, account).await?.fingerprint();
        if actual != meta.previous_fingerprint {
            tx.rollback().await?;
            return Err(PostgresError::Conflict {
                account: *account,
                expected: meta.previous_fingerprint,
                actual,
            });
        }

        let id = ImportId::generate();

        sqlx::query(
            r#"
            INSERT INTO follower_imports
                (id, account_id, source_kind, imported_at, source_digest, degraded, snapshot_fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id.as_uuid())
        .bind(account_uuid)
        .bind(meta.source_kind.as_str())
        .bind(at)
        .bind(&meta.source_digest)
        .bind(meta.degraded)
        .bind(current.fingerprint())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO followers (account_id, identifier, first_seen, last_seen, status)
            SELECT $1, ident, $3, $3, 'current'
            FROM UNNEST($2::text[]) AS t(ident)
            ON CONFLICT (account_id, identifier)
            DO UPDATE SET last_seen = EXCLUDED.last_seen, status = 'current'
            "#,
        )
        .bind(account_uuid)
        .bind(to_strings(current))
        .bind(at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE followers
            SET status = 'left', last_seen = $3
            WHERE account_id = $1 AND identifier = ANY($2::text[])
            "#,
        )
        .bind(account_uuid)
        .bind(to_strings(&diff.left))
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let (identifiers, kinds): (Vec<String>, Vec<String>) = diff
            .entered
            .iter()
            .map(|i| (i.as_str().to_string(), EventKind::Follow.as_str().to_string()))
            .chain(
                diff.left
                    .iter()
                    .map(|i| (i.as_str().to_string(), EventKind::Unfollow.as_str().to_string())),
            )
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO follower_events (account_id, import_id, identifier, kind, happened_at)
            SELECT $1, $2, ident, kind, $5
            FROM UNNEST($3::text[], $4::text[]) AS t(ident, kind)
            "#,
        )
        .bind(account_uuid)
        .bind(id.as_uuid())
        .bind(identifiers)
        .bind(kinds)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            account = %account,
            import_id = %id,
            current = current.len(),
            entered = diff.entered.len(),
            left = diff.left.len(),
            "Committed import"
        );

        Ok(id)
    }

    async fn list_events(
        &self,
        account: &AccountId,
        import: Option<ImportId>,
    ) -> Result<Vec<Event>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, kind, happened_at, import_id
            FROM follower_events
            WHERE account_id = $1 AND ($2::uuid IS NULL OR import_id = $2)
            ORDER BY happened_at, identifier
            "#,
        )
        .bind(account.as_uuid())
        .bind(import.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_event_row).collect()
    }

    async fn list_followers(&self, account: &AccountId) -> Result<Vec<FollowerRecord>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, first_seen, last_seen, status
            FROM followers
            WHERE account_id = $1
            ORDER BY identifier
            "#,
        )
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_follower_row).collect()
    }

    async fn list_imports(&self, account: &AccountId) -> Result<Vec<ImportRecord>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_kind, imported_at, source_digest, degraded, snapshot_fingerprint
            FROM follower_imports
            WHERE account_id = $1
            ORDER BY imported_at, id
            "#,
        )
        .bind(account.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_import_row).collect()
    }

    async fn summary(&self, account: &AccountId) -> Result<FollowerSummary, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM followers
                  WHERE account_id = $1 AND status = 'current') AS current_count,
                (SELECT COUNT(*) FROM followers
                  WHERE account_id = $1 AND status = 'left') AS left_count,
                (SELECT COUNT(*) FROM follower_events
                  WHERE account_id = $1 AND kind = 'follow') AS follow_count,
                (SELECT COUNT(*) FROM follower_events
                  WHERE account_id = $1 AND kind = 'unfollow') AS unfollow_count,
                (SELECT COUNT(*) FROM follower_imports
                  WHERE account_id = $1) AS import_count
            "#,
        )
        .bind(account.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<usize, sqlx::Error> {
            Ok(row.try_get::<i64, _>(column)?.max(0) as usize)
        };

        Ok(FollowerSummary {
            current: count("current_count")?,
            left: count("left_count")?,
            follows: count("follow_count")?,
            unfollows: count("unfollow_count")?,
            imports: count("import_count")?,
        })
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    fn is_conflict(error: &Self::Error) -> bool {
        matches!(error, PostgresError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_covers_all_tables() {
        for table in ["follower_imports", "followers", "follower_events"] {
            assert!(
                FOLLOWER_DIFF_SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {} (", table)),
                "missing table {}",
                table
            );
        }
    }

    #[test]
    fn test_schema_checks_match_storage_strings() {
        for s in [
            FollowerStatus::Current.as_str(),
            FollowerStatus::Left.as_str(),
            EventKind::Follow.as_str(),
            EventKind::Unfollow.as_str(),
            SourceKind::Archive.as_str(),
            SourceKind::JsonFile.as_str(),
            SourceKind::CsvFile.as_str(),
        ] {
            assert!(FOLLOWER_DIFF_SCHEMA.contains(&format!("'{}'", s)));
        }
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or::<u32>("FOLLOWER_DIFF_TEST_UNSET_VARIABLE", 7), 7);
    }
}
