//! Repository pattern for the observation log
//!
//! The scheduler and the notification task only talk to [`TrendStore`];
//! the SQLite implementation is used in production and the in-memory one in
//! tests and dry runs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Scheduler / notification task                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TrendStore trait                       │
//! │          write_batch · read_recent · read_top               │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                          │
//!                   ▼                          ▼
//!         ┌─────────────────┐        ┌─────────────────┐
//!         │     SQLite      │        │     Memory      │
//!         └─────────────────┘        └─────────────────┘
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::models::{Engagement, Observation, Platform, TopTrend};

// ============================================================================
// Repository Trait
// ============================================================================

/// Append-only observation log
///
/// Observations are never updated or deleted. Writing the same
/// `(platform, source_id, observed_at)` twice stores it once.
#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Persist a batch atomically, returning the number of new rows
    async fn write_batch(&self, observations: &[Observation]) -> Result<usize>;

    /// Observations fetched in the last `hours`, newest first
    ///
    /// Rows sharing a fetch time are ordered by raw score, highest first.
    async fn read_recent(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<Observation>>;

    /// Per-topic aggregates over the last `hours`, highest score first
    async fn read_top(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<TopTrend>>;
}

fn window_start(hours: u32) -> DateTime<Utc> {
    Utc::now() - Duration::hours(i64::from(hours))
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`TrendStore`]
///
/// The connection sits behind a mutex and every call runs on the blocking
/// pool, so a batch never interleaves with another writer.
pub struct SqliteTrendStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrendStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::from_connection(conn)?;
        tracing::info!(path = %path.display(), "SQLite trend store initialized");
        Ok(store)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("SQLite connection lock poisoned"))?;
            op(&mut *guard)
        })
        .await
        .context("SQLite task panicked")?
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                topic TEXT NOT NULL,
                score INTEGER NOT NULL DEFAULT 0,
                volume INTEGER NOT NULL DEFAULT 0,
                engagement TEXT NOT NULL,
                created_at TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                source_id TEXT NOT NULL,
                UNIQUE(platform, source_id, observed_at)
            );

            CREATE INDEX IF NOT EXISTS idx_observations_observed
                ON observations(observed_at);

            CREATE INDEX IF NOT EXISTS idx_observations_platform
                ON observations(platform, observed_at);

            CREATE INDEX IF NOT EXISTS idx_observations_topic
                ON observations(topic);
            "#,
    )
    .context("Failed to create SQLite schema")?;

    Ok(())
}

fn insert_batch(conn: &mut Connection, observations: &[Observation]) -> Result<usize> {
    let tx = conn.transaction().context("Failed to begin transaction")?;
    let mut inserted = 0;

    {
        let mut stmt = tx.prepare(
            r#"
                INSERT OR IGNORE INTO observations
                    (platform, topic, score, volume, engagement, created_at, observed_at, source_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
        )?;

        for obs in observations {
            let engagement = serde_json::to_string(&obs.engagement)
                .context("Failed to serialize engagement")?;

            inserted += stmt
                .execute(params![
                    obs.platform().as_str(),
                    obs.topic,
                    obs.raw_score(),
                    clamp_i64(obs.engagement.volume()),
                    engagement,
                    format_ts(obs.created_at),
                    format_ts(obs.observed_at),
                    obs.source_id,
                ])
                .context("Failed to insert observation")?;
        }
    }

    tx.commit().context("Failed to commit observation batch")?;
    Ok(inserted)
}

fn select_recent(
    conn: &mut Connection,
    platform: Option<Platform>,
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Observation>> {
    let mut stmt = conn.prepare(
        r#"
            SELECT topic, engagement, created_at, observed_at, source_id
            FROM observations
            WHERE observed_at >= ?1 AND (?2 IS NULL OR platform = ?2)
            ORDER BY observed_at DESC, score DESC, id ASC
            LIMIT ?3
            "#,
    )?;

    let rows = stmt.query_map(
        params![
            format_ts(since),
            platform.map(|p| p.as_str()),
            clamp_limit(limit)
        ],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    )?;

    let mut observations = Vec::new();
    for row in rows {
        let (topic, engagement, created_at, observed_at, source_id) =
            row.context("Failed to read observation row")?;

        let engagement: Engagement = match serde_json::from_str(&engagement) {
            Ok(engagement) => engagement,
            Err(e) => {
                tracing::warn!(source_id = %source_id, error = %e, "Skipping row with malformed engagement");
                continue;
            }
        };

        observations.push(Observation {
            topic,
            engagement,
            created_at: parse_ts(&created_at),
            observed_at: parse_ts(&observed_at),
            source_id,
        });
    }

    Ok(observations)
}

fn select_top(
    conn: &mut Connection,
    platform: Option<Platform>,
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<TopTrend>> {
    let mut stmt = conn.prepare(
        r#"
            SELECT topic, platform, MAX(score) AS max_score, COUNT(*) AS mentions
            FROM observations
            WHERE observed_at >= ?1 AND (?2 IS NULL OR platform = ?2)
            GROUP BY topic, platform
            ORDER BY max_score DESC, mentions DESC, topic ASC, platform ASC
            LIMIT ?3
            "#,
    )?;

    let rows = stmt.query_map(
        params![
            format_ts(since),
            platform.map(|p| p.as_str()),
            clamp_limit(limit)
        ],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )?;

    let mut top = Vec::new();
    for row in rows {
        let (topic, platform, max_score, mentions) = row.context("Failed to read top row")?;
        let Some(platform) = Platform::parse(&platform) else {
            tracing::warn!(platform = %platform, "Skipping row with unknown platform");
            continue;
        };

        top.push(TopTrend {
            topic,
            platform,
            max_score,
            mentions: usize::try_from(mentions).unwrap_or(0),
        });
    }

    Ok(top)
}

#[async_trait]
impl TrendStore for SqliteTrendStore {
    async fn write_batch(&self, observations: &[Observation]) -> Result<usize> {
        if observations.is_empty() {
            return Ok(0);
        }

        let batch = observations.to_vec();
        self.with_conn(move |conn| insert_batch(conn, &batch)).await
    }

    async fn read_recent(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let since = window_start(hours);
        self.with_conn(move |conn| select_recent(conn, platform, since, limit))
            .await
    }

    async fn read_top(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<TopTrend>> {
        let since = window_start(hours);
        self.with_conn(move |conn| select_top(conn, platform, since, limit))
            .await
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

type ObservationKey = (Platform, String, DateTime<Utc>);

/// In-memory implementation of [`TrendStore`]
///
/// Mirrors the SQLite ordering rules so tests can run against both.
#[derive(Default)]
pub struct MemoryTrendStore {
    rows: RwLock<Vec<Observation>>,
    keys: RwLock<HashSet<ObservationKey>>,
}

impl MemoryTrendStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored observation in insertion order
    pub fn all(&self) -> Vec<Observation> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut rows) = self.rows.write() {
            rows.clear();
        }
        if let Ok(mut keys) = self.keys.write() {
            keys.clear();
        }
    }

    fn window(&self, platform: Option<Platform>, since: DateTime<Utc>) -> Result<Vec<Observation>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;

        Ok(rows
            .iter()
            .filter(|o| o.observed_at >= since)
            .filter(|o| platform.map_or(true, |p| o.platform() == p))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TrendStore for MemoryTrendStore {
    async fn write_batch(&self, observations: &[Observation]) -> Result<usize> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;
        let mut keys = self
            .keys
            .write()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?;

        let mut inserted = 0;
        for obs in observations {
            let key = (obs.platform(), obs.source_id.clone(), obs.observed_at);
            if keys.insert(key) {
                rows.push(obs.clone());
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    async fn read_recent(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let mut window = self.window(platform, window_start(hours))?;
        window.sort_by(|a, b| {
            b.observed_at
                .cmp(&a.observed_at)
                .then_with(|| b.raw_score().cmp(&a.raw_score()))
        });
        window.truncate(limit);
        Ok(window)
    }

    async fn read_top(
        &self,
        platform: Option<Platform>,
        hours: u32,
        limit: usize,
    ) -> Result<Vec<TopTrend>> {
        let window = self.window(platform, window_start(hours))?;

        let mut top: Vec<TopTrend> = Vec::new();
        for obs in &window {
            match top
                .iter_mut()
                .find(|t| t.topic == obs.topic && t.platform == obs.platform())
            {
                Some(entry) => {
                    entry.max_score = entry.max_score.max(obs.raw_score());
                    entry.mentions += 1;
                }
                None => top.push(TopTrend {
                    topic: obs.topic.clone(),
                    platform: obs.platform(),
                    max_score: obs.raw_score(),
                    mentions: 1,
                }),
            }
        }

        top.sort_by(|a, b| {
            b.max_score
                .cmp(&a.max_score)
                .then_with(|| b.mentions.cmp(&a.mentions))
                .then_with(|| a.topic.cmp(&b.topic))
                .then_with(|| a.platform.as_str().cmp(b.platform.as_str()))
        });
        top.truncate(limit);
        Ok(top)
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store handle
pub type SharedTrendStore = Arc<dyn TrendStore>;

/// Create a shared SQLite store
pub fn create_sqlite_store(path: impl AsRef<Path>) -> Result<SharedTrendStore> {
    Ok(Arc::new(SqliteTrendStore::new(path)?))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedTrendStore {
    Arc::new(MemoryTrendStore::new())
}

// ============================================================================
// Tests
// ============================================================================
