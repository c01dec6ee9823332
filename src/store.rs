use crate::detection::Detection;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode detections: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScan {
    pub id: i64,
    pub key: String,
    pub created_at: i64,
    pub demo: bool,
    pub detections: Vec<Detection>,
}

/// Local persistent store of past scans.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS scans (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              scan_key TEXT NOT NULL,
              created_at INTEGER NOT NULL,
              demo INTEGER NOT NULL,
              detections_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scans_created ON scans(created_at);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record_scan(
        &self,
        key: &str,
        demo: bool,
        detections: &[Detection],
    ) -> Result<i64, StoreError> {
        let detections_json = serde_json::to_string(detections)?;
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scans (scan_key, created_at, demo, detections_json) VALUES (?1, ?2, ?3, ?4)",
            params![key, created_at, demo, detections_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent scans first.
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<StoredScan>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, scan_key, created_at, demo, detections_json FROM scans ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut scans = Vec::new();
        for row in rows {
            let (id, key, created_at, demo, detections_json) = row?;
            scans.push(StoredScan {
                id,
                key,
                created_at,
                demo,
                detections: serde_json::from_str(&detections_json)?,
            });
        }
        Ok(scans)
    }
}

/// Handle to a store that is opened in the background. It stays empty until
/// initialization succeeds, and forever if it fails.
#[derive(Clone, Default)]
pub struct StoreHandle {
    cell: Arc<OnceCell<Arc<LocalStore>>>,
}

impl StoreHandle {
    /// Starts opening the store at `path` without waiting for it. Failures
    /// are logged and leave the handle empty.
    pub fn spawn_init(path: PathBuf) -> (Self, JoinHandle<()>) {
        let handle = Self::default();
        let cell = handle.cell.clone();

        let task = tokio::spawn(async move {
            let location = path.display().to_string();
            let opened = tokio::task::spawn_blocking(move || LocalStore::open(&path))
                .await
                .map_err(StoreError::from)
                .and_then(|result| result);

            match opened {
                Ok(store) => {
                    if cell.set(Arc::new(store)).is_err() {
                        tracing::warn!("Local store was already initialized");
                    } else {
                        tracing::info!("Local store ready at {}", location);
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to initialize local store at {}: {}", location, e);
                }
            }
        });

        (handle, task)
    }

    pub fn get(&self) -> Option<Arc<LocalStore>> {
        self.cell.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}
