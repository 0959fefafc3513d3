pub use types::*;

pub mod changes;
pub mod types;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::notifier::{Notifier, Observer, Subscription};

/// Handle to the persistent store. Cheap to clone; all clones share one
/// connection. Writes take the write lock (the isolated writer session),
/// reads take the read lock.
#[derive(Clone)]
pub struct Db {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) author: String,
    pub(crate) events: Notifier<StoreEvent>,
}

impl Db {
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::init_change_tracking_tables(&conn)?;

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
            author: Uuid::now_v7().to_string(),
            events: Notifier::new(),
        })
    }

    /// The `_` prefix keeps the bookkeeping tables apart from entity tables.
    /// `_change.seq` is the monotonic log position that ChangeToken wraps.
    fn init_change_tracking_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS _transaction (
                id        TEXT NOT NULL PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                author    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS _change (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id TEXT NOT NULL,
                post_id        INTEGER NOT NULL,
                new_values     TEXT NOT NULL,
                FOREIGN KEY (transaction_id) REFERENCES _transaction(id)
            );
        ",
        )?;
        Ok(())
    }

    pub fn migrate(&self, migrations: &Migrations) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock for migration"))?;

        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    pub fn query<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<T>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock"))?;

        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(serde_rusqlite::from_row::<T>(row)?);
        }

        Ok(results)
    }

    /// The full persisted post set in the order the list UI renders it.
    pub fn posts_ordered(&self) -> Result<Vec<Post>> {
        self.query(
            "SELECT id, user_id, title, body FROM Post ORDER BY id ASC",
            &[],
        )
    }

    /// Subscribe to commit notifications. The subscription is torn down when
    /// the returned handle drops.
    pub fn subscribe(&self) -> Subscription<StoreEvent> {
        self.events.subscribe()
    }

    /// Runs `callback` on its own thread for every commit notification until
    /// the returned Observer is dropped.
    pub fn observe(
        &self,
        callback: impl FnMut(StoreEvent) + Send + 'static,
    ) -> Observer<StoreEvent> {
        self.events.observe(callback)
    }
}

/// Schema for the mirrored post collection.
pub fn post_migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE Post (
            id      INTEGER NOT NULL PRIMARY KEY,
            user_id INTEGER NOT NULL,
            title   TEXT NOT NULL,
            body    TEXT NOT NULL
        );",
    )])
}
