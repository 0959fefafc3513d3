use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use thiserror::Error;

use crate::db::Db;
use crate::fetch::{FetchError, Fetcher, HttpClient};
use crate::import::{ImportError, Importer};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Owns the fetch → import pipeline. Construct one at process start and hand
/// clones to whatever triggers a refresh; there is no shared global instance.
#[derive(Clone)]
pub struct SyncService {
    db: Db,
    fetcher: Arc<Fetcher>,
    importer: Arc<Importer>,
    refresh_in_flight: Arc<AtomicBool>,
}

impl SyncService {
    pub fn new(db: Db, client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            fetcher: Arc::new(Fetcher::new(client, url)),
            importer: Arc::new(Importer::new(db.clone())),
            db,
            refresh_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Fetches the full collection and imports it. A fetch failure performs
    /// no write. Overlapping calls are collapsed: while one refresh is in
    /// flight, further calls return Ok without fetching, since the refresh
    /// already running will upsert the same collection anyway.
    pub fn update_database(&self) -> Result<(), UpdateError> {
        if self.refresh_in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("refresh already in flight, skipping");
            return Ok(());
        }
        let result = self.refresh();
        self.refresh_in_flight.store(false, Ordering::Release);
        result
    }

    fn refresh(&self) -> Result<(), UpdateError> {
        let records = self.fetcher.fetch()?;
        log::debug!("fetched {} posts", records.len());
        self.importer.import(&records)?;
        Ok(())
    }

    /// Runs the refresh on a worker thread so the caller never blocks on the
    /// network, and hands the outcome to `completion`. The import only starts
    /// after the fetch has completed successfully.
    pub fn update_database_async(
        &self,
        completion: impl FnOnce(Result<(), UpdateError>) + Send + 'static,
    ) {
        let service = self.clone();
        thread::spawn(move || completion(service.update_database()));
    }
}
