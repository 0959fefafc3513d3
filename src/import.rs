use std::ops::Range;

use thiserror::Error;

use crate::db::Db;
use crate::fetch::PostRecord;

/// Number of records written per writer transaction.
pub const BATCH_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("bulk upsert failed for batch {batch}: {cause}")]
    BatchInsertFailure { batch: usize, cause: anyhow::Error },
}

/// Splits `count` records into ⌈count/size⌉ contiguous ranges that cover
/// [0, count) exactly once: `end = min(start + size, count)`. Dropping the
/// tail of the final batch is the classic bug here, so this is kept as a
/// standalone function with its own tests.
pub fn batch_ranges(count: usize, size: usize) -> Vec<Range<usize>> {
    assert!(size > 0, "batch size must be non-zero");
    (0..count)
        .step_by(size)
        .map(|start| start..(start + size).min(count))
        .collect()
}

/// Writes fetched records into the store in fixed-size batches, each batch
/// through one isolated writer transaction.
pub struct Importer {
    db: Db,
    batch_size: usize,
}

impl Importer {
    pub fn new(db: Db) -> Self {
        Self::with_batch_size(db, BATCH_SIZE)
    }

    pub fn with_batch_size(db: Db, batch_size: usize) -> Self {
        Self { db, batch_size }
    }

    /// Upserts the records batch by batch in source order. Each batch is
    /// atomic; the first failing batch halts the remainder and leaves the
    /// batches already committed in place.
    pub fn import(&self, records: &[PostRecord]) -> Result<(), ImportError> {
        for (batch, range) in batch_ranges(records.len(), self.batch_size)
            .into_iter()
            .enumerate()
        {
            log::debug!("importing batch {} ({} records)", batch, range.len());
            self.db
                .upsert_posts(&records[range])
                .map_err(|cause| ImportError::BatchInsertFailure { batch, cause })?;
        }
        Ok(())
    }
}
