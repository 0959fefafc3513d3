use anyhow::Result;
use uuid::Uuid;

use super::types::{Change, ChangeToken, Post, StoreEvent};
use super::Db;
use crate::fetch::PostRecord;

impl Db {
    /// Upserts one batch of posts in a single writer transaction, keyed on
    /// `Post.id`. The data rows and their history rows commit together, the
    /// write lock is released, and then subscribers are notified. Either the
    /// whole batch lands or none of it does.
    pub fn upsert_posts(&self, posts: &[PostRecord]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock"))?;
        let tx = conn.transaction()?;

        let transaction_id = Uuid::now_v7().to_string();
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_millis() as i64;

        log::debug!("SQL EXECUTE: INSERT INTO _transaction (id, timestamp, author) VALUES (?, ?, ?)");
        tx.execute(
            "INSERT INTO _transaction (id, timestamp, author) VALUES (?, ?, ?)",
            rusqlite::params![transaction_id, timestamp, self.author],
        )?;

        let mut post_ids = Vec::with_capacity(posts.len());
        let mut last_seq = 0i64;
        for record in posts {
            let row = Post::from(record);

            log::debug!("SQL EXECUTE: upsert Post id={}", row.id);
            tx.execute(
                "INSERT INTO Post (id, user_id, title, body) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id,
                     title = excluded.title,
                     body = excluded.body",
                rusqlite::params![row.id, row.user_id, row.title, row.body],
            )?;

            let new_values = serde_json::to_string(&row)?;
            tx.execute(
                "INSERT INTO _change (transaction_id, post_id, new_values) VALUES (?, ?, ?)",
                rusqlite::params![transaction_id, row.id, new_values],
            )?;
            last_seq = tx.last_insert_rowid();
            post_ids.push(row.id);
        }

        tx.commit()?;

        // Release the write lock before notifying subscribers
        drop(conn);

        self.events.notify(StoreEvent {
            post_ids,
            latest: ChangeToken(last_seq),
        });

        Ok(())
    }

    /// History strictly after `token`, ordered by log position ascending,
    /// which is commit order.
    pub fn changes_since(&self, token: ChangeToken) -> Result<Vec<Change>> {
        self.query(
            "SELECT seq, transaction_id, post_id, new_values
             FROM _change
             WHERE seq > ?
             ORDER BY seq ASC",
            &[&token.0],
        )
    }

    /// Position of the newest history entry, or the origin for an empty log.
    pub fn latest_token(&self) -> Result<ChangeToken> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock"))?;
        let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM _change", [], |row| {
            row.get(0)
        })?;
        Ok(ChangeToken(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::post_migrations;
    use std::time::Duration;

    fn record(id: i64, title: &str, body: &str) -> PostRecord {
        PostRecord {
            user_id: id,
            id,
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    fn open_post_db() -> Result<Db> {
        let db = Db::open_memory()?;
        db.migrate(&post_migrations())?;
        Ok(db)
    }

    #[test]
    fn upsert_inserts_new_rows() -> Result<()> {
        let db = open_post_db()?;

        db.upsert_posts(&[record(1, "a", "b"), record(2, "c", "d")])?;

        let posts = db.posts_ordered()?;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "a");
        assert_eq!(posts[1].title, "c");
        Ok(())
    }

    #[test]
    fn upsert_overwrites_existing_rows() -> Result<()> {
        let db = open_post_db()?;

        db.upsert_posts(&[record(1, "first", "body")])?;
        db.upsert_posts(&[record(1, "second", "body")])?;

        let posts = db.posts_ordered()?;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "second");
        Ok(())
    }

    #[test]
    fn upsert_records_history_in_commit_order() -> Result<()> {
        let db = open_post_db()?;

        db.upsert_posts(&[record(1, "a", "b")])?;
        db.upsert_posts(&[record(2, "c", "d"), record(1, "e", "f")])?;

        let changes = db.changes_since(ChangeToken::default())?;
        assert_eq!(changes.len(), 3);
        // seq is strictly increasing across transactions
        assert!(changes[0].seq < changes[1].seq);
        assert!(changes[1].seq < changes[2].seq);
        assert_eq!(changes[0].post_id, 1);
        assert_eq!(changes[1].post_id, 2);
        assert_eq!(changes[2].post_id, 1);
        // the two batches belong to two distinct transactions
        assert_ne!(changes[0].transaction_id, changes[1].transaction_id);
        assert_eq!(changes[1].transaction_id, changes[2].transaction_id);
        Ok(())
    }

    #[test]
    fn changes_since_filters_by_token() -> Result<()> {
        let db = open_post_db()?;

        db.upsert_posts(&[record(1, "a", "b")])?;
        let token = db.latest_token()?;
        db.upsert_posts(&[record(2, "c", "d")])?;

        let changes = db.changes_since(token)?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].post_id, 2);

        // Nothing after the newest entry
        assert_eq!(db.changes_since(db.latest_token()?)?.len(), 0);
        Ok(())
    }

    #[test]
    fn upsert_notifies_subscribers_after_commit() -> Result<()> {
        let db = open_post_db()?;
        let subscription = db.subscribe();

        db.upsert_posts(&[record(1, "a", "b"), record(2, "c", "d")])?;

        let event = subscription.recv_timeout(Duration::from_millis(100))?;
        assert_eq!(event.post_ids, vec![1, 2]);
        assert_eq!(event.latest, db.latest_token()?);
        Ok(())
    }

    #[test]
    fn empty_batch_is_a_no_op() -> Result<()> {
        let db = open_post_db()?;
        let subscription = db.subscribe();

        db.upsert_posts(&[])?;

        assert_eq!(db.posts_ordered()?.len(), 0);
        assert_eq!(db.latest_token()?, ChangeToken::default());
        assert!(subscription
            .recv_timeout(Duration::from_millis(20))
            .is_err());
        Ok(())
    }

    #[test]
    fn failed_batch_rolls_back_data_and_history() -> Result<()> {
        let db = Db::open_memory()?;
        db.migrate(&rusqlite_migration::Migrations::new(vec![
            rusqlite_migration::M::up(
                "CREATE TABLE Post (
                    id      INTEGER NOT NULL PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    title   TEXT NOT NULL,
                    body    TEXT NOT NULL,
                    CHECK (id < 3)
                );",
            ),
        ]))?;

        // id 3 violates the constraint; the whole batch must vanish
        let result = db.upsert_posts(&[record(1, "a", "b"), record(3, "c", "d")]);
        assert!(result.is_err());

        assert_eq!(db.posts_ordered()?.len(), 0);
        assert_eq!(db.changes_since(ChangeToken::default())?.len(), 0);
        Ok(())
    }
}
