use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::db::{Change, ChangeToken, Db, Post, StoreEvent};
use crate::notifier::Observer;

#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("no change history available after the current token")]
    NoHistoryAvailable,
}

/// In-memory read model over the Post table. It is only ever updated by
/// merging change history; the import path never touches it directly.
/// Iteration order is id ascending, matching the list UI.
#[derive(Default)]
pub struct PostView {
    posts: BTreeMap<i64, Post>,
    last_token: ChangeToken,
}

impl PostView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Position in the change log this view has fully processed.
    pub fn last_token(&self) -> ChangeToken {
        self.last_token
    }

    /// Merges history entries in the order the store returned them (commit
    /// order), advancing the token per entry. Each entry overwrites the whole
    /// row, so on concurrent writes the last committed transaction wins.
    ///
    /// A store notification always follows a commit that appended history, so
    /// being handed nothing to merge means the consumer's token ran ahead of
    /// the log; that is reported as NoHistoryAvailable rather than ignored.
    pub fn apply(&mut self, changes: &[Change]) -> Result<(), ChangeError> {
        if changes.is_empty() {
            return Err(ChangeError::NoHistoryAvailable);
        }
        for change in changes {
            match serde_json::from_str::<Post>(&change.new_values) {
                Ok(post) => {
                    self.posts.insert(post.id, post);
                }
                Err(err) => {
                    log::warn!("skipping unreadable history entry {}: {}", change.seq, err);
                }
            }
            self.last_token = change.token();
        }
        Ok(())
    }

    /// Fetches everything after the current token and merges it.
    pub fn drain_history(&mut self, db: &Db) -> anyhow::Result<()> {
        let changes = db.changes_since(self.last_token)?;
        self.apply(&changes)?;
        Ok(())
    }
}

/// A PostView kept reconciled with the store by a subscriber thread.
pub struct SharedPostView {
    view: Arc<Mutex<PostView>>,
    _observer: Observer<StoreEvent>,
}

impl SharedPostView {
    /// Seeds a view from the existing history, then subscribes to commit
    /// notifications and merges new history as it arrives. The subscriber is
    /// torn down when the returned handle drops.
    pub fn attach(db: &Db) -> anyhow::Result<Self> {
        let mut seeded = PostView::new();
        let backlog = db.changes_since(ChangeToken::default())?;
        if !backlog.is_empty() {
            seeded
                .apply(&backlog)
                .map_err(|e| anyhow::anyhow!("failed to seed view: {e}"))?;
        }

        let view = Arc::new(Mutex::new(seeded));
        let thread_view = view.clone();
        let thread_db = db.clone();
        let observer = db.observe(move |_event| {
            let mut view = match thread_view.lock() {
                Ok(view) => view,
                Err(_) => return,
            };
            if let Err(err) = view.drain_history(&thread_db) {
                log::warn!("history merge failed: {err}");
            }
        });

        Ok(Self {
            view,
            _observer: observer,
        })
    }

    pub fn posts(&self) -> Vec<Post> {
        self.view.lock().map(|view| view.posts()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.view.lock().map(|view| view.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_token(&self) -> ChangeToken {
        self.view
            .lock()
            .map(|view| view.last_token())
            .unwrap_or_default()
    }
}
