use serde::{Deserialize, Serialize};

/// A post row as persisted in, and read back from, the Post table.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub body: String,
}

/// Opaque position in the store's change log. Advances strictly monotonically;
/// the default token is the log origin, so everything is "after" it.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChangeToken(pub(crate) i64);

/// One entry of the append-only change history. `new_values` holds the
/// whole-row JSON snapshot written by the owning transaction.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Change {
    pub seq: i64,
    pub transaction_id: String,
    pub post_id: i64,
    pub new_values: String,
}

impl Change {
    pub fn token(&self) -> ChangeToken {
        ChangeToken(self.seq)
    }
}

/// Sent to subscribers after a writer transaction commits. Carries the
/// affected row ids and the log position of the last history entry written.
#[derive(Clone, Debug)]
pub struct StoreEvent {
    pub post_ids: Vec<i64>,
    pub latest: ChangeToken,
}
