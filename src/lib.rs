pub mod db;
pub mod fetch;
pub mod import;
pub mod notifier;
pub mod service;
pub mod view;

pub use db::Db;
pub use fetch::{FetchError, Fetcher, HttpClient, HttpResponse, PostRecord, ReqwestClient};
pub use import::{ImportError, Importer, BATCH_SIZE};
pub use service::{SyncService, UpdateError};
pub use view::{ChangeError, PostView, SharedPostView};
pub use rusqlite;
pub use rusqlite_migration;
