use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Post;

/// The placeholder test API the mirror pulls from. The whole collection comes
/// back in one response; there is no pagination.
pub const POSTS_URL: &str = "https://jsonplaceholder.typicode.com/posts";

/// A post as it appears on the wire. `title` and `body` are required: a
/// missing or null field is a decode error, not an empty-string default.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub user_id: i64,
    pub id: i64,
    pub title: String,
    pub body: String,
}

/// Explicit wire-to-row mapping, checked at compile time.
impl From<&PostRecord> for Post {
    fn from(record: &PostRecord) -> Self {
        Post {
            id: record.id,
            user_id: record.user_id,
            title: record.title.clone(),
            body: record.body.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    #[error("response body is not a JSON array of posts: {0}")]
    Malformed(#[source] serde_json::Error),
}

pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// HTTP client seam. Implement this to swap the transport out, most usefully
/// for tests that must not touch the network.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, String>;
}

/// Production client over reqwest's blocking API, relying on the client's
/// default timeouts.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Downloads the post collection. Purely functional with respect to local
/// state; the importer owns all writes.
pub struct Fetcher {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Issues exactly one GET against the configured URL. No retries. Any
    /// status outside [200,300) is rejected before the body is looked at.
    pub fn fetch(&self) -> Result<Vec<PostRecord>, FetchError> {
        log::debug!("GET {}", self.url);
        let response = self.client.get(&self.url).map_err(FetchError::Transport)?;

        if !(200u16..300).contains(&response.status) {
            return Err(FetchError::UnexpectedStatus(response.status));
        }

        serde_json::from_slice(&response.body).map_err(FetchError::Malformed)
    }
}
