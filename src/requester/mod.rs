//! Request layer shared by every entity
//!
//! # Components
//!
//! - `RequestBudget`: Sliding-window rate limiter awaited before each request
//! - `Gateway`: Owns the HTTP client and budget, sends requests, maps 429
//! - `Connection`: What an entity holds: the gateway plus an optional session
//! - `document`: CSS query helpers used by every parser in the crate

mod budget;
pub mod document;
mod gateway;

pub use budget::{RequestBudget, ARCHIVE_REQUESTS_PER_WINDOW, DEFAULT_WINDOW};
pub use gateway::{build_http_client, ArchiveRequest, Gateway, RawResponse, MAX_REDIRECTS};

use crate::session::Session;
use crate::state::Snapshot;
use crate::{Ao3Error, Result};
use std::sync::Arc;
use url::Url;

/// An entity's handle on the archive
///
/// Cloning is cheap; every clone shares the same gateway (and therefore the
/// same request budget) and the same session.
#[derive(Debug, Clone)]
pub struct Connection {
    gateway: Arc<Gateway>,
    session: Option<Arc<Session>>,
}

impl Connection {
    pub fn new(gateway: Arc<Gateway>, session: Option<Arc<Session>>) -> Self {
        Self { gateway, session }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.session = session;
    }

    /// The session, required to be logged in
    pub fn authed_session(&self) -> Result<&Arc<Session>> {
        match &self.session {
            Some(session) if session.is_authed() => Ok(session),
            _ => Err(Ao3Error::Auth("Invalid session".to_string())),
        }
    }

    /// Resolves an archive path against the gateway's base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        self.gateway.url(path)
    }

    /// GET with this connection's session
    pub async fn get(&self, url: Url) -> Result<RawResponse> {
        self.gateway.get(url, self.session.as_deref()).await
    }

    /// Fetches `url` into a new snapshot
    pub async fn fetch(&self, url: Url) -> Result<Snapshot> {
        self.gateway
            .get_document(url, self.session.as_deref())
            .await
    }

    /// Sends an arbitrary request with this connection's session
    pub async fn send(&self, request: ArchiveRequest) -> Result<RawResponse> {
        self.gateway.send(request, self.session.as_deref()).await
    }

    /// POSTs a form without following redirects
    pub async fn post_form(
        &self,
        url: Url,
        form: Vec<(String, String)>,
        headers: &[(&str, &str)],
    ) -> Result<RawResponse> {
        self.gateway
            .post_form(url, form, headers, &[], self.session.as_deref())
            .await
    }

    /// Fetches a binary resource with this connection's session
    pub async fn download(&self, url: Url) -> Result<Vec<u8>> {
        self.gateway.download(url, self.session.as_deref()).await
    }

    /// Absolute form of an archive path, for comparing against `Location`
    pub fn absolute(&self, path: &str) -> String {
        self.gateway.absolute(path)
    }
}

impl From<Arc<Gateway>> for Connection {
    fn from(gateway: Arc<Gateway>) -> Self {
        Self::new(gateway, None)
    }
}
