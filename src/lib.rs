//! ao3-client: a lazy, rate-limited client for the Archive of Our Own
//!
//! This crate models the archive's works, chapters, series, users and comments
//! as in-memory objects that are populated on demand by fetching and parsing
//! the site's HTML pages. Every request passes through a shared
//! [`RequestBudget`](requester::RequestBudget) owned by the
//! [`Gateway`](requester::Gateway), derived attributes are memoized against
//! the snapshot they were computed from, and comment threads are rebuilt into
//! an arena that splices independently fetched comments into their true
//! position.

pub mod comments;
pub mod config;
pub mod launch;
pub mod requester;
pub mod search;
pub mod series;
pub mod session;
pub mod state;
pub mod storage;
pub mod url;
pub mod users;
pub mod works;

use thiserror::Error;

/// Main error type for archive operations
#[derive(Debug, Error)]
pub enum Ao3Error {
    #[error("We are being rate-limited. Try again in a while or reduce the number of requests.")]
    RateLimited,

    #[error("{0} isn't loaded. Have you tried calling reload()?")]
    Unloaded(String),

    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("You have already left this comment here")]
    DuplicateComment,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Couldn't find a pseud to act as: {0}")]
    Pseud(String),

    #[error("Bookmark error: {0}")]
    Bookmark(String),

    #[error("Collection error: {0}")]
    Collect(String),

    #[error("Not subscribed to {0}")]
    NotSubscribed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

impl Ao3Error {
    pub(crate) fn unloaded(what: &str) -> Self {
        Self::Unloaded(what.to_string())
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// True for the error an upstream HTTP 429 turns into
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, Ao3Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use comments::{Comment, CommentRef, Commentable};
pub use config::ClientConfig;
pub use launch::{launch, Launched, Mode, WorkerPool};
pub use requester::{Connection, Gateway, RequestBudget};
pub use search::{Constraint, Search, SearchQuery};
pub use series::Series;
pub use storage::{ReferenceData, SqliteResourceStore};
pub use session::Session;
pub use users::User;
pub use works::{Chapter, Work};
