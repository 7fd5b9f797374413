//! Guest and logged-in sessions
//!
//! A session owns its own HTTP client with a cookie store, so that the login
//! cookie is sent with every request made through it. Entities carry an
//! `Arc<Session>` inside their [`Connection`] and use it for authenticated
//! actions.
//!
//! # Components
//!
//! - `Session`: Login, authenticity token, the logged-in user
//! - `actions`: Kudos, comments, subscriptions, bookmarks and collections
//! - `collections`: The logged-in user's subscriptions, bookmarks and history

pub mod actions;
mod collections;

pub use actions::{BookmarkOptions, Commenter, Subscribable};
pub use collections::{BookmarkedWork, HistoryEntry, HistoryOptions, Subscription};

use crate::requester::document::{attr_of, find_first};
use crate::requester::{Connection, Gateway};
use crate::users::User;
use crate::{Ao3Error, Result};
use collections::CollectionCache;
use reqwest::{Client, StatusCode};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// A guest or logged-in session
#[derive(Debug)]
pub struct Session {
    gateway: Arc<Gateway>,
    client: Client,
    username: String,
    authed: bool,
    authenticity_token: RwLock<Option<String>>,
    cache: CollectionCache,
}

impl Session {
    /// Creates a guest session
    ///
    /// Guests can leave kudos and comments (with a name and email). The
    /// authenticity token is fetched on the first [`refresh_auth_token`](Self::refresh_auth_token).
    pub fn guest(gateway: Arc<Gateway>) -> Result<Self> {
        let client = gateway.session_client()?;
        Ok(Self {
            gateway,
            client,
            username: String::new(),
            authed: false,
            authenticity_token: RwLock::new(None),
            cache: CollectionCache::default(),
        })
    }

    /// Logs in with a username and password
    ///
    /// # Arguments
    ///
    /// * `gateway` - The shared gateway
    /// * `username` - Archive username
    /// * `password` - Archive password
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - The archive accepted the credentials
    /// * `Err(Ao3Error::Login)` - The login form was rejected
    /// * `Err(Ao3Error::UnexpectedResponse)` - The login page had no token
    pub async fn login(gateway: Arc<Gateway>, username: &str, password: &str) -> Result<Self> {
        let mut session = Self::guest(gateway)?;
        session.username = username.to_string();

        let login_url = session.gateway.url("/users/login")?;
        let page = session.gateway.get(login_url.clone(), Some(&session)).await?;
        let token = form_token(&page.body)
            .ok_or_else(|| Ao3Error::unexpected("Login page has no authenticity token"))?;

        let form = vec![
            ("user[login]".to_string(), username.to_string()),
            ("user[password]".to_string(), password.to_string()),
            ("authenticity_token".to_string(), token.clone()),
        ];
        let response = session
            .gateway
            .post_form(login_url, form, &[], &[], Some(&session))
            .await?;
        if response.status != StatusCode::FOUND {
            debug!(username, status = response.status.as_u16(), "Login rejected");
            return Err(Ao3Error::Login("Invalid username or password".to_string()));
        }

        session.authed = true;
        session.set_authenticity_token(Some(token));
        info!(username, "Logged in");
        Ok(session)
    }

    pub fn is_authed(&self) -> bool {
        self.authed
    }

    /// Empty for guests
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The cookie-carrying client requests through this session use
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn authenticity_token(&self) -> Option<String> {
        self.authenticity_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_authenticity_token(&self, token: Option<String>) {
        *self
            .authenticity_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Fetches a fresh authenticity token
    ///
    /// Logged-in sessions read it from their profile page, guests from the
    /// front page. Call this after an `Ao3Error::Auth` from an action.
    pub async fn refresh_auth_token(&self) -> Result<String> {
        let path = if self.authed {
            format!("/users/{}", self.username)
        } else {
            "/".to_string()
        };
        let response = self.gateway.get(self.gateway.url(&path)?, Some(self)).await?;
        let token = form_token(&response.body)
            .ok_or_else(|| Ao3Error::unexpected("Couldn't refresh token"))?;
        self.set_authenticity_token(Some(token.clone()));
        debug!(authed = self.authed, "Authenticity token refreshed");
        Ok(token)
    }

    /// URL of the logged-in user's profile
    pub fn url(&self) -> Result<url::Url> {
        self.gateway.url(&format!("/users/{}", self.username))
    }

    /// A connection that acts through this session
    pub fn connection(self: &Arc<Self>) -> Connection {
        Connection::new(self.gateway.clone(), Some(self.clone()))
    }

    /// The logged-in user, unloaded
    pub fn user(self: &Arc<Self>) -> Result<User> {
        if !self.authed {
            return Err(Ao3Error::Auth("Guest sessions have no user".to_string()));
        }
        Ok(User::unloaded(&self.username, self.connection()))
    }

    /// Forgets every collection loaded so far
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// The value of the first `authenticity_token` form field on a page
fn form_token(body: &str) -> Option<String> {
    let document = scraper::Html::parse_document(body);
    attr_of(&document, "input[name='authenticity_token']", "value").or_else(|| {
        find_first(&document, "meta[name='csrf-token']")
            .and_then(|meta| meta.value().attr("content"))
            .map(str::to_string)
    })
}
