//! Archive users
//!
//! A user is loaded from three pages: the works listing, the profile and the
//! bookmarks listing. They are fetched concurrently on each reload.

use crate::launch::{launch, load_pages, Mode};
use crate::requester::document::{
    attr_of, count_before, csrf_token, find_all, find_first, find_in, page_count, text_of,
    trimmed_text,
};
use crate::requester::{Connection, RawResponse};
use crate::session::actions::{self, Subscribable};
use crate::session::Session;
use crate::state::{Memo, Snapshot};
use crate::url::last_segment_id;
use crate::works::{work_from_banner, Work};
use crate::{Ao3Error, Result};
use reqwest::StatusCode;
use scraper::Html;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const PROFILE_HEADER: &str = "div.primary.header.module";
const PAGINATION: &str = "ol[title='pagination']";

#[derive(Debug, Clone, Default)]
struct UserCache {
    user_id: Memo<Option<u64>>,
    is_subscribed: Memo<bool>,
    subscription_id: Memo<Option<u64>>,
    bio: Memo<String>,
    avatar_src: Memo<Option<String>>,
    works: Memo<u64>,
    works_pages: Memo<u32>,
    bookmarks: Memo<u64>,
    bookmarks_pages: Memo<u32>,
}

/// The three pages a user is read from
#[derive(Debug, Clone)]
struct UserPages {
    works: Snapshot,
    profile: Snapshot,
    bookmarks: Snapshot,
}

/// A user of the archive
#[derive(Debug, Clone)]
pub struct User {
    username: String,
    conn: Connection,
    pages: Option<UserPages>,
    authenticity_token: Option<String>,
    cache: UserCache,
    work_list: Option<Vec<Work>>,
    bookmark_list: Option<Vec<Work>>,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
    }
}

impl User {
    /// Creates a user handle, loading its pages when `load` is set
    pub async fn new(username: &str, conn: Connection, load: bool) -> Result<Self> {
        let mut user = Self::unloaded(username, conn);
        if load {
            user.reload().await?;
        }
        Ok(user)
    }

    pub fn unloaded(username: &str, conn: Connection) -> Self {
        Self {
            username: username.to_string(),
            conn,
            pages: None,
            authenticity_token: None,
            cache: UserCache::default(),
            work_list: None,
            bookmark_list: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_loaded(&self) -> bool {
        self.pages.is_some()
    }

    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.conn.set_session(session);
    }

    /// Token scraped from the last page loaded
    pub fn authenticity_token(&self) -> Option<&str> {
        self.authenticity_token.as_deref()
    }

    /// Fetches the works, profile and bookmarks pages concurrently
    ///
    /// Loaded work and bookmark lists are dropped, so the next
    /// [`get_works`](Self::get_works) reads them again.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All three pages loaded
    /// * `Err(Ao3Error::InvalidId)` - The archive has no such user; the user
    ///   is left unloaded
    pub async fn reload(&mut self) -> Result<()> {
        let works = self.spawn_fetch("works").await;
        let profile = self.spawn_fetch("profile").await;
        let bookmarks = self.spawn_fetch("bookmarks").await;
        let works = works.join().await??;
        let profile = profile.join().await??;
        let bookmarks = bookmarks.join().await??;

        if [&works, &profile, &bookmarks]
            .iter()
            .any(|response| response.status == StatusCode::NOT_FOUND)
        {
            self.pages = None;
            self.authenticity_token = None;
            self.cache = UserCache::default();
            self.work_list = None;
            self.bookmark_list = None;
            return Err(Ao3Error::InvalidId(format!("Cannot find user {}", self.username)));
        }

        let pages = UserPages {
            works: works.into_snapshot(),
            profile: profile.into_snapshot(),
            bookmarks: bookmarks.into_snapshot(),
        };
        self.authenticity_token = [&pages.bookmarks, &pages.profile, &pages.works]
            .iter()
            .find_map(|page| csrf_token(&*page.document()));
        self.pages = Some(pages);
        self.cache = UserCache::default();
        self.work_list = None;
        self.bookmark_list = None;
        debug!(username = %self.username, "User reloaded");
        Ok(())
    }

    async fn spawn_fetch(&self, page: &str) -> crate::launch::Launched<Result<RawResponse>> {
        let conn = self.conn.clone();
        let path = format!("/users/{}/{}", self.username, page);
        launch(Mode::Background, async move { conn.get(conn.url(&path)?).await }).await
    }

    fn resolve<T: Clone>(
        &self,
        memo: &Memo<T>,
        name: &str,
        page: impl Fn(&UserPages) -> &Snapshot,
        compute: impl FnOnce(&Html) -> T,
    ) -> Result<T> {
        let snapshot = self.pages.as_ref().map(page);
        memo.resolve(snapshot, name, |document| Ok(compute(document)))
    }

    pub fn url(&self) -> Result<Url> {
        self.conn.url(&format!("/users/{}", self.username))
    }

    /// Numeric id of the user, shown only to logged-in sessions
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - The id from the subscribe form
    /// * `Err(Ao3Error::Auth)` - The connection is not logged in
    /// * `Err(Ao3Error::UnexpectedResponse)` - The profile has no subscribe form
    pub fn user_id(&self) -> Result<u64> {
        self.conn.authed_session()?;
        self.resolve(&self.cache.user_id, "user_id", |pages| &pages.profile, |document| {
            attr_of(
                document,
                &format!("{} input[name='subscription[subscribable_id]']", PROFILE_HEADER),
                "value",
            )
            .and_then(|value| value.parse().ok())
        })?
        .ok_or_else(|| Ao3Error::unexpected("Couldn't fetch user ID"))
    }

    /// Whether the logged-in user is subscribed to this user
    pub fn is_subscribed(&self) -> Result<bool> {
        self.conn.authed_session()?;
        self.resolve(&self.cache.is_subscribed, "is_subscribed", |pages| &pages.profile, |document| {
            find_first(
                document,
                &format!("{} input[name='commit'][value='Unsubscribe']", PROFILE_HEADER),
            )
            .is_some()
        })
    }

    pub fn subscription_id(&self) -> Result<Option<u64>> {
        if !self.is_subscribed()? {
            return Ok(None);
        }
        self.resolve(&self.cache.subscription_id, "subscription_id", |pages| &pages.profile, |document| {
            attr_of(document, &format!("{} form", PROFILE_HEADER), "action")
                .and_then(|action| last_segment_id(&action))
        })
    }

    /// Profile bio, empty when the user has none
    pub fn bio(&self) -> Result<String> {
        self.resolve(&self.cache.bio, "bio", |pages| &pages.profile, |document| {
            find_first(document, "div.bio.module")
                .and_then(|bio| find_in(bio, "blockquote.userstuff"))
                .map(trimmed_text)
                .unwrap_or_default()
        })
    }

    /// Number of works by this user
    pub fn works(&self) -> Result<u64> {
        self.resolve(&self.cache.works, "works", |pages| &pages.works, |document| {
            count_before(
                &text_of(document, "div.works-index.dashboard.filtered.region h2"),
                "Work",
            )
        })
    }

    /// Pages in the works listing
    pub fn works_pages(&self) -> Result<u32> {
        self.resolve(&self.cache.works_pages, "works_pages", |pages| &pages.works, |document| {
            page_count(document, PAGINATION)
        })
    }

    /// Number of works this user has bookmarked
    pub fn bookmarks(&self) -> Result<u64> {
        self.resolve(&self.cache.bookmarks, "bookmarks", |pages| &pages.bookmarks, |document| {
            count_before(
                &text_of(document, "div.bookmarks-index.dashboard.filtered.region h2"),
                "Bookmark",
            )
        })
    }

    pub fn bookmarks_pages(&self) -> Result<u32> {
        self.resolve(&self.cache.bookmarks_pages, "bookmarks_pages", |pages| &pages.bookmarks, |document| {
            page_count(document, PAGINATION)
        })
    }

    /// Works by this user, unloaded and seeded from their listing entries
    ///
    /// Loaded once per reload. With `threaded`, every page is fetched through
    /// the worker pool; works keep listing order either way.
    pub async fn get_works(&mut self, threaded: bool) -> Result<Vec<Work>> {
        if let Some(works) = &self.work_list {
            return Ok(works.clone());
        }
        let pages = self.works_pages()?;
        let works = self.load_listing("works", "ol.work.index.group", pages, threaded).await?;
        self.work_list = Some(works.clone());
        Ok(works)
    }

    /// Works this user has bookmarked, unloaded
    pub async fn get_bookmarks(&mut self, threaded: bool) -> Result<Vec<Work>> {
        if let Some(bookmarks) = &self.bookmark_list {
            return Ok(bookmarks.clone());
        }
        let pages = self.bookmarks_pages()?;
        let bookmarks = self
            .load_listing("bookmarks", "ol.bookmark.index.group", pages, threaded)
            .await?;
        self.bookmark_list = Some(bookmarks.clone());
        Ok(bookmarks)
    }

    async fn load_listing(
        &self,
        listing: &str,
        list_css: &str,
        pages: u32,
        threaded: bool,
    ) -> Result<Vec<Work>> {
        let conn = self.conn.clone();
        let base = format!("/users/{}/{}", self.username, listing);
        let entries = format!("{} li[role='article']", list_css);
        let max_workers = conn.gateway().config().pool.max_workers;

        let works = load_pages(pages, threaded, max_workers, move |page| {
            let conn = conn.clone();
            let path = format!("{}?page={}", base, page);
            let entries = entries.clone();
            async move {
                let response = conn.get(conn.url(&path)?).await?;
                Ok(listed_works(&response.body, &entries, &conn))
            }
        })
        .await?;
        info!(username = %self.username, listing, count = works.len(), "Listing loaded");
        Ok(works)
    }

    /// Downloads the profile icon
    ///
    /// # Returns
    ///
    /// `(file name, image bytes)`
    pub async fn get_avatar(&self) -> Result<(String, Vec<u8>)> {
        let src = self
            .resolve(&self.cache.avatar_src, "avatar", |pages| &pages.profile, |document| {
                attr_of(document, "p.icon img", "src")
            })?
            .ok_or_else(|| Ao3Error::unexpected("Profile has no icon"))?;
        let url = self.conn.gateway().base_url().join(&src)?;
        let name = avatar_name(&src);
        let image = self.conn.download(url).await?;
        Ok((name, image))
    }

    pub async fn subscribe(&self) -> Result<()> {
        actions::subscribe(self).await
    }

    pub async fn unsubscribe(&self) -> Result<RawResponse> {
        actions::unsubscribe(self).await
    }
}

impl Subscribable for User {
    fn subscribable_type(&self) -> &'static str {
        "User"
    }

    fn subscribable_id(&self) -> Result<u64> {
        self.user_id()
    }

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn subscribable_token(&self) -> Option<String> {
        self.authenticity_token.clone()
    }

    fn current_subscription_id(&self) -> Result<Option<u64>> {
        self.subscription_id()
    }
}

fn listed_works(body: &str, entries: &str, conn: &Connection) -> Vec<Work> {
    let document = Html::parse_document(body);
    find_all(&document, entries)
        .into_iter()
        .filter(|entry| find_in(*entry, "h4").is_some())
        .filter_map(|entry| work_from_banner(entry, conn))
        .collect()
}

/// File name of an icon URL, without its query string
fn avatar_name(src: &str) -> String {
    let file = src.rsplit('/').next().unwrap_or(src);
    file.split('?').next().unwrap_or(file).to_string()
}
