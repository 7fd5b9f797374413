//! Series of works
//!
//! A series page lists its creators, dates and stats in a definition list
//! and its works as listing entries. Works come back unloaded, seeded from
//! their entries.

use crate::requester::document::{
    attr_of, csrf_token, find_all, find_all_in, find_first, find_in, parse_count, trimmed_text,
};
use crate::requester::{Connection, RawResponse};
use crate::session::actions::{self, BookmarkOptions, Subscribable};
use crate::session::Session;
use crate::state::{Memo, Snapshot};
use crate::url::last_segment_id;
use crate::users::User;
use crate::works::{work_from_banner, Work};
use crate::{Ao3Error, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::debug;
use url::Url;

const SERIES_META: &str = "dl.series.meta.group";
const SUBSCRIBE_FORM: &str = "form[data-create-value='Subscribe']";

#[derive(Debug, Clone, Default)]
pub(crate) struct SeriesCache {
    pub(crate) name: Memo<String>,
    pub(crate) creators: Memo<Vec<String>>,
    series_begun: Memo<Option<NaiveDate>>,
    series_updated: Memo<Option<NaiveDate>>,
    words: Memo<u64>,
    nworks: Memo<u64>,
    complete: Memo<bool>,
    description: Memo<String>,
    notes: Memo<String>,
    nbookmarks: Memo<u64>,
    work_list: Memo<Vec<Work>>,
    authenticity_token: Memo<Option<String>>,
    is_subscribed: Memo<bool>,
    subscription_id: Memo<Option<u64>>,
    bookmark_id: Memo<Option<u64>>,
}

/// A series on the archive
#[derive(Debug, Clone)]
pub struct Series {
    id: u64,
    conn: Connection,
    snapshot: Option<Snapshot>,
    cache: SeriesCache,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Series {
    /// Creates a series handle, loading its page when `load` is set
    ///
    /// # Returns
    ///
    /// * `Ok(Series)` - The series
    /// * `Err(Ao3Error::InvalidId)` - There is no series `id`
    pub async fn new(id: u64, conn: Connection, load: bool) -> Result<Self> {
        let mut series = Self::unloaded(id, conn);
        if load {
            series.reload().await?;
        }
        Ok(series)
    }

    pub fn unloaded(id: u64, conn: Connection) -> Self {
        Self {
            id,
            conn,
            snapshot: None,
            cache: SeriesCache::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.conn.set_session(session);
    }

    pub(crate) fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    /// Fetches the series page and replaces the snapshot
    pub async fn reload(&mut self) -> Result<()> {
        let url = self.url()?;
        let response = self.conn.get(url).await?;
        if response.status == StatusCode::NOT_FOUND || response.body.contains("Error 404") {
            return Err(Ao3Error::InvalidId(format!("Cannot find series {}", self.id)));
        }
        self.snapshot = Some(response.into_snapshot());
        debug!(id = self.id, "Series reloaded");
        Ok(())
    }

    fn resolve<T: Clone>(
        &self,
        memo: &Memo<T>,
        name: &str,
        compute: impl FnOnce(&Html) -> T,
    ) -> Result<T> {
        memo.resolve(self.snapshot.as_ref(), name, |document| Ok(compute(document)))
    }

    pub fn url(&self) -> Result<Url> {
        self.conn.url(&format!("/series/{}", self.id))
    }

    pub fn name(&self) -> Result<String> {
        self.resolve(&self.cache.name, "name", |document| {
            find_first(document, "div.series-show.region h2")
                .map(|heading| trimmed_text(heading).replace(['\t', '\n'], ""))
                .unwrap_or_default()
        })
    }

    /// Creator usernames
    pub fn creators(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.creators, "creators", |document| {
            find_first(document, SERIES_META)
                .map(|meta| {
                    find_all_in(meta, "a[rel='author']")
                        .into_iter()
                        .map(trimmed_text)
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Creators as unloaded users
    pub fn creator_users(&self) -> Result<Vec<User>> {
        Ok(self
            .creators()?
            .iter()
            .map(|name| User::unloaded(name, self.conn.clone()))
            .collect())
    }

    pub fn series_begun(&self) -> Result<Option<NaiveDate>> {
        self.resolve(&self.cache.series_begun, "series_begun", |document| {
            meta_date(document, "Series Begun:")
        })
    }

    pub fn series_updated(&self) -> Result<Option<NaiveDate>> {
        self.resolve(&self.cache.series_updated, "series_updated", |document| {
            meta_date(document, "Series Updated:")
        })
    }

    pub fn words(&self) -> Result<u64> {
        self.resolve(&self.cache.words, "words", |document| {
            meta_count(document, "Words:")
        })
    }

    /// Number of works in the series
    pub fn nworks(&self) -> Result<u64> {
        self.resolve(&self.cache.nworks, "nworks", |document| {
            meta_count(document, "Works:")
        })
    }

    pub fn complete(&self) -> Result<bool> {
        self.resolve(&self.cache.complete, "complete", |document| {
            meta_value(document, "Complete:").as_deref() == Some("Yes")
        })
    }

    pub fn description(&self) -> Result<String> {
        self.resolve(&self.cache.description, "description", |document| {
            meta_value(document, "Description:").unwrap_or_default()
        })
    }

    pub fn notes(&self) -> Result<String> {
        self.resolve(&self.cache.notes, "notes", |document| {
            meta_value(document, "Notes:").unwrap_or_default()
        })
    }

    pub fn nbookmarks(&self) -> Result<u64> {
        self.resolve(&self.cache.nbookmarks, "nbookmarks", |document| {
            meta_count(document, "Bookmarks:")
        })
    }

    /// Works of the series in reading order, unloaded
    pub fn work_list(&self) -> Result<Vec<Work>> {
        let conn = self.conn.clone();
        self.resolve(&self.cache.work_list, "work_list", |document| {
            find_all(document, "ul.series.work.index.group li[role='article']")
                .into_iter()
                .filter(|entry| find_in(*entry, "h4").is_some())
                .filter_map(|entry| work_from_banner(entry, &conn))
                .collect()
        })
    }

    pub fn authenticity_token(&self) -> Result<Option<String>> {
        self.resolve(&self.cache.authenticity_token, "authenticity_token", csrf_token)
    }

    /// Whether the logged-in user is subscribed to this series
    pub fn is_subscribed(&self) -> Result<bool> {
        self.conn.authed_session()?;
        self.resolve(&self.cache.is_subscribed, "is_subscribed", |document| {
            find_first(
                document,
                &format!("{} input[name='commit'][value='Unsubscribe']", SUBSCRIBE_FORM),
            )
            .is_some()
        })
    }

    pub fn subscription_id(&self) -> Result<Option<u64>> {
        if !self.is_subscribed()? {
            return Ok(None);
        }
        self.resolve(&self.cache.subscription_id, "subscription_id", |document| {
            attr_of(document, SUBSCRIBE_FORM, "action").and_then(|action| last_segment_id(&action))
        })
    }

    /// Id of the logged-in user's bookmark of this series
    pub fn bookmark_id(&self) -> Result<Option<u64>> {
        self.resolve(&self.cache.bookmark_id, "bookmark_id", |document| {
            attr_of(document, "div#bookmark-form form", "action")
                .filter(|action| action.starts_with("/bookmark"))
                .and_then(|action| last_segment_id(&action))
        })
    }

    pub async fn subscribe(&self) -> Result<()> {
        actions::subscribe(self).await
    }

    pub async fn unsubscribe(&self) -> Result<RawResponse> {
        actions::unsubscribe(self).await
    }

    pub async fn bookmark(&self, options: &BookmarkOptions) -> Result<()> {
        if !self.is_loaded() {
            return Err(Ao3Error::unloaded("Series"));
        }
        let token = self.authenticity_token()?;
        actions::bookmark(
            &self.conn,
            &format!("/series/{}", self.id),
            token.as_deref(),
            options,
        )
        .await
    }

    pub async fn delete_bookmark(&self) -> Result<()> {
        let bookmark = self
            .bookmark_id()?
            .ok_or_else(|| Ao3Error::Bookmark("You don't have a bookmark here".to_string()))?;
        let token = self.authenticity_token()?;
        actions::delete_bookmark(&self.conn, bookmark, token.as_deref()).await
    }
}

impl Subscribable for Series {
    fn subscribable_type(&self) -> &'static str {
        "Series"
    }

    fn subscribable_id(&self) -> Result<u64> {
        Ok(self.id)
    }

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn subscribable_token(&self) -> Option<String> {
        self.authenticity_token().ok().flatten()
    }

    fn current_subscription_id(&self) -> Result<Option<u64>> {
        self.subscription_id()
    }
}

/// The `dd` following the `dt` labelled `label` in the series meta list
///
/// Nested lists are searched too, so stats such as "Words:" are found.
fn meta_value(document: &Html, label: &str) -> Option<String> {
    let meta = find_first(document, SERIES_META)?;
    definition(meta, label)
}

fn definition(list: ElementRef<'_>, label: &str) -> Option<String> {
    let mut last_label = None;
    for field in find_all_in(list, "dt, dd") {
        match field.value().name() {
            "dt" => last_label = Some(trimmed_text(field)),
            _ if last_label.as_deref() == Some(label) => return Some(trimmed_text(field)),
            _ => {}
        }
    }
    None
}

fn meta_count(document: &Html, label: &str) -> u64 {
    meta_value(document, label)
        .map(|value| parse_count(&value))
        .unwrap_or(0)
}

fn meta_date(document: &Html, label: &str) -> Option<NaiveDate> {
    meta_value(document, label)
        .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::Gateway;

    const SERIES_PAGE: &str = r#"
        <html><head><meta name="csrf-token" content="series-token"></head><body>
        <div class="series-show region">
          <h2 class="heading">
            Saga
          </h2>
          <dl class="series meta group">
            <dt>Creator:</dt><dd><a rel="author" href="/users/ann/pseuds/ann">ann</a>, <a rel="author" href="/users/bo/pseuds/bo">bo</a></dd>
            <dt>Series Begun:</dt><dd>2020-03-01</dd>
            <dt>Series Updated:</dt><dd>2021-11-30</dd>
            <dt>Description:</dt><dd><blockquote class="userstuff"><p>About the saga.</p></blockquote></dd>
            <dt>Stats:</dt>
            <dd><dl class="stats">
              <dt>Words:</dt><dd>45,210</dd>
              <dt>Works:</dt><dd>3</dd>
              <dt>Complete:</dt><dd>Yes</dd>
              <dt>Bookmarks:</dt><dd><a href="/series/8/bookmarks">17</a></dd>
            </dl></dd>
          </dl>
          <ul class="series work index group">
            <li id="work_1" class="work blurb group" role="article">
              <h4 class="heading"><a href="/works/1">Part One</a> by <a rel="author" href="/users/ann/pseuds/ann">ann</a></h4>
            </li>
            <li id="work_2" class="work blurb group" role="article">
              <h4 class="heading"><a href="/works/2">Part Two</a> by <a rel="author" href="/users/ann/pseuds/ann">ann</a></h4>
            </li>
            <li class="work blurb group" role="article"><p>Mystery Work</p></li>
          </ul>
          <div id="bookmark-form"><form action="/bookmarks/555" method="post"></form></div>
        </div>
        </body></html>
    "#;

    fn conn() -> Connection {
        Connection::from(Arc::new(
            Gateway::with_base_url("http://127.0.0.1:9").unwrap(),
        ))
    }

    fn loaded_series() -> Series {
        let mut series = Series::unloaded(8, conn());
        series.snapshot = Some(Snapshot::new(SERIES_PAGE));
        series
    }

    #[test]
    fn test_unloaded_series() {
        let series = Series::unloaded(8, conn());
        assert!(!series.is_loaded());
        assert!(matches!(series.name(), Err(Ao3Error::Unloaded(_))));
        series.cache().name.seed("Seeded".to_string());
        assert_eq!(series.name().unwrap(), "Seeded");
    }

    #[test]
    fn test_series_fields() {
        let series = loaded_series();
        assert_eq!(series.name().unwrap(), "Saga");
        assert_eq!(series.creators().unwrap(), vec!["ann", "bo"]);
        assert_eq!(series.series_begun().unwrap(), NaiveDate::from_ymd_opt(2020, 3, 1));
        assert_eq!(series.series_updated().unwrap(), NaiveDate::from_ymd_opt(2021, 11, 30));
        assert_eq!(series.description().unwrap(), "About the saga.");
        assert_eq!(series.notes().unwrap(), "");
        assert_eq!(series.words().unwrap(), 45210);
        assert_eq!(series.nworks().unwrap(), 3);
        assert!(series.complete().unwrap());
        assert_eq!(series.nbookmarks().unwrap(), 17);
        assert_eq!(series.bookmark_id().unwrap(), Some(555));
        assert_eq!(series.authenticity_token().unwrap().as_deref(), Some("series-token"));
        assert_eq!(series.url().unwrap().as_str(), "http://127.0.0.1:9/series/8");
    }

    #[test]
    fn test_work_list_skips_entries_without_heading() {
        let works = loaded_series().work_list().unwrap();
        let ids: Vec<u64> = works.iter().map(Work::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(works[1].title().unwrap(), "Part Two");
    }

    #[test]
    fn test_subscription_needs_login() {
        let series = loaded_series();
        assert!(matches!(series.is_subscribed(), Err(Ao3Error::Auth(_))));
    }
}
