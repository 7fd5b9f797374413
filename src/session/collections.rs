//! The logged-in user's own listings
//!
//! Subscriptions and bookmarks can be loaded page by page or all pages at
//! once through the worker pool. Reading history and marked-for-later
//! listings are long, so they pause between pages and can wait out a 429
//! instead of failing.

use crate::launch::load_pages;
use crate::requester::document::{
    children, count_before, find_all, find_all_in, find_first, find_in, next_element, page_count,
    parse_count, text_of, trimmed_text,
};
use crate::requester::Connection;
use crate::series::Series;
use crate::session::Session;
use crate::url::{last_segment_id, work_id_from_url};
use crate::users::User;
use crate::works::Work;
use crate::{Ao3Error, Result};
use chrono::NaiveDate;
use scraper::Html;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One entry of the subscriptions listing
#[derive(Debug, Clone)]
pub enum Subscription {
    Work(Work),
    Series(Series),
    User(User),
}

/// A bookmarked work and whether the bookmark recommends it
#[derive(Debug, Clone)]
pub struct BookmarkedWork {
    pub work: Work,
    pub recommended: bool,
}

/// A work from the reading history
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub work: Work,
    pub visits: u32,
    pub last_visited: Option<NaiveDate>,
}

/// Pacing for the reading history
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Pause between pages
    pub page_sleep: Duration,
    /// Zero-based page to start from
    pub start_page: u32,
    /// Zero-based page to stop after
    pub max_pages: Option<u32>,
    /// Wait this long and retry when rate limited; `None` fails instead
    pub retry_sleep: Option<Duration>,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            page_sleep: Duration::from_secs(3),
            start_page: 0,
            max_pages: None,
            retry_sleep: Some(Duration::from_secs(60)),
        }
    }
}

/// Listings already loaded by a session
#[derive(Debug, Default)]
pub(crate) struct CollectionCache {
    subscriptions: Mutex<Option<Vec<Subscription>>>,
    bookmarks: Mutex<Option<Vec<BookmarkedWork>>>,
    history: Mutex<Option<Vec<HistoryEntry>>>,
}

impl CollectionCache {
    pub(crate) fn clear(&self) {
        *lock(&self.subscriptions) = None;
        *lock(&self.bookmarks) = None;
        *lock(&self.history) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Every subscription of the logged-in user, loaded once and cached
    ///
    /// With `threaded`, all pages are fetched through the worker pool;
    /// entries keep page order either way.
    pub async fn get_subscriptions(self: &Arc<Self>, threaded: bool) -> Result<Vec<Subscription>> {
        if let Some(cached) = lock(&self.cache.subscriptions).clone() {
            return Ok(cached);
        }
        let conn = self.authed_connection()?;
        let path = format!("/users/{}/subscriptions", self.username);
        let pages = listing_pages(&conn, &path).await?;

        let loader_conn = conn.clone();
        let subscriptions = load_pages(pages, threaded, self.max_workers(), move |page| {
            let conn = loader_conn.clone();
            let path = format!("{}?page={}", path, page);
            async move {
                let response = conn.get(conn.url(&path)?).await?;
                Ok(parse_subscriptions(&response.body, &conn))
            }
        })
        .await?;

        info!(count = subscriptions.len(), "Subscriptions loaded");
        *lock(&self.cache.subscriptions) = Some(subscriptions.clone());
        Ok(subscriptions)
    }

    pub async fn get_work_subscriptions(self: &Arc<Self>, threaded: bool) -> Result<Vec<Work>> {
        Ok(self
            .get_subscriptions(threaded)
            .await?
            .into_iter()
            .filter_map(|subscription| match subscription {
                Subscription::Work(work) => Some(work),
                _ => None,
            })
            .collect())
    }

    pub async fn get_series_subscriptions(self: &Arc<Self>, threaded: bool) -> Result<Vec<Series>> {
        Ok(self
            .get_subscriptions(threaded)
            .await?
            .into_iter()
            .filter_map(|subscription| match subscription {
                Subscription::Series(series) => Some(series),
                _ => None,
            })
            .collect())
    }

    pub async fn get_user_subscriptions(self: &Arc<Self>, threaded: bool) -> Result<Vec<User>> {
        Ok(self
            .get_subscriptions(threaded)
            .await?
            .into_iter()
            .filter_map(|subscription| match subscription {
                Subscription::User(user) => Some(user),
                _ => None,
            })
            .collect())
    }

    /// Every bookmarked work of the logged-in user, loaded once and cached
    pub async fn get_bookmarks(self: &Arc<Self>, threaded: bool) -> Result<Vec<BookmarkedWork>> {
        if let Some(cached) = lock(&self.cache.bookmarks).clone() {
            return Ok(cached);
        }
        let conn = self.authed_connection()?;
        let path = format!("/users/{}/bookmarks", self.username);
        let pages = listing_pages(&conn, &path).await?;

        let loader_conn = conn.clone();
        let loaded = load_pages(pages, threaded, self.max_workers(), move |page| {
            let conn = loader_conn.clone();
            let path = format!("{}?page={}", path, page);
            async move {
                let response = conn.get(conn.url(&path)?).await?;
                Ok(parse_bookmarks(&response.body, &conn))
            }
        })
        .await?;

        let mut seen = HashSet::new();
        let bookmarks: Vec<BookmarkedWork> = loaded
            .into_iter()
            .filter(|bookmark| seen.insert(bookmark.work.id()))
            .collect();
        info!(count = bookmarks.len(), "Bookmarks loaded");
        *lock(&self.cache.bookmarks) = Some(bookmarks.clone());
        Ok(bookmarks)
    }

    /// Number of bookmarks, from the heading of the bookmarks page
    pub async fn bookmark_count(self: &Arc<Self>) -> Result<u64> {
        let conn = self.authed_connection()?;
        let url = conn.url(&format!("/users/{}/bookmarks?page=1", self.username))?;
        let response = conn.get(url).await?;
        let document = Html::parse_document(&response.body);
        let heading = text_of(&document, "div.bookmarks-index.dashboard.filtered.region h2");
        Ok(count_before(&heading, "Bookmark"))
    }

    /// The reading history, oldest page last
    ///
    /// Pages are fetched one at a time with a pause in between; a 429 is
    /// waited out when `options.retry_sleep` is set.
    pub async fn get_history(self: &Arc<Self>, options: &HistoryOptions) -> Result<Vec<HistoryEntry>> {
        if let Some(cached) = lock(&self.cache.history).clone() {
            return Ok(cached);
        }
        let conn = self.authed_connection()?;
        let path = format!("/users/{}/readings", self.username);
        let pages = listing_pages(&conn, &path).await?;

        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut seen = HashSet::new();
        for page in options.start_page..pages {
            let url = conn.url(&format!("{}?page={}", path, page + 1))?;
            let body = get_with_retry(&conn, url, options.retry_sleep).await?;
            for entry in parse_history(&body, &conn) {
                if seen.insert(entry.work.id()) {
                    history.push(entry);
                }
            }
            debug!(page = page + 1, pages, "History page loaded");

            if options.max_pages.is_some_and(|max| page >= max) {
                break;
            }
            if !options.page_sleep.is_zero() {
                tokio::time::sleep(options.page_sleep).await;
            }
        }

        *lock(&self.cache.history) = Some(history.clone());
        Ok(history)
    }

    /// Every work marked for later
    ///
    /// # Arguments
    ///
    /// * `page_sleep` - Pause between pages
    /// * `retry_sleep` - Wait after a 429 before retrying the page
    pub async fn get_marked_for_later(
        self: &Arc<Self>,
        page_sleep: Duration,
        retry_sleep: Duration,
    ) -> Result<Vec<Work>> {
        let conn = self.authed_connection()?;
        let path = format!("/users/{}/readings", self.username);

        let first = conn.url(&format!("{}?page=1&show=to-read", path))?;
        let body = get_with_retry(&conn, first, Some(retry_sleep)).await?;
        let pages = page_count(&Html::parse_document(&body), "ol.pagination.actions");

        let mut works = parse_marked_for_later(&body, &conn);
        for page in 2..=pages {
            tokio::time::sleep(page_sleep).await;
            let url = conn.url(&format!("{}?page={}&show=to-read", path, page))?;
            let body = get_with_retry(&conn, url, Some(retry_sleep)).await?;
            works.extend(parse_marked_for_later(&body, &conn));
        }
        Ok(works)
    }

    /// The logged-in user's statistics for `year`, or for all years
    ///
    /// Keys are the statistic labels in snake case, e.g. `subscriptions`
    /// or `word_count`.
    pub async fn get_statistics(self: &Arc<Self>, year: Option<i32>) -> Result<BTreeMap<String, u64>> {
        let conn = self.authed_connection()?;
        let year = year.map_or_else(|| "All+Years".to_string(), |year| year.to_string());
        let url = conn.url(&format!("/users/{}/stats?year={}", self.username, year))?;
        let response = conn.get(url).await?;
        Ok(parse_statistics(&response.body))
    }

    fn authed_connection(self: &Arc<Self>) -> Result<Connection> {
        if !self.authed {
            return Err(Ao3Error::Auth(
                "This listing needs a logged-in session".to_string(),
            ));
        }
        Ok(Session::connection(self))
    }

    fn max_workers(&self) -> Option<usize> {
        self.gateway.config().pool.max_workers
    }
}

/// Number of pages of a user listing
async fn listing_pages(conn: &Connection, path: &str) -> Result<u32> {
    let response = conn.get(conn.url(&format!("{}?page=1", path))?).await?;
    Ok(page_count(
        &Html::parse_document(&response.body),
        "ol[title='pagination']",
    ))
}

/// GET that waits out rate limiting when `retry_sleep` is set
async fn get_with_retry(
    conn: &Connection,
    url: url::Url,
    retry_sleep: Option<Duration>,
) -> Result<String> {
    loop {
        match conn.get(url.clone()).await {
            Ok(response) => return Ok(response.body),
            Err(e) if e.is_rate_limited() => match retry_sleep {
                Some(pause) => {
                    warn!(%url, seconds = pause.as_secs(), "Rate limited, retrying later");
                    tokio::time::sleep(pause).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

fn parse_subscriptions(body: &str, conn: &Connection) -> Vec<Subscription> {
    let document = Html::parse_document(body);
    let Some(list) = find_first(&document, "dl.subscription.index.group") else {
        return Vec::new();
    };

    let mut subscriptions = Vec::new();
    for dt in children(list, Some("dt")) {
        let mut authors = Vec::new();
        let mut entry = None;
        for link in find_all_in(dt, "a") {
            let name = trimmed_text(link);
            let href = link.value().attr("href").unwrap_or_default();
            if link.value().attr("rel") == Some("author") {
                authors.push(name);
            } else if href.starts_with("/works") {
                if let Some(id) = work_id_from_url(href) {
                    let work = Work::unloaded(id, conn.clone());
                    work.cache().title.seed(name);
                    entry = Some(Subscription::Work(work));
                }
            } else if href.starts_with("/users") {
                entry = Some(Subscription::User(User::unloaded(&name, conn.clone())));
            } else if let Some(id) = last_segment_id(href) {
                let series = Series::unloaded(id, conn.clone());
                series.cache().name.seed(name);
                entry = Some(Subscription::Series(series));
            }
        }

        match entry {
            Some(Subscription::Work(work)) => {
                work.cache().authors.seed(authors);
                subscriptions.push(Subscription::Work(work));
            }
            Some(Subscription::Series(series)) => {
                series.cache().creators.seed(authors);
                subscriptions.push(Subscription::Series(series));
            }
            Some(user) => subscriptions.push(user),
            None => warn!("Subscription entry without a recognisable link"),
        }
    }
    subscriptions
}

fn parse_bookmarks(body: &str, conn: &Connection) -> Vec<BookmarkedWork> {
    let document = Html::parse_document(body);
    let mut bookmarks = Vec::new();
    for item in find_all(&document, "ol.bookmark.index.group > li.bookmark") {
        let Some(heading) = find_in(item, "h4") else {
            continue;
        };

        let mut authors = Vec::new();
        let mut work = None;
        for link in find_all_in(heading, "a") {
            let href = link.value().attr("href").unwrap_or_default();
            if link.value().attr("rel") == Some("author") {
                authors.push(trimmed_text(link));
            } else if href.starts_with("/works") {
                work = work_id_from_url(href).map(|id| (id, trimmed_text(link)));
            }
        }

        let recommended = find_in(item, "p")
            .and_then(|p| find_in(p, "span[title='Rec']"))
            .is_some();
        if let Some((id, title)) = work {
            let work = Work::unloaded(id, conn.clone());
            work.cache().title.seed(title);
            work.cache().authors.seed(authors);
            bookmarks.push(BookmarkedWork { work, recommended });
        }
    }
    bookmarks
}

fn parse_history(body: &str, conn: &Connection) -> Vec<HistoryEntry> {
    let document = Html::parse_document(body);
    let mut entries = Vec::new();
    for item in find_all(&document, "ol.reading.work.index.group li[role='article']") {
        let work = find_in(item, "h4").and_then(|heading| {
            find_all_in(heading, "a").into_iter().find_map(|link| {
                let href = link.value().attr("href")?;
                if !href.starts_with("/works") {
                    return None;
                }
                Some((work_id_from_url(href)?, trimmed_text(link)))
            })
        });

        let mut visits = 1;
        let mut last_visited = None;
        for viewed in find_all_in(item, "h4.viewed.heading") {
            let (count, date) = parse_visit(&trimmed_text(viewed));
            visits = count.unwrap_or(visits);
            last_visited = date.or(last_visited);
        }

        if let Some((id, title)) = work {
            let work = Work::unloaded(id, conn.clone());
            work.cache().title.seed(title);
            entries.push(HistoryEntry {
                work,
                visits,
                last_visited,
            });
        }
    }
    entries
}

/// Reads "Last visited: 02 Oct 2023 ... Visited 3 times"
fn parse_visit(text: &str) -> (Option<u32>, Option<NaiveDate>) {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut visits = None;
    let mut date = None;
    for (i, word) in words.iter().enumerate() {
        if word.eq_ignore_ascii_case("visited:") {
            date = words
                .get(i + 1..i + 4)
                .and_then(|parts| NaiveDate::parse_from_str(&parts.join(" "), "%d %b %Y").ok());
        } else if *word == "Visited" {
            visits = words.get(i + 1).and_then(|count| count.parse().ok());
        }
    }
    (visits, date)
}

fn parse_marked_for_later(body: &str, conn: &Connection) -> Vec<Work> {
    let document = Html::parse_document(body);
    find_all(&document, "li[role='article']")
        .into_iter()
        .filter_map(|item| {
            let link = find_in(item, "h4 a")?;
            let id = work_id_from_url(link.value().attr("href")?)?;
            let work = Work::unloaded(id, conn.clone());
            work.cache().title.seed(trimmed_text(link));
            Some(work)
        })
        .collect()
}

fn parse_statistics(body: &str) -> BTreeMap<String, u64> {
    let document = Html::parse_document(body);
    let mut statistics = BTreeMap::new();
    let Some(list) = find_first(&document, "dl.statistics.meta.group") else {
        return statistics;
    };

    for dt in find_all_in(list, "dt") {
        let label = trimmed_text(dt);
        let name = label
            .trim_end_matches(':')
            .to_lowercase()
            .replace(' ', "_");
        let Some(value) = next_element(dt).map(trimmed_text) else {
            continue;
        };
        let value = value.replace(',', "");
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            statistics.insert(name, parse_count(&value));
        }
    }
    statistics
}
