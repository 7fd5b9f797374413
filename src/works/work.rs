use crate::comments::{list_comments, Comment, Commentable};
use crate::requester::document::{
    attr_of, children, count_of, csrf_token, find_all, find_first, find_in, is_error_page,
    paragraphs, text_of, texts_of, trimmed_text,
};
use crate::requester::{Connection, RawResponse};
use crate::series::Series;
use crate::session::actions::{self, BookmarkOptions, Commenter, Subscribable};
use crate::session::Session;
use crate::state::{Memo, Snapshot};
use crate::url::last_segment_id;
use crate::users::User;
use crate::works::Chapter;
use crate::{Ao3Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::StatusCode;
use scraper::Html;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Bodies above this size are logged; the full-work view of a long work is big
const LARGE_PAGE_BYTES: usize = 650_000;

/// Memo slots for every attribute derived from a work page
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkCache {
    pub(crate) title: Memo<String>,
    pub(crate) authors: Memo<Vec<String>>,
    pub(crate) nchapters: Memo<u32>,
    pub(crate) expected_chapters: Memo<Option<u32>>,
    pub(crate) complete: Memo<bool>,
    pub(crate) hits: Memo<u64>,
    pub(crate) kudos: Memo<u64>,
    pub(crate) comments: Memo<u64>,
    pub(crate) bookmarks: Memo<u64>,
    pub(crate) words: Memo<u64>,
    pub(crate) language: Memo<String>,
    pub(crate) restricted: Memo<bool>,
    pub(crate) rating: Memo<Option<String>>,
    pub(crate) warnings: Memo<Vec<String>>,
    pub(crate) categories: Memo<Vec<String>>,
    pub(crate) fandoms: Memo<Vec<String>>,
    pub(crate) relationships: Memo<Vec<String>>,
    pub(crate) characters: Memo<Vec<String>>,
    pub(crate) tags: Memo<Vec<String>>,
    pub(crate) collections: Memo<Vec<String>>,
    pub(crate) series: Memo<Vec<(u64, String)>>,
    pub(crate) summary: Memo<String>,
    pub(crate) start_notes: Memo<String>,
    pub(crate) end_notes: Memo<String>,
    pub(crate) date_published: Memo<Option<NaiveDate>>,
    pub(crate) date_updated: Memo<Option<NaiveDate>>,
    pub(crate) date_edited: Memo<Option<NaiveDateTime>>,
    pub(crate) authenticity_token: Memo<Option<String>>,
    pub(crate) is_subscribed: Memo<bool>,
    pub(crate) subscription_id: Memo<Option<u64>>,
    pub(crate) bookmark_id: Memo<Option<u64>>,
    pub(crate) downloads: Memo<Vec<(String, String)>>,
}

/// A work on the archive
///
/// Created unloaded or loaded; every derived attribute is parsed from the
/// full-work page on first read and served from memory until the next
/// [`reload`](Self::reload). Equality is by id.
#[derive(Debug, Clone)]
pub struct Work {
    id: u64,
    conn: Connection,
    snapshot: Option<Snapshot>,
    chapters: Vec<Chapter>,
    cache: WorkCache,
}

impl PartialEq for Work {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Work {}

impl Work {
    /// Creates a work handle
    ///
    /// # Arguments
    ///
    /// * `id` - Work id
    /// * `conn` - Gateway and optional session
    /// * `load` - Fetch the work page now
    /// * `load_chapters` - Also split the page into chapters
    ///
    /// # Returns
    ///
    /// * `Ok(Work)` - The work, loaded if asked
    /// * `Err(Ao3Error::InvalidId)` - The archive has no such work
    pub async fn new(id: u64, conn: Connection, load: bool, load_chapters: bool) -> Result<Self> {
        let mut work = Self::unloaded(id, conn);
        if load {
            work.reload(load_chapters).await?;
        }
        Ok(work)
    }

    /// A handle that has fetched nothing yet
    pub fn unloaded(id: u64, conn: Connection) -> Self {
        Self {
            id,
            conn,
            snapshot: None,
            chapters: Vec::new(),
            cache: WorkCache::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replaces the session used for later requests and actions
    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.conn.set_session(session);
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn cache(&self) -> &WorkCache {
        &self.cache
    }

    /// Fetches the full-work page, replacing the snapshot and every memo
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Page fetched
    /// * `Err(Ao3Error::InvalidId)` - The archive answered with its 404 page
    /// * `Err(Ao3Error::RateLimited)` - The archive answered 429
    pub async fn reload(&mut self, load_chapters: bool) -> Result<()> {
        self.cache = WorkCache::default();
        self.chapters.clear();

        let url = self.conn.url(&format!(
            "/works/{}?view_adult=true&view_full_work=true",
            self.id
        ))?;
        let response = self.conn.get(url).await?;
        if response.body.len() > LARGE_PAGE_BYTES {
            warn!(id = self.id, bytes = response.body.len(), "Work page is very large");
        }
        if response.status == StatusCode::NOT_FOUND
            || is_error_page(&Html::parse_document(&response.body))
        {
            self.snapshot = None;
            return Err(Ao3Error::InvalidId(format!("Cannot find work {}", self.id)));
        }

        self.snapshot = Some(response.into_snapshot());
        debug!(id = self.id, "Work reloaded");
        if load_chapters {
            self.load_chapters()?;
        }
        Ok(())
    }

    /// Splits the loaded page into chapters; no request is made
    pub fn load_chapters(&mut self) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or_else(|| Ao3Error::unloaded("Work"))?;
        let nchapters = self.nchapters()?;
        let title = self.title()?;
        let token = self.authenticity_token()?;

        let fragments = chapter_fragments(&*snapshot.document(), nchapters);
        self.chapters = fragments
            .into_iter()
            .map(|(chapter_id, html)| {
                Chapter::from_work(
                    chapter_id,
                    self.id,
                    self.conn.clone(),
                    Snapshot::fragment(html),
                    title.clone(),
                    token.clone(),
                )
            })
            .collect();
        debug!(id = self.id, chapters = self.chapters.len(), "Chapters loaded");
        Ok(())
    }

    /// Chapters split out by [`load_chapters`](Self::load_chapters)
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    fn resolve<T: Clone>(
        &self,
        memo: &Memo<T>,
        name: &str,
        compute: impl FnOnce(&Html) -> T,
    ) -> Result<T> {
        memo.resolve(self.snapshot.as_ref(), name, |document| Ok(compute(document)))
    }

    pub fn title(&self) -> Result<String> {
        self.resolve(&self.cache.title, "title", |document| {
            text_of(document, "div.preface.group h2")
        })
    }

    /// Creator usernames, as shown in the byline
    pub fn authors(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.authors, "authors", |document| {
            let byline = text_of(document, "h3.byline.heading").replace('\n', "");
            byline
                .split(", ")
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Creators as unloaded users
    pub fn author_users(&self) -> Result<Vec<User>> {
        Ok(self
            .authors()?
            .iter()
            .map(|name| User::unloaded(name, self.conn.clone()))
            .collect())
    }

    /// Chapters posted so far
    pub fn nchapters(&self) -> Result<u32> {
        self.resolve(&self.cache.nchapters, "nchapters", |document| {
            chapter_counts(&text_of(document, "dd.chapters")).0
        })
    }

    /// Planned chapter count; `None` when the creator left it open
    pub fn expected_chapters(&self) -> Result<Option<u32>> {
        self.resolve(&self.cache.expected_chapters, "expected_chapters", |document| {
            chapter_counts(&text_of(document, "dd.chapters")).1
        })
    }

    pub fn complete(&self) -> Result<bool> {
        self.resolve(&self.cache.complete, "complete", |document| {
            let (posted, expected) = chapter_counts(&text_of(document, "dd.chapters"));
            expected == Some(posted)
        })
    }

    /// "Completed" or "Work in Progress"
    pub fn status(&self) -> Result<&'static str> {
        Ok(if self.complete()? {
            "Completed"
        } else {
            "Work in Progress"
        })
    }

    pub fn oneshot(&self) -> Result<bool> {
        Ok(self.nchapters()? == 1)
    }

    pub fn hits(&self) -> Result<u64> {
        self.resolve(&self.cache.hits, "hits", |document| count_of(document, "dd.hits"))
    }

    pub fn kudos(&self) -> Result<u64> {
        self.resolve(&self.cache.kudos, "kudos", |document| count_of(document, "dd.kudos"))
    }

    pub fn comments(&self) -> Result<u64> {
        self.resolve(&self.cache.comments, "comments", |document| {
            count_of(document, "dd.comments")
        })
    }

    pub fn bookmarks(&self) -> Result<u64> {
        self.resolve(&self.cache.bookmarks, "bookmarks", |document| {
            count_of(document, "dd.bookmarks")
        })
    }

    pub fn words(&self) -> Result<u64> {
        self.resolve(&self.cache.words, "words", |document| count_of(document, "dd.words"))
    }

    pub fn language(&self) -> Result<String> {
        self.resolve(&self.cache.language, "language", |document| {
            let language = text_of(document, "dd.language");
            if language.is_empty() {
                "Unknown".to_string()
            } else {
                language
            }
        })
    }

    /// True if only logged-in users can see the work
    pub fn restricted(&self) -> Result<bool> {
        self.resolve(&self.cache.restricted, "restricted", |document| {
            find_first(document, "img[title='Restricted']").is_some()
        })
    }

    pub fn rating(&self) -> Result<Option<String>> {
        self.resolve(&self.cache.rating, "rating", |document| {
            find_first(document, "dd.rating.tags a").map(trimmed_text)
        })
    }

    pub fn warnings(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.warnings, "warnings", |document| {
            texts_of(document, "dd.warning.tags li a")
        })
    }

    pub fn categories(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.categories, "categories", |document| {
            texts_of(document, "dd.category.tags li a")
        })
    }

    pub fn fandoms(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.fandoms, "fandoms", |document| {
            texts_of(document, "dd.fandom.tags li a")
        })
    }

    pub fn relationships(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.relationships, "relationships", |document| {
            texts_of(document, "dd.relationship.tags li a")
        })
    }

    pub fn characters(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.characters, "characters", |document| {
            texts_of(document, "dd.character.tags li a")
        })
    }

    /// Additional (freeform) tags
    pub fn tags(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.tags, "tags", |document| {
            texts_of(document, "dd.freeform.tags li a")
        })
    }

    pub fn collections(&self) -> Result<Vec<String>> {
        self.resolve(&self.cache.collections, "collections", |document| {
            texts_of(document, "dd.collections a")
        })
    }

    /// Series the work belongs to, as unloaded series with their names seeded
    pub fn series(&self) -> Result<Vec<Series>> {
        let entries = self.resolve(&self.cache.series, "series", |document| {
            find_all(document, "dd.series span.position a")
                .into_iter()
                .filter_map(|link| {
                    let id = last_segment_id(link.value().attr("href")?)?;
                    Some((id, trimmed_text(link)))
                })
                .collect()
        })?;

        Ok(entries
            .into_iter()
            .map(|(id, name)| {
                let series = Series::unloaded(id, self.conn.clone());
                series.cache().name.seed(name);
                series
            })
            .collect())
    }

    pub fn summary(&self) -> Result<String> {
        self.resolve(&self.cache.summary, "summary", |document| {
            text_of(document, "div.preface.group:not(.chapter) blockquote.userstuff")
        })
    }

    /// Notes shown before the first chapter
    pub fn start_notes(&self) -> Result<String> {
        self.resolve(&self.cache.start_notes, "start_notes", |document| {
            find_first(document, "div.preface.group:not(.chapter) > div.notes.module")
                .map(paragraphs)
                .unwrap_or_default()
        })
    }

    /// Notes shown after the last chapter
    pub fn end_notes(&self) -> Result<String> {
        self.resolve(&self.cache.end_notes, "end_notes", |document| {
            find_first(document, "div#work_endnotes")
                .map(paragraphs)
                .unwrap_or_default()
        })
    }

    pub fn date_published(&self) -> Result<Option<NaiveDate>> {
        self.resolve(&self.cache.date_published, "date_published", |document| {
            parse_date(&text_of(document, "dd.published"))
        })
    }

    /// Date of the last chapter update, the publication date if never updated
    pub fn date_updated(&self) -> Result<Option<NaiveDate>> {
        let published = self.date_published()?;
        self.resolve(&self.cache.date_updated, "date_updated", |document| {
            parse_date(&text_of(document, "dd.status")).or(published)
        })
    }

    /// Time of the last edit, read from the download links' timestamp
    pub fn date_edited(&self) -> Result<Option<NaiveDateTime>> {
        let published = self.date_published()?;
        self.resolve(&self.cache.date_edited, "date_edited", |document| {
            find_all(document, "li.download ul a")
                .into_iter()
                .filter_map(|link| link.value().attr("href"))
                .find_map(edit_timestamp)
                .or_else(|| published.and_then(|date| date.and_hms_opt(0, 0, 0)))
        })
    }

    /// The CSRF token of the work page, used by every action on the work
    pub fn authenticity_token(&self) -> Result<Option<String>> {
        self.resolve(&self.cache.authenticity_token, "authenticity_token", csrf_token)
    }

    /// Whether the logged-in user is subscribed to this work
    pub fn is_subscribed(&self) -> Result<bool> {
        self.conn.authed_session()?;
        self.resolve(&self.cache.is_subscribed, "is_subscribed", |document| {
            find_first(
                document,
                "ul.work.navigation.actions li.subscribe input[name='commit'][value='Unsubscribe']",
            )
            .is_some()
        })
    }

    /// Id of the logged-in user's subscription to this work
    pub fn subscription_id(&self) -> Result<Option<u64>> {
        if !self.is_subscribed()? {
            return Ok(None);
        }
        self.resolve(&self.cache.subscription_id, "subscription_id", |document| {
            attr_of(document, "ul.work.navigation.actions li.subscribe form", "action")
                .and_then(|action| last_segment_id(&action))
        })
    }

    /// Id of the logged-in user's bookmark of this work
    pub fn bookmark_id(&self) -> Result<Option<u64>> {
        self.resolve(&self.cache.bookmark_id, "bookmark_id", |document| {
            attr_of(document, "div#bookmark-form form", "action")
                .filter(|action| action.starts_with("/bookmarks"))
                .and_then(|action| last_segment_id(&action))
        })
    }

    /// Full text of every loaded chapter, one chapter after another
    pub fn text(&self) -> Result<String> {
        if !self.is_loaded() {
            return Err(Ao3Error::unloaded("Work"));
        }
        let texts = self
            .chapters
            .iter()
            .map(Chapter::text)
            .collect::<Result<Vec<_>>>()?;
        Ok(texts.join("\n"))
    }

    pub fn url(&self) -> Result<Url> {
        self.conn.url(&format!("/works/{}", self.id))
    }

    /// Images of every loaded chapter, keyed by chapter number
    ///
    /// Each image is its `src` and the number of the paragraph it sits in.
    pub fn get_images(&self) -> Result<BTreeMap<u32, Vec<(String, usize)>>> {
        let mut images = BTreeMap::new();
        for chapter in &self.chapters {
            let found = chapter.images()?;
            if !found.is_empty() {
                images.insert(chapter.number()?, found);
            }
        }
        Ok(images)
    }

    /// A summary of the work's metadata as JSON
    pub fn metadata(&self) -> Result<serde_json::Value> {
        let series: Vec<String> = self
            .series()?
            .iter()
            .map(|series| series.name().unwrap_or_default())
            .collect();
        let chapter_titles = self
            .chapters
            .iter()
            .map(Chapter::title)
            .collect::<Result<Vec<_>>>()?;

        Ok(serde_json::json!({
            "id": self.id,
            "title": self.title()?,
            "authors": self.authors()?,
            "bookmarks": self.bookmarks()?,
            "categories": self.categories()?,
            "nchapters": self.nchapters()?,
            "characters": self.characters()?,
            "complete": self.complete()?,
            "comments": self.comments()?,
            "expected_chapters": self.expected_chapters()?,
            "fandoms": self.fandoms()?,
            "hits": self.hits()?,
            "kudos": self.kudos()?,
            "language": self.language()?,
            "rating": self.rating()?,
            "relationships": self.relationships()?,
            "restricted": self.restricted()?,
            "status": self.status()?,
            "summary": self.summary()?,
            "tags": self.tags()?,
            "warnings": self.warnings()?,
            "words": self.words()?,
            "collections": self.collections()?,
            "series": series,
            "chapter_titles": chapter_titles,
            "date_published": self.date_published()?.map(|date| date.to_string()),
            "date_updated": self.date_updated()?.map(|date| date.to_string()),
            "date_edited": self.date_edited()?.map(|date| date.to_string()),
        }))
    }

    /// Top-level comments on the full work, up to `maximum`
    pub async fn get_comments(&self, maximum: Option<usize>) -> Result<Vec<Comment>> {
        list_comments(&self.conn, Commentable::Work(self.id), maximum).await
    }

    /// Downloads the work in one of the archive's formats
    ///
    /// # Arguments
    ///
    /// * `filetype` - Label of the download link: "AZW3", "EPUB", "HTML", "MOBI" or "PDF"
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - The file contents
    /// * `Err(Ao3Error::UnexpectedResponse)` - No download link with that label
    /// * `Err(Ao3Error::Download)` - The download request failed
    pub async fn download(&self, filetype: &str) -> Result<Vec<u8>> {
        let links = self.resolve(&self.cache.downloads, "downloads", |document| {
            find_all(document, "li.download li a")
                .into_iter()
                .filter_map(|link| {
                    Some((trimmed_text(link), link.value().attr("href")?.to_string()))
                })
                .collect()
        })?;
        let href = links
            .into_iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(filetype))
            .map(|(_, href)| href)
            .ok_or_else(|| {
                Ao3Error::unexpected(format!("Filetype '{}' is not available for download", filetype))
            })?;

        let bytes = self.conn.download(self.conn.url(&href)?).await?;
        info!(id = self.id, filetype, bytes = bytes.len(), "Work downloaded");
        Ok(bytes)
    }

    /// Downloads the work and writes it to `path`
    pub async fn download_to_file(&self, filetype: &str, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.download(filetype).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// Leaves kudos
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Kudos left
    /// * `Ok(false)` - Kudos were already left from this account or address
    pub async fn leave_kudos(&self) -> Result<bool> {
        let token = self.authenticity_token().ok().flatten();
        actions::kudos(&self.conn, self.id, token.as_deref()).await
    }

    /// Comments on the full work
    pub async fn comment(&self, text: &str, commenter: Commenter) -> Result<RawResponse> {
        let token = self.authenticity_token()?;
        actions::comment(
            &self.conn,
            Commentable::Work(self.id),
            token.as_deref(),
            text,
            None,
            commenter,
        )
        .await
    }

    pub async fn bookmark(&self, options: &BookmarkOptions) -> Result<()> {
        let token = self.authenticity_token()?;
        actions::bookmark(
            &self.conn,
            &format!("/works/{}", self.id),
            token.as_deref(),
            options,
        )
        .await
    }

    /// Deletes the logged-in user's bookmark of this work
    pub async fn delete_bookmark(&self) -> Result<()> {
        let bookmark = self
            .bookmark_id()?
            .ok_or_else(|| Ao3Error::Bookmark("You don't have a bookmark here".to_string()))?;
        let token = self.authenticity_token()?;
        actions::delete_bookmark(&self.conn, bookmark, token.as_deref()).await
    }

    /// Invites the work into collections
    pub async fn collect(&self, collections: &[String]) -> Result<()> {
        let token = self.authenticity_token()?;
        actions::collect(
            &self.conn,
            &format!("/works/{}", self.id),
            token.as_deref(),
            collections,
        )
        .await
    }

    pub async fn subscribe(&self) -> Result<()> {
        actions::subscribe(self).await
    }

    pub async fn unsubscribe(&self) -> Result<RawResponse> {
        actions::unsubscribe(self).await
    }
}

impl Subscribable for Work {
    fn subscribable_type(&self) -> &'static str {
        "Work"
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

/// Splits "posted/expected" into its parts; "?" means open-ended
pub(crate) fn chapter_counts(raw: &str) -> (u32, Option<u32>) {
    let raw = raw.replace(',', "");
    let mut parts = raw.split('/');
    let posted = parts
        .next()
        .and_then(|posted| posted.trim().parse().ok())
        .unwrap_or(0);
    let expected = parts.next().and_then(|expected| expected.trim().parse().ok());
    (posted, expected)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Download links end with `?updated_at=<unix time>`
fn edit_timestamp(href: &str) -> Option<NaiveDateTime> {
    let (_, stamp) = href.rsplit_once('=')?;
    let seconds = stamp.parse().ok()?;
    DateTime::from_timestamp(seconds, 0).map(|time| time.naive_utc())
}

/// The chapter blocks of a full-work page as `(chapter id, html)`
///
/// Works with several chapters have one `div#chapter-N` per chapter; a
/// single-chapter work is one block with no chapter id.
fn chapter_fragments(document: &Html, nchapters: u32) -> Vec<(Option<u64>, String)> {
    let Some(container) = find_first(document, "#chapters") else {
        return Vec::new();
    };
    if nchapters <= 1 {
        return vec![(None, container.html())];
    }

    children(container, Some("div"))
        .into_iter()
        .filter(|div| {
            div.value()
                .attr("id")
                .is_some_and(|id| id.starts_with("chapter-"))
        })
        .map(|div| {
            let chapter_id = find_in(div, "div.chapter.preface.group h3.title a")
                .and_then(|link| link.value().attr("href"))
                .and_then(last_segment_id);
            (chapter_id, div.html())
        })
        .collect()
}
