use crate::comments::{list_comments, Comment, Commentable};
use crate::requester::document::{find_all_in, find_first, paragraphs, text};
use crate::requester::{Connection, RawResponse};
use crate::session::actions::{self, Commenter};
use crate::state::{Memo, Snapshot};
use crate::url::{word_count, work_id_from_url};
use crate::works::Work;
use crate::{Ao3Error, Result};
use reqwest::StatusCode;
use scraper::Html;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Default)]
pub(crate) struct ChapterCache {
    text: Memo<String>,
    title: Memo<String>,
    number: Memo<u32>,
    words: Memo<usize>,
    summary: Memo<String>,
    start_notes: Memo<String>,
    end_notes: Memo<String>,
    images: Memo<Vec<(String, usize)>>,
}

/// One chapter of a work
///
/// A chapter's snapshot is its block cut out of the full-work page. A work
/// with a single chapter has a "oneshot" chapter without an id, which stands
/// for the whole work.
#[derive(Debug, Clone)]
pub struct Chapter {
    id: Option<u64>,
    work_id: Option<u64>,
    conn: Connection,
    snapshot: Option<Snapshot>,
    work_title: Option<String>,
    authenticity_token: Option<String>,
    cache: ChapterCache,
}

impl PartialEq for Chapter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.work_id == other.work_id
    }
}

impl Chapter {
    /// Creates a chapter handle from its id
    ///
    /// Loading fetches the chapter page to learn its work, then loads the
    /// whole work and keeps this chapter's block.
    pub async fn new(id: u64, conn: Connection, load: bool) -> Result<Self> {
        let mut chapter = Self::unloaded(id, conn);
        if load {
            chapter.reload().await?;
        }
        Ok(chapter)
    }

    pub fn unloaded(id: u64, conn: Connection) -> Self {
        Self {
            id: Some(id),
            work_id: None,
            conn,
            snapshot: None,
            work_title: None,
            authenticity_token: None,
            cache: ChapterCache::default(),
        }
    }

    /// A chapter split out of a loaded work
    pub(crate) fn from_work(
        id: Option<u64>,
        work_id: u64,
        conn: Connection,
        snapshot: Snapshot,
        work_title: String,
        authenticity_token: Option<String>,
    ) -> Self {
        Self {
            id,
            work_id: Some(work_id),
            conn,
            snapshot: Some(snapshot),
            work_title: Some(work_title),
            authenticity_token,
            cache: ChapterCache::default(),
        }
    }

    /// `None` for the single chapter of a oneshot
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Id of the parent work, once known
    pub fn work_id(&self) -> Option<u64> {
        self.work_id
    }

    pub fn oneshot(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn authenticity_token(&self) -> Option<&str> {
        self.authenticity_token.as_deref()
    }

    /// Reloads the parent work and takes this chapter's block from it
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Chapter refreshed
    /// * `Err(Ao3Error::InvalidId)` - The chapter or its work does not exist
    pub async fn reload(&mut self) -> Result<()> {
        let work_id = match self.work_id {
            Some(work_id) => work_id,
            None => self.discover_work().await?,
        };

        let work = Work::new(work_id, self.conn.clone(), true, true).await?;
        let fresh = work
            .chapters()
            .iter()
            .find(|chapter| chapter.id == self.id)
            .ok_or_else(|| {
                Ao3Error::InvalidId(format!(
                    "Work {} has no chapter {}",
                    work_id,
                    self.id.map_or_else(|| "oneshot".to_string(), |id| id.to_string())
                ))
            })?;

        self.work_id = Some(work_id);
        self.snapshot = fresh.snapshot.clone();
        self.work_title = fresh.work_title.clone();
        self.authenticity_token = fresh.authenticity_token.clone();
        self.cache = ChapterCache::default();
        debug!(id = ?self.id, work_id, "Chapter reloaded");
        Ok(())
    }

    /// Follows the chapter page's "Entire Work" link to the work id
    async fn discover_work(&self) -> Result<u64> {
        let id = self
            .id
            .ok_or_else(|| Ao3Error::unloaded("Chapter"))?;
        let url = self.conn.url(&format!("/chapters/{}?view_adult=true", id))?;
        let response = self.conn.get(url).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(Ao3Error::InvalidId(format!("Cannot find chapter {}", id)));
        }

        let document = Html::parse_document(&response.body);
        find_first(&document, "li.chapter.entire a")
            .and_then(|link| link.value().attr("href"))
            .and_then(work_id_from_url)
            .ok_or_else(|| Ao3Error::InvalidId(format!("Cannot find the work of chapter {}", id)))
    }

    fn resolve<T: Clone>(
        &self,
        memo: &Memo<T>,
        name: &str,
        compute: impl FnOnce(&Html) -> T,
    ) -> Result<T> {
        memo.resolve(self.snapshot.as_ref(), name, |document| Ok(compute(document)))
    }

    /// Chapter text, one paragraph per line
    pub fn text(&self) -> Result<String> {
        self.resolve(&self.cache.text, "text", |document| {
            let body = find_first(document, "div[role='article']")
                .unwrap_or_else(|| document.root_element());
            find_all_in(body, "p, center")
                .into_iter()
                .map(|paragraph| text(paragraph).replace('\n', ""))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Chapter title; a oneshot is titled after its work
    pub fn title(&self) -> Result<String> {
        if self.oneshot() {
            return self
                .work_title
                .clone()
                .ok_or_else(|| Ao3Error::unloaded("title"));
        }
        let number = self.number()?;
        self.resolve(&self.cache.title, "title", |document| {
            let heading = find_first(document, "div.chapter.preface.group h3.title");
            let title = heading
                .and_then(|heading| heading.text().last().map(str::trim))
                .map(|last| last.strip_prefix(':').unwrap_or(last).trim().to_string())
                .unwrap_or_default();
            if title.is_empty() {
                format!("Chapter {}", number)
            } else {
                title
            }
        })
    }

    /// 1-based position in the work
    pub fn number(&self) -> Result<u32> {
        if self.oneshot() {
            return Ok(1);
        }
        self.resolve(&self.cache.number, "number", |document| {
            find_first(document, "div[id^='chapter-']")
                .and_then(|div| div.value().attr("id"))
                .and_then(|id| id.trim_start_matches("chapter-").parse().ok())
                .unwrap_or(1)
        })
    }

    pub fn words(&self) -> Result<usize> {
        let text = self.text()?;
        self.resolve(&self.cache.words, "words", |_| word_count(&text))
    }

    pub fn summary(&self) -> Result<String> {
        self.resolve(&self.cache.summary, "summary", |document| {
            find_first(document, "div#summary")
                .map(paragraphs)
                .unwrap_or_default()
        })
    }

    /// Notes before the chapter text
    pub fn start_notes(&self) -> Result<String> {
        self.resolve(&self.cache.start_notes, "start_notes", |document| {
            find_first(document, "div#notes")
                .map(paragraphs)
                .unwrap_or_default()
        })
    }

    /// Notes after the chapter text
    pub fn end_notes(&self) -> Result<String> {
        let number = self.number()?;
        self.resolve(&self.cache.end_notes, "end_notes", |document| {
            find_first(document, &format!("div#chapter_{}_endnotes", number))
                .map(paragraphs)
                .unwrap_or_default()
        })
    }

    /// Images as `(src, paragraph number)`
    pub fn images(&self) -> Result<Vec<(String, usize)>> {
        self.resolve(&self.cache.images, "images", |document| {
            let mut images = Vec::new();
            for (line, paragraph) in find_all_in(document.root_element(), "div.userstuff p")
                .into_iter()
                .enumerate()
            {
                for image in find_all_in(paragraph, "img") {
                    if let Some(src) = image.value().attr("src") {
                        images.push((src.to_string(), line + 1));
                    }
                }
            }
            images
        })
    }

    pub fn url(&self) -> Result<Url> {
        let work_id = self.work_id.ok_or_else(|| Ao3Error::unloaded("Chapter"))?;
        match self.id {
            Some(id) => self.conn.url(&format!("/works/{}/chapters/{}", work_id, id)),
            None => self.conn.url(&format!("/works/{}", work_id)),
        }
    }

    /// Where comments on this chapter are posted
    fn commentable(&self) -> Result<Commentable> {
        match (self.id, self.work_id) {
            (Some(id), _) => Ok(Commentable::Chapter(id)),
            (None, Some(work_id)) => Ok(Commentable::Work(work_id)),
            (None, None) => Err(Ao3Error::unloaded("Chapter")),
        }
    }

    /// Top-level comments, up to `maximum`; a oneshot lists its work's
    pub async fn get_comments(&self, maximum: Option<usize>) -> Result<Vec<Comment>> {
        list_comments(&self.conn, self.commentable()?, maximum).await
    }

    /// Comments on this chapter
    pub async fn comment(&self, text: &str, commenter: Commenter) -> Result<RawResponse> {
        if !self.is_loaded() {
            return Err(Ao3Error::unloaded("Chapter"));
        }
        actions::comment(
            &self.conn,
            self.commentable()?,
            self.authenticity_token.as_deref(),
            text,
            None,
            commenter,
        )
        .await
    }
}
