//! Pure parsing of comment pages
//!
//! A comment page (`/comments/{id}`) is turned into a [`CommentPage`] once,
//! right after it is fetched. Everything the thread resolver needs is read
//! from that value; the HTML is not consulted again.

use crate::comments::Commentable;
use crate::requester::document::{
    attr_of, children, csrf_token, find_all, find_first, find_in, text, trimmed_text,
};
use crate::{Ao3Error, Result};
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Author and text of one comment, as rendered on a page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentDetails {
    /// Username in the byline; `None` for guest comments
    pub author: Option<String>,
    pub text: String,
}

/// One comment found while walking a thread
///
/// `parent` indexes into the same entry list. Entries always appear after
/// their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    pub id: u64,
    pub parent: Option<usize>,
    pub details: CommentDetails,
}

/// Everything the resolver needs from one comment page
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    /// The comment the page was fetched for
    pub comment_id: u64,
    pub authenticity_token: String,
    /// Comment id → id linked as its "Parent Thread"
    pub parent_threads: HashMap<u64, u64>,
    /// Where the page's comment was posted, from its reply link
    pub commentable: Option<Commentable>,
    /// Author and text of every comment on the page, by id
    pub details: HashMap<u64, CommentDetails>,
    /// The thread walk; entry 0, when present, is the page's own comment
    pub entries: Vec<ThreadEntry>,
    /// False when the page has no `ol.thread` at all
    pub has_thread: bool,
}

impl CommentPage {
    /// Parses a comment page
    ///
    /// # Arguments
    ///
    /// * `document` - The fetched `/comments/{id}` page
    /// * `comment_id` - The id the page was requested for
    ///
    /// # Returns
    ///
    /// * `Ok(CommentPage)` - The parsed page
    /// * `Err(Ao3Error::UnexpectedResponse)` - The page carries no authenticity token
    pub fn parse(document: &Html, comment_id: u64) -> Result<Self> {
        let authenticity_token = csrf_token(document).ok_or_else(|| {
            Ao3Error::unexpected(format!(
                "No authenticity token on the page for comment {}",
                comment_id
            ))
        })?;

        let details = find_all(document, "li[role][id^='comment_']")
            .into_iter()
            .filter_map(|li| Some((comment_id_of(li)?, comment_details(li))))
            .collect();

        let (entries, has_thread) = match find_first(document, "ol.thread") {
            Some(thread) => (walk_thread(thread), true),
            None => (Vec::new(), false),
        };

        let page = Self {
            comment_id,
            authenticity_token,
            parent_threads: parent_threads(document),
            commentable: commentable(document, comment_id),
            details,
            entries,
            has_thread,
        };
        debug!(
            comment_id,
            entries = page.entries.len(),
            parent = ?page.parent_thread(comment_id),
            "Parsed comment page"
        );
        Ok(page)
    }

    /// The comment linked as the parent thread of `comment_id`, if any
    pub fn parent_thread(&self, comment_id: u64) -> Option<u64> {
        self.parent_threads.get(&comment_id).copied()
    }

    pub fn details_of(&self, comment_id: u64) -> Option<&CommentDetails> {
        self.details.get(&comment_id)
    }
}

/// Reads the numeric id out of an `li` with `id="comment_123"`
pub(crate) fn comment_id_of(li: ElementRef<'_>) -> Option<u64> {
    li.value()
        .attr("id")?
        .strip_prefix("comment_")?
        .parse()
        .ok()
}

/// Byline and body of a comment `li`
pub(crate) fn comment_details(li: ElementRef<'_>) -> CommentDetails {
    let author = find_in(li, "h4.heading.byline a")
        .map(trimmed_text)
        .filter(|name| !name.is_empty());
    let text = find_in(li, "blockquote")
        .map(trimmed_text)
        .unwrap_or_default();
    CommentDetails { author, text }
}

/// Walks the `ol.thread` list into flat entries
///
/// An `li` with a `role` attribute is a comment. An `li` without one wraps
/// the nested list of replies to the comment right before it. In the root
/// pass only the first comment is taken: it is the page's own comment.
fn walk_thread(thread: ElementRef<'_>) -> Vec<ThreadEntry> {
    let mut entries = Vec::new();
    walk_list(thread, None, &mut entries);
    entries
}

fn walk_list(list: ElementRef<'_>, parent: Option<usize>, entries: &mut Vec<ThreadEntry>) {
    let mut previous: Option<usize> = None;

    for li in children(list, Some("li")) {
        if li.value().attr("role").is_some() {
            let Some(id) = comment_id_of(li) else {
                warn!("Comment without a usable id, skipping");
                continue;
            };

            if parent.is_none() && !entries.is_empty() {
                debug!(id, "Extra root-level comment on the page, skipping");
                continue;
            }

            trace!(id, ?parent, "Thread entry");
            entries.push(ThreadEntry {
                id,
                parent,
                details: comment_details(li),
            });
            previous = Some(entries.len() - 1);
        } else {
            let Some(owner) = previous else {
                trace!("Reply list before any comment, skipping");
                continue;
            };
            if let Some(nested) = find_in(li, "ol") {
                walk_list(nested, Some(owner), entries);
            }
        }
    }
}

/// Collects every "Parent Thread" link on the page
fn parent_threads(document: &Html) -> HashMap<u64, u64> {
    let mut links = HashMap::new();

    for nav in find_all(document, "ul[id^='navigation_for_comment_']") {
        let Some(owner) = nav
            .value()
            .attr("id")
            .and_then(|id| id.strip_prefix("navigation_for_comment_"))
            .and_then(|id| id.parse::<u64>().ok())
        else {
            continue;
        };

        for li in children(nav, Some("li")) {
            if text(li).trim() != "Parent Thread" {
                continue;
            }
            let parent = find_in(li, "a")
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
                .and_then(|last| last.split(['?', '#']).next())
                .and_then(|id| id.parse::<u64>().ok());
            if let Some(parent) = parent {
                links.insert(owner, parent);
            }
        }
    }

    links
}

/// Where the comment was posted, from the query of its reply link
fn commentable(document: &Html, comment_id: u64) -> Option<Commentable> {
    let href = attr_of(
        document,
        &format!("li#add_comment_reply_link_{} a", comment_id),
        "href",
    )?;
    let (_, query) = href.split_once('?')?;

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "chapter_id" => return value.parse().ok().map(Commentable::Chapter),
            "work_id" => return value.parse().ok().map(Commentable::Work),
            _ => {}
        }
    }
    None
}

/// Top-level comments listed on a work or chapter comment page
pub(crate) fn listed_comments(document: &Html) -> Vec<(u64, CommentDetails)> {
    let Some(thread) = find_first(document, "#comments_placeholder ol.thread")
        .or_else(|| find_first(document, "ol.thread"))
    else {
        return Vec::new();
    };

    children(thread, Some("li"))
        .into_iter()
        .filter(|li| li.value().attr("role") == Some("article"))
        .filter_map(|li| Some((comment_id_of(li)?, comment_details(li))))
        .collect()
}

/// Number of comment pages, from the comment pagination list
pub(crate) fn comment_pages(document: &Html) -> u32 {
    let Some(pagination) = find_first(document, "#comments_placeholder ol.pagination") else {
        return 1;
    };
    page_numbers(pagination).into_iter().max().unwrap_or(1)
}

fn page_numbers(list: ElementRef<'_>) -> Vec<u32> {
    children(list, Some("li"))
        .into_iter()
        .filter_map(|li| trimmed_text(li).parse().ok())
        .collect()
}
