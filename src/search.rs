//! Work search
//!
//! A [`SearchQuery`] renders to the `work_search[...]` parameters of the
//! archive's search form. [`Search::update`] fetches one result page and
//! seeds an unloaded [`Work`] from each entry.

use crate::requester::document::{find_all_in, find_first, find_in, parse_count, trimmed_text};
use crate::requester::{ArchiveRequest, Connection};
use crate::works::{work_from_banner, Work};
use crate::{Ao3Error, Result};
use scraper::Html;
use std::fmt;
use tracing::{debug, info};

/// Results shown per search page
pub const RESULTS_PER_PAGE: u64 = 20;

const NO_RESULTS: &str = "No results found";

/// Bounds on a numeric field such as word count or kudos
///
/// Renders as the archive expects: `<ub` with no lower bound, `>lb` with no
/// upper bound, `n` when both bounds are equal, `lb-ub` otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraint {
    pub lower: u64,
    pub upper: Option<u64>,
}

impl Constraint {
    pub fn new(lower: u64, upper: Option<u64>) -> Self {
        Self { lower, upper }
    }

    pub fn at_least(lower: u64) -> Self {
        Self::new(lower, None)
    }

    pub fn below(upper: u64) -> Self {
        Self::new(0, Some(upper))
    }

    pub fn exactly(value: u64) -> Self {
        Self::new(value, Some(value))
    }

    /// A constraint with neither bound filters nothing
    pub fn is_unbounded(&self) -> bool {
        self.lower == 0 && self.upper.is_none()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (0, Some(upper)) => write!(f, "<{}", upper),
            (lower, None) => write!(f, ">{}", lower),
            (lower, Some(upper)) if lower == upper => write!(f, "{}", lower),
            (lower, Some(upper)) => write!(f, "{}-{}", lower, upper),
        }
    }
}

/// Columns results can be sorted on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    BestMatch,
    Author,
    Title,
    DatePosted,
    DateUpdated,
    WordCount,
    Rating,
    Hits,
    Bookmarks,
    Comments,
    Kudos,
}

impl SortColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestMatch => "_score",
            Self::Author => "authors_to_sort_on",
            Self::Title => "title_to_sort_on",
            Self::DatePosted => "created_at",
            Self::DateUpdated => "revised_at",
            Self::WordCount => "word_count",
            Self::Rating => "rating_ids",
            Self::Hits => "hits",
            Self::Bookmarks => "bookmarks_count",
            Self::Comments => "comments_count",
            Self::Kudos => "kudos_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

/// Archive rating ids used by the `rating` filter
pub mod rating {
    pub const NOT_RATED: u32 = 9;
    pub const GENERAL_AUDIENCES: u32 = 10;
    pub const TEEN_AND_UP: u32 = 11;
    pub const MATURE: u32 = 12;
    pub const EXPLICIT: u32 = 13;
}

/// Filters of a work search
///
/// Empty strings and `None` leave a filter out. Tag-like filters take
/// comma-separated names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub any_field: String,
    pub title: String,
    pub author: String,
    /// Only works with a single chapter
    pub single_chapter: bool,
    pub word_count: Option<Constraint>,
    pub language: String,
    pub fandoms: String,
    pub characters: String,
    pub relationships: String,
    pub tags: String,
    /// One of the ids in [`rating`]
    pub rating: Option<u32>,
    pub hits: Option<Constraint>,
    pub kudos: Option<Constraint>,
    /// `Some(false)` excludes crossovers, `Some(true)` keeps only crossovers
    pub crossovers: Option<bool>,
    pub bookmarks: Option<Constraint>,
    pub excluded_tags: String,
    pub comments: Option<Constraint>,
    pub completion_status: Option<bool>,
    /// 1-based result page
    pub page: u32,
    pub sort_column: Option<SortColumn>,
    pub sort_direction: Option<SortDirection>,
    /// Relative date filter such as `"< 2 weeks"`
    pub revised_at: String,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            any_field: String::new(),
            title: String::new(),
            author: String::new(),
            single_chapter: false,
            word_count: None,
            language: String::new(),
            fandoms: String::new(),
            characters: String::new(),
            relationships: String::new(),
            tags: String::new(),
            rating: None,
            hits: None,
            kudos: None,
            crossovers: None,
            bookmarks: None,
            excluded_tags: String::new(),
            comments: None,
            completion_status: None,
            page: 1,
            sort_column: None,
            sort_direction: None,
            revised_at: String::new(),
        }
    }
}

impl SearchQuery {
    /// A query matching `any_field` anywhere in a work
    pub fn new(any_field: &str) -> Self {
        Self {
            any_field: any_field.to_string(),
            ..Self::default()
        }
    }

    /// Query parameters, in the order the archive's form sends them
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |name: &str, value: String| params.push((name.to_string(), value));

        push(
            "work_search[query]",
            if self.any_field.is_empty() {
                " ".to_string()
            } else {
                self.any_field.clone()
            },
        );
        if self.page != 1 {
            push("page", self.page.to_string());
        }

        let text_filters = [
            ("work_search[title]", &self.title),
            ("work_search[creators]", &self.author),
            ("work_search[language_id]", &self.language),
            ("work_search[fandom_names]", &self.fandoms),
            ("work_search[character_names]", &self.characters),
            ("work_search[relationship_names]", &self.relationships),
            ("work_search[freeform_names]", &self.tags),
            ("work_search[excluded_tag_names]", &self.excluded_tags),
            ("work_search[revised_at]", &self.revised_at),
        ];
        for (name, value) in text_filters {
            if !value.is_empty() {
                push(name, value.clone());
            }
        }

        if self.single_chapter {
            push("work_search[single_chapter]", "1".to_string());
        }
        if let Some(rating) = self.rating {
            push("work_search[rating_ids]", rating.to_string());
        }

        let ranges = [
            ("work_search[word_count]", self.word_count),
            ("work_search[hits]", self.hits),
            ("work_search[kudos_count]", self.kudos),
            ("work_search[bookmarks_count]", self.bookmarks),
            ("work_search[comments_count]", self.comments),
        ];
        for (name, constraint) in ranges {
            if let Some(constraint) = constraint.filter(|c| !c.is_unbounded()) {
                push(name, constraint.to_string());
            }
        }

        let flags = [
            ("work_search[crossover]", self.crossovers),
            ("work_search[complete]", self.completion_status),
        ];
        for (name, flag) in flags {
            if let Some(flag) = flag {
                push(name, if flag { "T" } else { "F" }.to_string());
            }
        }

        if let Some(column) = self.sort_column {
            push("work_search[sort_column]", column.as_str().to_string());
        }
        if let Some(direction) = self.sort_direction {
            push("work_search[sort_direction]", direction.as_str().to_string());
        }
        params
    }
}

/// A work search and its last fetched page
#[derive(Debug, Clone)]
pub struct Search {
    pub query: SearchQuery,
    conn: Connection,
    results: Option<Vec<Work>>,
    total_results: u64,
    pages: u64,
}

impl Search {
    pub fn new(query: SearchQuery, conn: Connection) -> Self {
        Self {
            query,
            conn,
            results: None,
            total_results: 0,
            pages: 0,
        }
    }

    /// Works on the fetched page; `None` before the first update
    pub fn results(&self) -> Option<&[Work]> {
        self.results.as_deref()
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    /// Result pages for the whole query, `ceil(total / 20)`
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Fetches the page `query.page` and replaces results and totals
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Results updated; a search with no match has empty results
    /// * `Err(Ao3Error::RateLimited)` - The archive answered 429
    /// * `Err(Ao3Error::UnexpectedResponse)` - The page has no result list
    pub async fn update(&mut self) -> Result<()> {
        let mut request = ArchiveRequest::get(self.conn.url("/works/search")?);
        for (name, value) in self.query.params() {
            request = request.query(name, value);
        }
        let response = self.conn.send(request).await?;
        let (results, total_results) = parse_results(&response.body, &self.conn)?;

        self.pages = total_results.div_ceil(RESULTS_PER_PAGE);
        self.total_results = total_results;
        debug!(page = self.query.page, found = results.len(), "Search page loaded");
        info!(total = total_results, pages = self.pages, "Search updated");
        self.results = Some(results);
        Ok(())
    }
}

fn parse_results(body: &str, conn: &Connection) -> Result<(Vec<Work>, u64)> {
    let document = Html::parse_document(body);
    let Some(list) = find_first(&document, "ol.work.index.group") else {
        let empty = find_all_in(document.root_element(), "p")
            .into_iter()
            .any(|p| trimmed_text(p).starts_with(NO_RESULTS));
        return if empty {
            Ok((Vec::new(), 0))
        } else {
            Err(Ao3Error::unexpected("Search page has no result list"))
        };
    };

    let works: Vec<Work> = find_all_in(list, "li[role='article']")
        .into_iter()
        .filter(|entry| find_in(*entry, "h4").is_some())
        .filter_map(|entry| work_from_banner(entry, conn))
        .collect();

    let total = find_first(&document, "div#main.works-search.region h3.heading")
        .map(|heading| {
            let heading = trimmed_text(heading).replace('.', "");
            parse_count(heading.split_whitespace().next().unwrap_or_default())
        })
        .unwrap_or(0);
    Ok((works, total))
}
