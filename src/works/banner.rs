use crate::requester::document::{find_all_in, find_in, parse_count, trimmed_text};
use crate::requester::Connection;
use crate::url::{last_segment_id, work_id_from_url};
use crate::works::work::chapter_counts;
use crate::works::Work;
use chrono::NaiveDate;
use scraper::ElementRef;

/// Builds an unloaded work from a listing entry
///
/// Search results, series pages and user pages show a summary blurb for each
/// work. Every field the blurb carries is seeded into the work, so reading it
/// costs no request until the work is reloaded.
///
/// # Returns
///
/// `None` if the entry has no link to a work.
pub fn work_from_banner(banner: ElementRef<'_>, conn: &Connection) -> Option<Work> {
    let heading = find_in(banner, "h4")?;
    let mut authors = Vec::new();
    let mut title_and_id = None;
    for link in find_all_in(heading, "a") {
        let href = link.value().attr("href").unwrap_or_default();
        if link.value().attr("rel") == Some("author") {
            authors.push(trimmed_text(link));
        } else if href.starts_with("/works") {
            title_and_id = work_id_from_url(href).map(|id| (id, trimmed_text(link)));
        }
    }
    let (id, title) = title_and_id?;

    let work = Work::unloaded(id, conn.clone());
    let cache = work.cache();
    cache.title.seed(title);
    cache.authors.seed(authors);
    cache.fandoms.seed(texts_in(banner, "h5.fandoms a"));

    let mut warnings = Vec::new();
    let mut relationships = Vec::new();
    let mut characters = Vec::new();
    let mut freeforms = Vec::new();
    if let Some(tags) = find_in(banner, "ul.tags") {
        for item in find_all_in(tags, "li") {
            let classes: Vec<&str> = item.value().classes().collect();
            let tag = trimmed_text(item);
            if classes.contains(&"warnings") {
                warnings.push(tag);
            } else if classes.contains(&"relationships") {
                relationships.push(tag);
            } else if classes.contains(&"characters") {
                characters.push(tag);
            } else if classes.contains(&"freeforms") {
                freeforms.push(tag);
            }
        }
    }
    cache.warnings.seed(warnings);
    cache.relationships.seed(relationships);
    cache.characters.seed(characters);
    cache.tags.seed(freeforms);

    if let Some(required) = find_in(banner, ".required-tags") {
        cache
            .rating
            .seed(find_in(required, ".rating").map(trimmed_text));
        if let Some(category) = find_in(required, ".category") {
            cache.categories.seed(
                trimmed_text(category)
                    .split(", ")
                    .map(str::to_string)
                    .collect(),
            );
        }
    }

    if let Some(summary) = find_in(banner, ".userstuff.summary") {
        cache.summary.seed(trimmed_text(summary));
    }

    let series: Vec<(u64, String)> = find_all_in(banner, "ul.series a")
        .into_iter()
        .filter_map(|link| Some((last_segment_id(link.value().attr("href")?)?, trimmed_text(link))))
        .collect();
    cache.series.seed(series);

    if let Some(stats) = find_in(banner, "dl.stats") {
        let stat = |class: &str| find_in(stats, &format!("dd.{}", class)).map(trimmed_text);
        if let Some(language) = stat("language") {
            cache.language.seed(language);
        }
        for (class, memo) in [
            ("words", &cache.words),
            ("bookmarks", &cache.bookmarks),
            ("hits", &cache.hits),
            ("kudos", &cache.kudos),
            ("comments", &cache.comments),
        ] {
            memo.seed(stat(class).map(|value| parse_count(&value)).unwrap_or(0));
        }
        if let Some(chapters) = stat("chapters") {
            let (posted, expected) = chapter_counts(&chapters);
            cache.nchapters.seed(posted);
            cache.expected_chapters.seed(expected);
            cache.complete.seed(expected == Some(posted));
        }
        cache
            .restricted
            .seed(find_in(banner, "img[title='Restricted']").is_some());
    }

    if let Some(date) = find_in(banner, "p.datetime") {
        let updated = NaiveDate::parse_from_str(&trimmed_text(date), "%d %b %Y").ok();
        cache.date_updated.seed(updated);
    }

    Some(work)
}

fn texts_in(element: ElementRef<'_>, css: &str) -> Vec<String> {
    find_all_in(element, css).into_iter().map(trimmed_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requester::document::find_first;
    use crate::requester::Gateway;
    use scraper::Html;
    use std::sync::Arc;

    const BANNER: &str = r#"
        <ol class="work index group">
        <li id="work_77" class="work blurb group" role="article">
          <div class="header module">
            <h4 class="heading"><a href="/works/77">Blurb Title</a> by <a rel="author" href="/users/ann/pseuds/ann">ann</a></h4>
            <h5 class="fandoms heading"><span class="landmark">Fandoms:</span> <a class="tag">Fandom One</a></h5>
            <ul class="required-tags">
              <li><a><span class="rating-teen rating" title="Teen"><span class="text">Teen And Up Audiences</span></span></a></li>
              <li><a><span class="category-slash category" title="F/M, M/M"><span class="text">F/M, M/M</span></span></a></li>
            </ul>
            <p class="datetime">05 Jan 2022</p>
          </div>
          <ul class="tags commas">
            <li class="warnings"><strong><a class="tag">No Archive Warnings Apply</a></strong></li>
            <li class="relationships"><a class="tag">A/B</a></li>
            <li class="characters"><a class="tag">A</a></li>
            <li class="freeforms"><a class="tag">Angst</a></li>
          </ul>
          <blockquote class="userstuff summary"><p>Short summary.</p></blockquote>
          <ul class="series"><li>Part <strong>2</strong> of <a href="/series/8">Saga</a></li></ul>
          <dl class="stats">
            <dt class="language">Language:</dt><dd class="language">English</dd>
            <dt class="words">Words:</dt><dd class="words">12,000</dd>
            <dt class="chapters">Chapters:</dt><dd class="chapters"><a href="/works/77/chapters/1">4</a>/4</dd>
            <dt class="kudos">Kudos:</dt><dd class="kudos"><a>300</a></dd>
            <dt class="hits">Hits:</dt><dd class="hits">5,000</dd>
          </dl>
        </li>
        </ol>
    "#;

    #[test]
    fn test_work_from_banner() {
        let conn = Connection::from(Arc::new(
            Gateway::with_base_url("http://127.0.0.1:9").unwrap(),
        ));
        let document = Html::parse_document(BANNER);
        let banner = find_first(&document, "li.work.blurb").unwrap();
        let work = work_from_banner(banner, &conn).unwrap();

        assert!(!work.is_loaded());
        assert_eq!(work.id(), 77);
        assert_eq!(work.title().unwrap(), "Blurb Title");
        assert_eq!(work.authors().unwrap(), vec!["ann"]);
        assert_eq!(work.fandoms().unwrap(), vec!["Fandom One"]);
        assert_eq!(work.rating().unwrap().as_deref(), Some("Teen And Up Audiences"));
        assert_eq!(work.categories().unwrap(), vec!["F/M", "M/M"]);
        assert_eq!(work.relationships().unwrap(), vec!["A/B"]);
        assert_eq!(work.tags().unwrap(), vec!["Angst"]);
        assert_eq!(work.summary().unwrap(), "Short summary.");
        assert_eq!(work.words().unwrap(), 12000);
        assert_eq!(work.kudos().unwrap(), 300);
        assert_eq!(work.bookmarks().unwrap(), 0);
        assert_eq!(work.nchapters().unwrap(), 4);
        assert!(work.complete().unwrap());
        assert_eq!(work.series().unwrap()[0].id(), 8);
        assert_eq!(work.date_updated().unwrap(), NaiveDate::from_ymd_opt(2022, 1, 5));
        assert!(matches!(work.hits(), Ok(5000)));
        assert!(work.text().is_err());
    }

    #[test]
    fn test_banner_without_work_link() {
        let conn = Connection::from(Arc::new(
            Gateway::with_base_url("http://127.0.0.1:9").unwrap(),
        ));
        let document = Html::parse_document(r#"<li class="work"><h4><a href="/users/x">x</a></h4></li>"#);
        let banner = find_first(&document, "li.work").unwrap();
        assert!(work_from_banner(banner, &conn).is_none());
    }
}
