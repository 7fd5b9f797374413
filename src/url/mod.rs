//! Archive URL and text utilities
//!
//! Listing pages and forms link to works, chapters and series by path. These
//! helpers pull the numeric identifiers back out of those links.

use url::Url;

/// Host names the archive answers on
const ARCHIVE_HOSTS: &[&str] = &["archiveofourown.org", "www.archiveofourown.org"];

/// Extracts the work id from a work or chapter link
///
/// Accepts absolute archive URLs (with or without `www.` and scheme) as well
/// as site-relative paths such as `/works/123/chapters/456`.
///
/// # Examples
///
/// ```
/// use ao3_client::url::work_id_from_url;
///
/// assert_eq!(work_id_from_url("https://archiveofourown.org/works/42"), Some(42));
/// assert_eq!(work_id_from_url("/works/7/chapters/9"), Some(7));
/// assert_eq!(work_id_from_url("https://example.com/works/7"), None);
/// ```
pub fn work_id_from_url(link: &str) -> Option<u64> {
    let path = archive_path(link)?;
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "works" {
            return segments.next().and_then(leading_digits);
        }
    }
    None
}

/// The numeric last path segment of a link, e.g. a series or bookmark id
pub fn last_segment_id(link: &str) -> Option<u64> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// Number of words in `text`, splitting on spaces, tabs and newlines
pub fn word_count(text: &str) -> usize {
    text.split([' ', '\n', '\t'])
        .filter(|word| !word.is_empty())
        .count()
}

/// The path part of an archive link, or `None` for foreign hosts
fn archive_path(link: &str) -> Option<String> {
    let link = link.trim();
    if link.starts_with('/') {
        return Some(link.to_string());
    }

    let absolute = if link.contains("://") {
        link.to_string()
    } else {
        format!("https://{}", link)
    };
    let url = Url::parse(&absolute).ok()?;
    let host = url.host_str()?;
    ARCHIVE_HOSTS
        .contains(&host)
        .then(|| url.path().to_string())
}

fn leading_digits(segment: &str) -> Option<u64> {
    let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_id_absolute() {
        assert_eq!(
            work_id_from_url("https://archiveofourown.org/works/14392692/chapters/33236241"),
            Some(14392692)
        );
        assert_eq!(
            work_id_from_url("https://www.archiveofourown.org/works/5"),
            Some(5)
        );
        assert_eq!(work_id_from_url("archiveofourown.org/works/6"), Some(6));
    }

    #[test]
    fn test_work_id_relative() {
        assert_eq!(work_id_from_url("/works/12"), Some(12));
        assert_eq!(work_id_from_url("/works/12?view_adult=true"), Some(12));
    }

    #[test]
    fn test_work_id_rejected() {
        assert_eq!(work_id_from_url("https://example.com/works/1"), None);
        assert_eq!(work_id_from_url("/series/3"), None);
        assert_eq!(work_id_from_url("/works/"), None);
        assert_eq!(work_id_from_url("not a link"), None);
    }

    #[test]
    fn test_last_segment_id() {
        assert_eq!(last_segment_id("/series/2048"), Some(2048));
        assert_eq!(last_segment_id("/bookmarks/77/"), Some(77));
        assert_eq!(last_segment_id("/subscriptions/9?x=1"), Some(9));
        assert_eq!(last_segment_id("/users/someone"), None);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two\tthree\nfour"), 4);
        assert_eq!(word_count("  spaced   out  "), 2);
        assert_eq!(word_count(""), 0);
    }
}
