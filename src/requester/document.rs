//! Query helpers over parsed archive pages
//!
//! Field extraction throughout the crate goes through these functions so that
//! missing markup degrades to an empty value instead of an error.

use scraper::{ElementRef, Html, Selector};

/// Parses a CSS selector, logging rather than panicking on a bad pattern
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!(css, error = ?e, "Invalid CSS selector");
            None
        }
    }
}

/// Returns the first element matching `css` anywhere in the document
pub fn find_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = selector(css)?;
    document.select(&selector).next()
}

/// Returns every element matching `css` in document order
pub fn find_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(selector) => document.select(&selector).collect(),
        None => Vec::new(),
    }
}

/// Returns the first descendant of `element` matching `css`
pub fn find_in<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = selector(css)?;
    element.select(&selector).next()
}

/// Returns every descendant of `element` matching `css`
pub fn find_all_in<'a>(element: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(selector) => element.select(&selector).collect(),
        None => Vec::new(),
    }
}

/// Direct element children of `element`, optionally restricted to a tag name
pub fn children<'a>(element: ElementRef<'a>, tag: Option<&str>) -> Vec<ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| tag.map_or(true, |tag| child.value().name() == tag))
        .collect()
}

/// All text inside `element`, concatenated
pub fn text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Text inside `element` with surrounding whitespace removed
pub fn trimmed_text(element: ElementRef<'_>) -> String {
    text(element).trim().to_string()
}

/// Text of the first match for `css`, trimmed, or an empty string
pub fn text_of(document: &Html, css: &str) -> String {
    find_first(document, css)
        .map(trimmed_text)
        .unwrap_or_default()
}

/// Trimmed texts of every match for `css`
pub fn texts_of(document: &Html, css: &str) -> Vec<String> {
    find_all(document, css).into_iter().map(trimmed_text).collect()
}

/// An attribute of the first match for `css`
pub fn attr_of(document: &Html, css: &str, attribute: &str) -> Option<String> {
    find_first(document, css)
        .and_then(|element| element.value().attr(attribute))
        .map(str::to_string)
}

/// Parses an archive number such as `"12,345"`, returning 0 when absent
pub fn parse_count(raw: &str) -> u64 {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// The number written just before `noun` in a heading such as
/// "1 - 20 of 1,234 Bookmarks by someone"
pub fn count_before(heading: &str, noun: &str) -> u64 {
    let words: Vec<&str> = heading.split_whitespace().collect();
    words
        .iter()
        .position(|word| word.starts_with(noun))
        .and_then(|at| at.checked_sub(1))
        .map(|at| parse_count(words[at]))
        .unwrap_or(0)
}

/// Numeric value of the first match for `css`, or 0
pub fn count_of(document: &Html, css: &str) -> u64 {
    parse_count(&text_of(document, css))
}

/// True for the archive's "Error 404" page, which is sometimes served with 200
pub fn is_error_page(document: &Html) -> bool {
    find_all(document, "h2.heading")
        .into_iter()
        .any(|heading| trimmed_text(heading).contains("Error 404"))
}

/// The CSRF token every form on an archive page carries
pub fn csrf_token(document: &Html) -> Option<String> {
    attr_of(document, "meta[name='csrf-token']", "content")
}

/// Text of every `<p>` under `element`, one paragraph per line
pub fn paragraphs(element: ElementRef<'_>) -> String {
    find_all_in(element, "p")
        .into_iter()
        .map(trimmed_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Highest page number listed in the pagination block matched by `css`
///
/// Listings without pagination have a single page.
pub fn page_count(document: &Html, css: &str) -> u32 {
    find_all(document, &format!("{} li", css))
        .into_iter()
        .filter_map(|li| trimmed_text(li).parse::<u32>().ok())
        .max()
        .unwrap_or(1)
}

/// The next sibling element of `element`
pub fn next_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}
