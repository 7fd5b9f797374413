//! Actions that change state on the archive
//!
//! Each action is a form POST whose outcome is read from the status code,
//! the `Location` header or a JSON error body. Entities wrap these with
//! their own identity and authenticity token.

use crate::comments::Commentable;
use crate::requester::document::{find_all_in, find_first, trimmed_text};
use crate::requester::{ArchiveRequest, Connection, RawResponse};
use crate::{Ao3Error, Result};
use reqwest::StatusCode;
use scraper::Html;
use tracing::{debug, info};

const AUTH_ERROR_PATH: &str = "/auth_error";

/// Who a comment is posted as
///
/// Guests must give an email and a name. Logged-in sessions ignore both and
/// post as `pseud`, or as their default pseud when it is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commenter {
    pub email: String,
    pub name: String,
    pub pseud: Option<String>,
}

impl Commenter {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            pseud: None,
        }
    }

    /// Posts as a specific pseud of the logged-in user
    pub fn as_pseud(pseud: &str) -> Self {
        Self {
            pseud: Some(pseud.to_string()),
            ..Self::default()
        }
    }
}

/// Fields of a new bookmark
#[derive(Debug, Clone, Default)]
pub struct BookmarkOptions {
    pub notes: String,
    pub tags: Vec<String>,
    pub collections: Vec<String>,
    pub private: bool,
    pub recommend: bool,
    /// Bookmark as this pseud instead of the default one
    pub pseud: Option<String>,
}

/// Something a logged-in user can subscribe to: a work, a series or a user
pub trait Subscribable {
    /// `"Work"`, `"Series"` or `"User"`
    fn subscribable_type(&self) -> &'static str;

    /// The numeric id the subscription form refers to
    fn subscribable_id(&self) -> Result<u64>;

    fn connection(&self) -> &Connection;

    /// The token scraped with the entity, if it has been loaded
    fn subscribable_token(&self) -> Option<String>;

    /// Id of the current subscription, `None` when not subscribed
    fn current_subscription_id(&self) -> Result<Option<u64>>;
}

/// The entity's token, else the session's
fn resolve_token(conn: &Connection, own: Option<&str>) -> Result<String> {
    own.map(str::to_string)
        .or_else(|| conn.session().and_then(|session| session.authenticity_token()))
        .ok_or_else(|| {
            Ao3Error::Auth(
                "No authenticity token. Try calling session.refresh_auth_token()".to_string(),
            )
        })
}

fn auth_token_error() -> Ao3Error {
    Ao3Error::Auth(
        "Invalid authentication token. Try calling session.refresh_auth_token()".to_string(),
    )
}

fn redirects_to_auth_error(conn: &Connection, response: &RawResponse) -> bool {
    response
        .location()
        .is_some_and(|location| location == conn.absolute(AUTH_ERROR_PATH) || location == AUTH_ERROR_PATH)
}

fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Posts a comment on a work or chapter, or a reply to another comment
///
/// # Arguments
///
/// * `conn` - Connection with a guest or logged-in session
/// * `target` - The work (full-work view) or chapter commented on
/// * `token` - The commented entity's authenticity token, if known
/// * `text` - Comment body
/// * `reply_to` - Comment being replied to
/// * `commenter` - Who the comment is posted as
///
/// # Returns
///
/// * `Ok(RawResponse)` - The archive accepted the comment
/// * `Err(Ao3Error::InvalidArgument)` - A guest gave no email or name
/// * `Err(Ao3Error::Pseud)` - The logged-in user's pseud could not be found
/// * `Err(Ao3Error::InvalidId)` - The work or chapter does not exist
/// * `Err(Ao3Error::Auth)` - The token was rejected
/// * `Err(Ao3Error::DuplicateComment)` - The same comment was already posted
pub async fn comment(
    conn: &Connection,
    target: Commentable,
    token: Option<&str>,
    text: &str,
    reply_to: Option<u64>,
    commenter: Commenter,
) -> Result<RawResponse> {
    let session = conn
        .session()
        .ok_or_else(|| Ao3Error::Auth("Invalid session".to_string()))?;
    let token = resolve_token(conn, token)?;

    let mut form = Vec::new();
    match target {
        Commentable::Work(id) => form.push(("work_id".to_string(), id.to_string())),
        Commentable::Chapter(id) => form.push(("chapter_id".to_string(), id.to_string())),
    }
    if let Some(parent) = reply_to {
        form.push(("comment_id".to_string(), parent.to_string()));
    }

    if session.is_authed() {
        let path = match target {
            Commentable::Work(id) => format!("/works/{}", id),
            Commentable::Chapter(id) => format!("/chapters/{}", id),
        };
        let pseud_id = pseud_id(conn, &path, commenter.pseud.as_deref())
            .await?
            .ok_or_else(|| Ao3Error::Pseud("Couldn't find your pseud's id".to_string()))?;
        form.extend(fields(&[
            ("authenticity_token", token.as_str()),
            ("comment[pseud_id]", pseud_id.as_str()),
            ("comment[comment_content]", text),
        ]));
    } else {
        if commenter.email.is_empty() || commenter.name.is_empty() {
            return Err(Ao3Error::InvalidArgument(
                "You need to specify both an email and a name!".to_string(),
            ));
        }
        form.extend(fields(&[
            ("authenticity_token", token.as_str()),
            ("comment[email]", commenter.email.as_str()),
            ("comment[name]", commenter.name.as_str()),
            ("comment[comment_content]", text),
        ]));
    }

    let response = conn
        .post_form(
            conn.url("/comments.js")?,
            form,
            &[("x-requested-with", "XMLHttpRequest"), ("x-csrf-token", token.as_str())],
        )
        .await?;

    match response.status {
        StatusCode::NOT_FOUND if !response.body.is_empty() => {
            info!(%target, ?reply_to, "Comment posted");
            Ok(response)
        }
        StatusCode::NOT_FOUND => Err(Ao3Error::InvalidId(format!("Invalid {}", target))),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let errors = response.json().map(|json| json["errors"].clone());
            if errors.as_ref().is_some_and(|errors| errors.get("auth_error").is_some()) {
                return Err(auth_token_error());
            }
            Err(Ao3Error::unexpected(format!(
                "Unexpected json received: {}",
                response.body
            )))
        }
        StatusCode::OK => Err(Ao3Error::DuplicateComment),
        status => Err(Ao3Error::unexpected(format!(
            "Unexpected HTTP status code received ({})",
            status.as_u16()
        ))),
    }
}

/// Deletes a comment; only its author (or the work's creator) may
pub async fn delete_comment(conn: &Connection, comment_id: u64, token: Option<&str>) -> Result<()> {
    let permission_denied =
        || Ao3Error::PermissionDenied("You don't have permission to do this".to_string());
    let Ok(_) = conn.authed_session() else {
        return Err(permission_denied());
    };
    let token = resolve_token(conn, token)?;

    let request = ArchiveRequest::post(conn.url(&format!("/comments/{}", comment_id))?)
        .form(fields(&[("authenticity_token", token.as_str()), ("_method", "delete")]))
        .follow_redirects(true);
    let response = conn.send(request).await?;

    let document = Html::parse_document(&response.body);
    let title = find_first(&document, "title")
        .map(trimmed_text)
        .unwrap_or_default();
    if title.to_lowercase().contains("auth error") {
        return Err(auth_token_error());
    }
    let main = find_first(&document, "div#main")
        .map(trimmed_text)
        .unwrap_or_default();
    if main.to_lowercase().contains("you don't have permission") {
        return Err(permission_denied());
    }

    info!(comment_id, "Comment deleted");
    Ok(())
}

/// Leaves kudos on a work
///
/// # Returns
///
/// * `Ok(true)` - Kudos left
/// * `Ok(false)` - This user or address already left kudos
/// * `Err(Ao3Error::InvalidId)` - The work does not exist
/// * `Err(Ao3Error::Auth)` - No session, or the token was rejected
pub async fn kudos(conn: &Connection, work_id: u64, token: Option<&str>) -> Result<bool> {
    if conn.session().is_none() {
        return Err(Ao3Error::Auth("Invalid session".to_string()));
    }
    let token = resolve_token(conn, token)?;
    let referer = conn.absolute(&format!("/works/{}", work_id));

    let form = fields(&[
        ("authenticity_token", token.as_str()),
        ("kudo[commentable_id]", work_id.to_string().as_str()),
        ("kudo[commentable_type]", "Work"),
    ]);
    let response = conn
        .post_form(
            conn.url("/kudos.js")?,
            form,
            &[
                ("x-csrf-token", token.as_str()),
                ("x-requested-with", "XMLHttpRequest"),
                ("referer", referer.as_str()),
            ],
        )
        .await?;

    match response.status {
        StatusCode::CREATED => {
            info!(work_id, "Kudos left");
            Ok(true)
        }
        StatusCode::UNPROCESSABLE_ENTITY => {
            let errors = response
                .json()
                .and_then(|json| json.get("errors").cloned())
                .ok_or_else(|| {
                    Ao3Error::unexpected(format!("Unexpected json received: {}", response.body))
                })?;
            if errors.get("auth_error").is_some() {
                Err(auth_token_error())
            } else if errors.get("user_id").is_some() || errors.get("ip_address").is_some() {
                debug!(work_id, "Kudos already left");
                Ok(false)
            } else if errors.get("no_commentable").is_some() {
                Err(Ao3Error::InvalidId(format!("Invalid work id {}", work_id)))
            } else {
                Err(Ao3Error::unexpected(format!(
                    "Unexpected json received: {}",
                    response.body
                )))
            }
        }
        status => Err(Ao3Error::unexpected(format!(
            "Unexpected HTTP status code received ({})",
            status.as_u16()
        ))),
    }
}

/// Subscribes the logged-in user to a work, series or user
///
/// The archive allows duplicate subscriptions; check
/// `current_subscription_id` first to avoid them.
pub async fn subscribe<S: Subscribable + ?Sized>(target: &S) -> Result<()> {
    let conn = target.connection();
    let session = conn.authed_session()?;
    let token = resolve_token(conn, target.subscribable_token().as_deref())?;
    let id = target.subscribable_id()?;

    let url = conn.url(&format!("/users/{}/subscriptions", session.username()))?;
    let form = fields(&[
        ("authenticity_token", token.as_str()),
        ("subscription[subscribable_id]", id.to_string().as_str()),
        ("subscription[subscribable_type]", target.subscribable_type()),
    ]);
    let response = conn.post_form(url, form, &[]).await?;

    if response.status != StatusCode::FOUND {
        return Err(Ao3Error::InvalidId("Invalid ID / worktype".to_string()));
    }
    if redirects_to_auth_error(conn, &response) {
        return Err(auth_token_error());
    }
    info!(kind = target.subscribable_type(), id, "Subscribed");
    Ok(())
}

/// Removes the logged-in user's subscription to a work, series or user
///
/// # Returns
///
/// * `Ok(RawResponse)` - The archive's answer to the delete
/// * `Err(Ao3Error::NotSubscribed)` - There is no subscription to remove
pub async fn unsubscribe<S: Subscribable + ?Sized>(target: &S) -> Result<RawResponse> {
    let conn = target.connection();
    let session = conn.authed_session()?;
    let subscription = target.current_subscription_id()?.ok_or_else(|| {
        Ao3Error::NotSubscribed(format!("this {}", target.subscribable_type().to_lowercase()))
    })?;
    let token = resolve_token(conn, target.subscribable_token().as_deref())?;
    let id = target.subscribable_id()?;

    let url = conn.url(&format!(
        "/users/{}/subscriptions/{}",
        session.username(),
        subscription
    ))?;
    let form = fields(&[
        ("authenticity_token", token.as_str()),
        ("subscription[subscribable_id]", id.to_string().as_str()),
        ("subscription[subscribable_type]", target.subscribable_type()),
        ("_method", "delete"),
    ]);
    let response = conn.post_form(url, form, &[]).await?;
    info!(kind = target.subscribable_type(), id, "Unsubscribed");
    Ok(response)
}

/// Bookmarks the work or series at `path`
///
/// # Arguments
///
/// * `conn` - Connection with a logged-in session
/// * `path` - The bookmarked entity's path, e.g. `/works/123`
/// * `token` - The entity's authenticity token, if known
/// * `options` - Notes, tags, collections and visibility of the bookmark
pub async fn bookmark(
    conn: &Connection,
    path: &str,
    token: Option<&str>,
    options: &BookmarkOptions,
) -> Result<()> {
    conn.authed_session()?;
    let token = resolve_token(conn, token)?;
    let pseud_id = pseud_id(conn, path, options.pseud.as_deref())
        .await?
        .ok_or_else(|| Ao3Error::Pseud("Couldn't find your pseud's id".to_string()))?;

    let mut form = fields(&[
        ("authenticity_token", token.as_str()),
        ("bookmark[pseud_id]", pseud_id.as_str()),
        ("bookmark[tag_string]", options.tags.join(",").as_str()),
        ("bookmark[collection_names]", options.collections.join(",").as_str()),
        ("bookmark[private]", if options.private { "1" } else { "0" }),
        ("bookmark[rec]", if options.recommend { "1" } else { "0" }),
        ("commit", "Create"),
    ]);
    if !options.notes.is_empty() {
        form.push(("bookmark[bookmarker_notes]".to_string(), options.notes.clone()));
    }

    let url = conn.url(&format!("{}/bookmarks", path.trim_end_matches('/')))?;
    let response = conn.post_form(url, form, &[]).await?;
    check_bookmark_response(conn, &response)?;
    info!(path, "Bookmark created");
    Ok(())
}

/// Deletes bookmark `bookmark_id`
pub async fn delete_bookmark(conn: &Connection, bookmark_id: u64, token: Option<&str>) -> Result<()> {
    conn.authed_session()?;
    let token = resolve_token(conn, token)?;

    let url = conn.url(&format!("/bookmarks/{}", bookmark_id))?;
    let form = fields(&[("authenticity_token", token.as_str()), ("_method", "delete")]);
    let response = conn.post_form(url, form, &[]).await?;
    check_bookmark_response(conn, &response)?;
    info!(bookmark_id, "Bookmark deleted");
    Ok(())
}

fn check_bookmark_response(conn: &Connection, response: &RawResponse) -> Result<()> {
    match response.status {
        StatusCode::FOUND if redirects_to_auth_error(conn, response) => Err(auth_token_error()),
        StatusCode::FOUND => Ok(()),
        StatusCode::OK => {
            let document = Html::parse_document(&response.body);
            let error = find_first(&document, "div#error.error")
                .ok_or_else(|| Ao3Error::unexpected("An unknown error occurred"))?;
            let errors: Vec<String> = find_all_in(error, "li").into_iter().map(trimmed_text).collect();
            if errors.is_empty() {
                return Err(Ao3Error::Bookmark("An unknown error occurred".to_string()));
            }
            Err(Ao3Error::Bookmark(format!(
                "Error(s) creating bookmark: {}",
                errors.join(" ")
            )))
        }
        status => Err(Ao3Error::unexpected(format!(
            "Unexpected HTTP status code received ({})",
            status.as_u16()
        ))),
    }
}

/// Invites the work at `path` into collections
///
/// The archive accepts the same invitation more than once.
pub async fn collect(
    conn: &Connection,
    path: &str,
    token: Option<&str>,
    collections: &[String],
) -> Result<()> {
    conn.authed_session()?;
    let token = resolve_token(conn, token)?;

    let url = conn.url(&format!("{}/collection_items", path.trim_end_matches('/')))?;
    let form = fields(&[
        ("authenticity_token", token.as_str()),
        ("collection_names", collections.join(",").as_str()),
        ("commit", "Add"),
    ]);
    let request = ArchiveRequest::post(url).form(form).follow_redirects(true);
    let response = conn.send(request).await?;
    if response.url.as_str() == conn.absolute(AUTH_ERROR_PATH) {
        return Err(auth_token_error());
    }

    match response.status {
        StatusCode::OK => {
            let document = Html::parse_document(&response.body);
            let notice = find_first(&document, "div.notice");
            let Some(error) = find_first(&document, "div.error") else {
                if notice.is_none() {
                    return Err(Ao3Error::unexpected("An unknown error occurred"));
                }
                info!(path, ?collections, "Work collected");
                return Ok(());
            };

            let errors: Vec<String> = find_all_in(error, "ul").into_iter().map(trimmed_text).collect();
            if errors.is_empty() {
                return Err(Ao3Error::Collect("An unknown error occurred".to_string()));
            }
            Err(Ao3Error::Collect(format!(
                "We couldn't add your submission to the following collection(s): {}",
                errors.join(" ")
            )))
        }
        status => Err(Ao3Error::unexpected(format!(
            "Unexpected HTTP status code received ({})",
            status.as_u16()
        ))),
    }
}

/// Looks up the id of the pseud the logged-in user acts as on `path`
///
/// Reads the hidden `[pseud_id]` field of the page's forms; users with more
/// than one pseud get a select instead, from which `pseud` (or the selected
/// default) is taken.
pub async fn pseud_id(conn: &Connection, path: &str, pseud: Option<&str>) -> Result<Option<String>> {
    conn.authed_session()?;
    let response = conn.get(conn.url(path)?).await?;
    Ok(pseud_id_from_page(&response.body, pseud))
}

fn pseud_id_from_page(body: &str, pseud: Option<&str>) -> Option<String> {
    let document = Html::parse_document(body);
    if let Some(input) = find_first(&document, "input[name$='[pseud_id]']") {
        return input.value().attr("value").map(str::to_string);
    }

    let select = find_first(&document, "select[name$='[pseud_id]']")?;
    let options = find_all_in(select, "option");
    let chosen = match pseud {
        Some(pseud) => options.into_iter().find(|option| trimmed_text(*option) == pseud),
        None => options
            .into_iter()
            .find(|option| option.value().attr("selected") == Some("selected")),
    };
    chosen.and_then(|option| option.value().attr("value").map(str::to_string))
}
