//! Shared fixtures for the integration tests

use ao3_client::{Connection, Gateway};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary
///
/// Set `RUST_LOG=ao3_client=debug` to see the client's logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A gateway pointed at the mock server
pub fn gateway(server: &MockServer) -> Arc<Gateway> {
    init_tracing();
    Arc::new(Gateway::with_base_url(&server.uri()).expect("Failed to build gateway"))
}

/// A guest-less connection to the mock server
pub fn connection(server: &MockServer) -> Connection {
    Connection::from(gateway(server))
}

/// Mounts an HTML page answering GET `route`
pub async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(200, body))
        .mount(server)
        .await;
}

pub fn html(status: u16, body: String) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Wraps a body in a page carrying a CSRF token
pub fn page(body: &str) -> String {
    format!(
        r#"<html><head><meta name="csrf-token" content="page-token"></head><body>{}</body></html>"#,
        body
    )
}

/// A `li` for one comment, with an optional "Parent Thread" link and replies
pub fn comment_li(id: u64, author: &str, text: &str, parent_thread: Option<u64>) -> String {
    let parent = parent_thread
        .map(|parent| format!(r#"<li><a href="/comments/{}">Parent Thread</a></li>"#, parent))
        .unwrap_or_default();
    format!(
        r#"<li class="comment" role="article" id="comment_{id}">
             <h4 class="heading byline"><a href="/users/{author}">{author}</a></h4>
             <blockquote class="userstuff"><p>{text}</p></blockquote>
             <ul id="navigation_for_comment_{id}">
               <li id="add_comment_reply_link_{id}"><a href="/comments/add_comment_reply?chapter_id=900&amp;id={id}">Reply</a></li>
               {parent}
             </ul>
           </li>"#
    )
}

/// Wraps reply `li`s in the nested list that follows their parent
pub fn replies(items: &[String]) -> String {
    format!(r#"<li><ol class="thread">{}</ol></li>"#, items.concat())
}

/// A `/comments/{id}` page whose thread is `items`
pub fn comment_page(items: &[String]) -> String {
    page(&format!(r#"<div id="main"><ol class="thread">{}</ol></div>"#, items.concat()))
}
