//! Comment thread resolution against a mock archive

use crate::common::{comment_li, comment_page, connection, html, mount_page, page, replies};
use ao3_client::comments::Commentable;
use ao3_client::{Ao3Error, Comment, Work};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

/// Thread rooted at 1: reply 2 (with reply 3) and reply 4
fn root_page() -> String {
    comment_page(&[
        comment_li(1, "alice", "Root", None),
        replies(&[
            comment_li(2, "bob", "Reply A", Some(1)),
            replies(&[comment_li(3, "cy", "Reply A1", Some(2))]),
            comment_li(4, "dan", "Reply B", Some(1)),
        ]),
    ])
}

async fn mount_once(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(200, body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_thread_iterator_is_depth_first() {
    let server = MockServer::start().await;
    mount_page(&server, "/comments/1", root_page()).await;

    let mut root = Comment::new(1, connection(&server), None, true)
        .await
        .expect("Failed to load comment");
    let ids: Vec<u64> = root
        .get_thread_iterator()
        .await
        .expect("Failed to resolve thread")
        .map(|comment| comment.id())
        .collect();

    assert_eq!(ids, vec![2, 3, 4]);
    assert_eq!(root.parent(), Some(Commentable::Chapter(900)));
}

#[tokio::test]
async fn test_get_thread_fetches_once() {
    let server = MockServer::start().await;
    mount_once(&server, "/comments/1", root_page()).await;

    let mut root = Comment::unloaded(1, connection(&server), None);
    let first: Vec<(u64, Option<String>)> = root
        .get_thread()
        .await
        .unwrap()
        .iter()
        .map(|reply| (reply.id(), reply.author().map(str::to_string)))
        .collect();
    let second: Vec<u64> = root
        .get_thread()
        .await
        .unwrap()
        .iter()
        .map(|reply| reply.id())
        .collect();

    assert_eq!(
        first,
        vec![(2, Some("bob".to_string())), (4, Some("dan".to_string()))]
    );
    assert_eq!(second, vec![2, 4]);
    assert_eq!(root.text().unwrap(), "Root");
}

#[tokio::test]
async fn test_reply_is_spliced_into_root_thread() {
    let server = MockServer::start().await;
    mount_once(&server, "/comments/1", root_page()).await;
    mount_once(
        &server,
        "/comments/2",
        comment_page(&[
            comment_li(2, "bob", "Reply A", Some(1)),
            replies(&[comment_li(3, "cy", "Reply A1", Some(2))]),
        ]),
    )
    .await;
    mount_once(
        &server,
        "/comments/3",
        comment_page(&[comment_li(3, "cy", "Reply A1", Some(2))]),
    )
    .await;

    let mut reply = Comment::new(3, connection(&server), None, true)
        .await
        .unwrap();
    let own_replies = reply.get_thread().await.unwrap().len();
    assert_eq!(own_replies, 0);

    // One node per comment id: the fetched reply took over its slot
    assert_eq!(reply.tree().len(), 4);
    assert_eq!(reply.first_parent_comment().id(), 1);
    assert_eq!(reply.parent_comment().map(|parent| parent.id()), Some(2));
    assert_eq!(reply.text().unwrap(), "Reply A1");

    let top = reply.first_parent_comment();
    let walk: Vec<u64> = top.thread_iter().map(|comment| comment.id()).collect();
    assert_eq!(walk, vec![2, 3, 4]);
    let slot = top
        .thread_iter()
        .find(|comment| comment.id() == 3)
        .expect("Reply missing from the root thread");
    assert_eq!(slot.node_id(), reply.view().node_id());

    let leaf: Vec<u64> = reply
        .get_thread_iterator()
        .await
        .unwrap()
        .map(|comment| comment.id())
        .collect();
    assert_eq!(leaf, vec![3]);
}

#[tokio::test]
async fn test_reply_missing_from_parent_thread_resolves_locally() {
    let server = MockServer::start().await;
    mount_page(&server, "/comments/1", root_page()).await;
    mount_page(
        &server,
        "/comments/7",
        comment_page(&[
            comment_li(7, "eve", "Orphan", Some(1)),
            replies(&[comment_li(8, "fay", "Orphan reply", Some(7))]),
        ]),
    )
    .await;

    let mut orphan = Comment::new(7, connection(&server), None, true)
        .await
        .unwrap();
    let ids: Vec<u64> = orphan
        .get_thread()
        .await
        .unwrap()
        .iter()
        .map(|reply| reply.id())
        .collect();

    assert_eq!(ids, vec![8]);
    assert_eq!(orphan.first_parent_comment().id(), 7);
}

#[tokio::test]
async fn test_missing_comment_is_invalid_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/comments/99"))
        .respond_with(html(404, page("<h2>Error 404</h2>")))
        .mount(&server)
        .await;

    let result = Comment::new(99, connection(&server), None, true).await;
    assert!(matches!(result, Err(Ao3Error::InvalidId(_))));
}

#[tokio::test]
async fn test_error_page_with_ok_status_is_invalid_id() {
    let server = MockServer::start().await;
    mount_page(&server, "/comments/98", page(r#"<h2 class="heading">Error 404</h2>"#)).await;

    let result = Comment::new(98, connection(&server), None, true).await;
    assert!(matches!(result, Err(Ao3Error::InvalidId(_))));
}

#[tokio::test]
async fn test_parent_thread_link_to_itself_resolves_locally() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "/comments/5",
        comment_page(&[comment_li(5, "zed", "Self", Some(5))]),
    )
    .await;

    let mut comment = Comment::new(5, connection(&server), None, true).await.unwrap();
    assert!(comment.get_thread().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_parent_thread_cycle_is_climbed_once() {
    let server = MockServer::start().await;
    mount_once(
        &server,
        "/comments/6",
        comment_page(&[comment_li(6, "amy", "Six", Some(7))]),
    )
    .await;
    mount_once(
        &server,
        "/comments/7",
        comment_page(&[comment_li(7, "ben", "Seven", Some(6))]),
    )
    .await;

    let mut comment = Comment::new(6, connection(&server), None, true).await.unwrap();
    assert!(comment.get_thread().await.unwrap().is_empty());
    assert_eq!(comment.tree().len(), 1);
}

#[tokio::test]
async fn test_work_comments_are_listed_up_to_maximum() {
    let server = MockServer::start().await;
    let listing = page(&format!(
        r#"<div id="comments_placeholder">
             <ol class="thread">{}{}{}</ol>
           </div>"#,
        comment_li(11, "gil", "First", None),
        comment_li(12, "hal", "Second", None),
        comment_li(13, "ivy", "Third", None),
    ));
    mount_page(&server, "/works/5", listing).await;

    let work = Work::unloaded(5, connection(&server));
    let comments = work.get_comments(Some(2)).await.unwrap();

    assert_eq!(comments.iter().map(Comment::id).collect::<Vec<_>>(), vec![11, 12]);
    assert_eq!(comments[1].author().unwrap().as_deref(), Some("hal"));
    assert_eq!(comments[0].parent(), Some(Commentable::Work(5)));
    assert_eq!(comments[0].authenticity_token(), Some("page-token"));
}
