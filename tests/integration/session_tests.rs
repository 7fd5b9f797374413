//! Logging in and acting on works through guest and logged-in sessions

use crate::common::{connection, gateway, html, mount_page, page};
use ao3_client::session::Commenter;
use ao3_client::{Ao3Error, Session, Work};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PAGE: &str =
    r#"<form action="/users/login" method="post"><input name="authenticity_token" value="login-token"></form>"#;

async fn mount_work(server: &MockServer) {
    mount_page(
        server,
        "/works/3",
        page(
            r#"<dl class="work meta group"><dd class="stats"><dl class="stats"><dd class="chapters">1/1</dd></dl></dd></dl>
               <div id="workskin"><div class="preface group"><h2 class="title heading">Kind Work</h2></div></div>"#,
        ),
    )
    .await;
}

async fn mount_login(server: &MockServer, status: u16) {
    mount_page(server, "/users/login", page(LOGIN_PAGE)).await;
    Mock::given(method("POST"))
        .and(path("/users/login"))
        .and(body_string_contains("authenticity_token=login-token"))
        .respond_with(ResponseTemplate::new(status).insert_header("location", "/users/ann"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_succeeds_on_redirect() {
    let server = MockServer::start().await;
    mount_login(&server, 302).await;

    let session = Session::login(gateway(&server), "ann", "secret")
        .await
        .expect("Login should succeed");
    assert!(session.is_authed());
    assert_eq!(session.username(), "ann");
    assert_eq!(session.authenticity_token().as_deref(), Some("login-token"));
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;

    let result = Session::login(gateway(&server), "ann", "wrong").await;
    assert!(matches!(result, Err(Ao3Error::Login(_))));
}

#[tokio::test]
async fn test_guest_refreshes_token_from_front_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page(LOGIN_PAGE)).await;

    let session = Session::guest(gateway(&server)).unwrap();
    assert_eq!(session.refresh_auth_token().await.unwrap(), "login-token");
    assert_eq!(session.authenticity_token().as_deref(), Some("login-token"));
}

#[tokio::test]
async fn test_guest_kudos() {
    let server = MockServer::start().await;
    mount_work(&server).await;
    Mock::given(method("POST"))
        .and(path("/kudos.js"))
        .and(header("x-csrf-token", "page-token"))
        .and(body_string_contains("kudo%5Bcommentable_id%5D=3"))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/kudos.js"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_string(r#"{"errors":{"ip_address":["^You have already left kudos here. :)"]}}"#),
        )
        .mount(&server)
        .await;

    let session = Arc::new(Session::guest(gateway(&server)).unwrap());
    let work = Work::new(3, session.connection(), true, false).await.unwrap();
    assert!(work.leave_kudos().await.unwrap());
    assert!(!work.leave_kudos().await.unwrap());
}

#[tokio::test]
async fn test_guest_comment() {
    let server = MockServer::start().await;
    mount_work(&server).await;
    Mock::given(method("POST"))
        .and(path("/comments.js"))
        .and(body_string_contains("comment%5Bname%5D=Guest"))
        .respond_with(html(404, "<li class=\"comment\">posted</li>".to_string()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/comments.js"))
        .respond_with(html(200, String::new()))
        .mount(&server)
        .await;

    let session = Arc::new(Session::guest(gateway(&server)).unwrap());
    let work = Work::new(3, session.connection(), true, false).await.unwrap();
    let commenter = Commenter::new("guest@example.com", "Guest");

    let response = work.comment("Lovely!", commenter.clone()).await.unwrap();
    assert!(response.body.contains("posted"));
    assert!(matches!(
        work.comment("Lovely!", commenter).await,
        Err(Ao3Error::DuplicateComment)
    ));
    assert!(matches!(
        work.comment("Lovely!", Commenter::new("", "Guest")).await,
        Err(Ao3Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_actions_need_a_session() {
    let server = MockServer::start().await;
    mount_work(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let work = Work::new(3, connection(&server), true, false)
        .await
        .unwrap();
    assert!(matches!(work.leave_kudos().await, Err(Ao3Error::Auth(_))));
    assert!(matches!(work.subscribe().await, Err(Ao3Error::Auth(_))));

    let guest = Arc::new(Session::guest(gateway(&server)).unwrap());
    let mut work = work;
    work.set_session(Some(guest));
    assert!(matches!(work.subscribe().await, Err(Ao3Error::Auth(_))));
    assert!(matches!(work.is_subscribed(), Err(Ao3Error::Auth(_))));
}

#[tokio::test]
async fn test_logged_in_subscribe() {
    let server = MockServer::start().await;
    mount_login(&server, 302).await;
    mount_work(&server).await;
    Mock::given(method("POST"))
        .and(path("/users/ann/subscriptions"))
        .and(body_string_contains("subscription%5Bsubscribable_type%5D=Work"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/works/3"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(Session::login(gateway(&server), "ann", "secret").await.unwrap());
    let work = Work::new(3, session.connection(), true, false).await.unwrap();
    work.subscribe().await.unwrap();
    assert!(!work.is_subscribed().unwrap());
    assert!(matches!(work.unsubscribe().await, Err(Ao3Error::NotSubscribed(_))));
}
