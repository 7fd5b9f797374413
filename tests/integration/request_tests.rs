//! Request budget, redirects and concurrent loading against a mock archive

use crate::common::{connection, gateway, html, init_tracing, mount_page, page};
use ao3_client::{launch, Ao3Error, ClientConfig, Gateway, Mode, RequestBudget, WorkerPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_budget_spaces_requests() {
    init_tracing();
    let server = MockServer::start().await;
    mount_page(&server, "/ping", page("pong")).await;

    let mut config = ClientConfig::default();
    config.archive.base_url = server.uri();
    config.requests.max_per_window = Some(2);
    config.requests.window_secs = 1;
    let gateway = Gateway::new(config).expect("Failed to build gateway");

    let start = Instant::now();
    for _ in 0..3 {
        let response = gateway.get(gateway.url("/ping").unwrap(), None).await.unwrap();
        assert_eq!(response.status.as_u16(), 200);
    }
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(gateway.budget().total(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_budget_admits_in_window_order() {
    let budget = RequestBudget::new(Some(3), Duration::from_secs(60));
    let start = tokio::time::Instant::now();
    for _ in 0..3 {
        budget.acquire().await;
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(budget.in_window().await, 3);

    budget.acquire().await;
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(budget.total(), 4);

    budget.limit_requests(false);
    assert!(!budget.is_limited());
    let before = tokio::time::Instant::now();
    for _ in 0..10 {
        budget.acquire().await;
    }
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/1"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server);
    let error = conn.get(conn.url("/works/1").unwrap()).await.unwrap_err();
    assert!(matches!(error, Ao3Error::RateLimited));
    assert!(error.is_rate_limited());
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/works/new"))
        .mount(&server)
        .await;
    mount_page(&server, "/works/new", page("Moved here")).await;

    let conn = connection(&server);
    let response = conn.get(conn.url("/works/old").unwrap()).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.url.path(), "/works/new");
    assert!(response.body.contains("Moved here"));
}

#[tokio::test]
async fn test_redirect_loop_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .mount(&server)
        .await;

    let conn = connection(&server);
    let error = conn.get(conn.url("/a").unwrap()).await.unwrap_err();
    assert!(matches!(error, Ao3Error::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_pool_keeps_submission_order() {
    let server = MockServer::start().await;
    for (route, delay) in [("/slow", 200), ("/medium", 100), ("/fast", 0)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                html(200, page(route)).set_delay(Duration::from_millis(delay)),
            )
            .mount(&server)
            .await;
    }

    let gateway: Arc<Gateway> = gateway(&server);
    let mut pool = WorkerPool::new(Some(3));
    for route in ["/slow", "/medium", "/fast"] {
        let gateway = gateway.clone();
        pool.add_task(async move {
            let response = gateway.get(gateway.url(route)?, None).await?;
            Ok::<_, Ao3Error>(response.url.path().to_string())
        });
    }
    let paths: Vec<String> = pool
        .run()
        .await
        .unwrap()
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(paths, vec!["/slow", "/medium", "/fast"]);
}

#[tokio::test]
async fn test_background_launch_fetches_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page("front")).await;

    let conn = connection(&server);
    let launched = launch(Mode::Background, async move {
        let url = conn.url("/")?;
        conn.get(url).await
    })
    .await;
    assert!(launched.is_background());
    let response = launched.join().await.unwrap().unwrap();
    assert!(response.body.contains("front"));
}
