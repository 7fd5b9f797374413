//! Loading works, series, users and searches from a mock archive

use crate::common::{connection, html, mount_page, page};
use ao3_client::search::SortColumn;
use ao3_client::{Ao3Error, Chapter, Constraint, Search, SearchQuery, Series, User, Work};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn work_page(title: &str, kudos: u64) -> String {
    page(&format!(
        r#"<dl class="work meta group">
             <dd class="language">English</dd>
             <dd class="stats"><dl class="stats">
               <dd class="published">2022-02-02</dd>
               <dd class="words">12</dd>
               <dd class="chapters">1/1</dd>
               <dd class="kudos">{kudos}</dd>
             </dl></dd>
           </dl>
           <ul class="work navigation actions">
             <li class="download"><ul><li><a href="/downloads/3/Work.epub?updated_at=1650000000">EPUB</a></li></ul></li>
           </ul>
           <div id="workskin">
             <div class="preface group">
               <h2 class="title heading">{title}</h2>
               <h3 class="byline heading"><a rel="author" href="/users/ann">ann</a></h3>
             </div>
             <div id="chapters" role="article"><div class="userstuff"><p>Only chapter.</p></div></div>
           </div>"#
    ))
}

#[tokio::test]
async fn test_work_loads_and_reload_invalidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/3"))
        .and(query_param("view_full_work", "true"))
        .respond_with(html(200, work_page("First Title", 10)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works/3"))
        .respond_with(html(200, work_page("Second Title", 25)))
        .mount(&server)
        .await;

    let mut work = Work::new(3, connection(&server), true, true)
        .await
        .expect("Failed to load work");
    assert_eq!(work.title().unwrap(), "First Title");
    assert_eq!(work.kudos().unwrap(), 10);
    assert_eq!(work.authors().unwrap(), vec!["ann"]);
    assert!(work.complete().unwrap());
    assert_eq!(work.chapters().len(), 1);
    assert!(work.chapters()[0].oneshot());
    assert_eq!(work.chapters()[0].text().unwrap(), "Only chapter.");

    work.reload(false).await.unwrap();
    assert_eq!(work.title().unwrap(), "Second Title");
    assert_eq!(work.kudos().unwrap(), 25);
}

#[tokio::test]
async fn test_missing_work_is_invalid_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/404"))
        .respond_with(html(404, page(r#"<h2 class="heading">Error 404</h2>"#)))
        .mount(&server)
        .await;

    let result = Work::new(404, connection(&server), true, false).await;
    assert!(matches!(result, Err(Ao3Error::InvalidId(_))));
}

#[tokio::test]
async fn test_unloaded_work_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let work = Work::new(3, connection(&server), false, false).await.unwrap();
    assert!(!work.is_loaded());
    assert!(matches!(work.title(), Err(Ao3Error::Unloaded(_))));
    assert!(matches!(work.kudos(), Err(Ao3Error::Unloaded(_))));
}

#[tokio::test]
async fn test_work_download() {
    let server = MockServer::start().await;
    mount_page(&server, "/works/3", work_page("Downloadable", 1)).await;
    Mock::given(method("GET"))
        .and(path("/downloads/3/Work.epub"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"EPUB-BYTES".to_vec()))
        .mount(&server)
        .await;

    let work = Work::new(3, connection(&server), true, false).await.unwrap();
    let bytes = work.download("epub").await.unwrap();
    assert_eq!(bytes, b"EPUB-BYTES");
    assert!(matches!(work.download("MOBI").await, Err(Ao3Error::UnexpectedResponse(_))));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("work.epub");
    work.download_to_file("EPUB", &file).await.unwrap();
    assert_eq!(std::fs::read(&file).unwrap(), b"EPUB-BYTES");
}

#[tokio::test]
async fn test_chapter_discovers_its_work() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/chapters/77",
        page(r#"<ul class="work navigation actions"><li class="chapter entire"><a href="/works/5?view_full_work=true">Entire Work</a></li></ul>"#),
    )
    .await;
    mount_page(
        &server,
        "/works/5",
        page(
            r#"<dl class="work meta group"><dd class="stats"><dl class="stats"><dd class="chapters">2/2</dd></dl></dd></dl>
               <div id="workskin">
                 <div class="preface group"><h2 class="title heading">Two Parter</h2></div>
                 <div id="chapters">
                   <div class="chapter" id="chapter-1">
                     <div class="chapter preface group"><h3 class="title"><a href="/works/5/chapters/76">Chapter 1</a></h3></div>
                     <div class="userstuff module" role="article"><p>Part one.</p></div>
                   </div>
                   <div class="chapter" id="chapter-2">
                     <div class="chapter preface group"><h3 class="title"><a href="/works/5/chapters/77">Chapter 2</a>: The End</h3></div>
                     <div class="userstuff module" role="article"><p>Part two.</p></div>
                   </div>
                 </div>
               </div>"#,
        ),
    )
    .await;

    let chapter = Chapter::new(77, connection(&server), true).await.unwrap();
    assert_eq!(chapter.work_id(), Some(5));
    assert_eq!(chapter.number().unwrap(), 2);
    assert_eq!(chapter.title().unwrap(), "The End");
    assert_eq!(chapter.text().unwrap(), "Part two.");
    assert_eq!(chapter.authenticity_token(), Some("page-token"));
}

#[tokio::test]
async fn test_series_loads_work_list() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/series/8",
        page(
            r#"<div class="series-show region">
                 <h2 class="heading">Saga</h2>
                 <dl class="series meta group">
                   <dt>Creator:</dt><dd><a rel="author" href="/users/ann">ann</a></dd>
                   <dt>Stats:</dt><dd><dl class="stats"><dt>Works:</dt><dd>2</dd><dt>Complete:</dt><dd>No</dd></dl></dd>
                 </dl>
                 <ul class="series work index group">
                   <li role="article"><h4 class="heading"><a href="/works/1">One</a></h4></li>
                   <li role="article"><h4 class="heading"><a href="/works/2">Two</a></h4></li>
                 </ul>
               </div>"#,
        ),
    )
    .await;

    let series = Series::new(8, connection(&server), true).await.unwrap();
    assert_eq!(series.name().unwrap(), "Saga");
    assert_eq!(series.nworks().unwrap(), 2);
    assert!(!series.complete().unwrap());
    let titles: Vec<String> = series
        .work_list()
        .unwrap()
        .iter()
        .map(|work| work.title().unwrap())
        .collect();
    assert_eq!(titles, vec!["One", "Two"]);
    assert_eq!(series.authenticity_token().unwrap().as_deref(), Some("page-token"));
}

#[tokio::test]
async fn test_user_loads_three_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/users/someone/works",
        page(
            r#"<div class="works-index dashboard filtered region">
                 <h2 class="heading">2 Works by someone</h2>
                 <ol class="work index group">
                   <li role="article"><h4 class="heading"><a href="/works/21">Alpha</a></h4></li>
                   <li role="article"><h4 class="heading"><a href="/works/22">Beta</a></h4></li>
                 </ol>
               </div>"#,
        ),
    )
    .await;
    mount_page(
        &server,
        "/users/someone/profile",
        page(r#"<div class="bio module"><blockquote class="userstuff">Writes things.</blockquote></div>"#),
    )
    .await;
    mount_page(
        &server,
        "/users/someone/bookmarks",
        page(
            r#"<div class="bookmarks-index dashboard filtered region">
                 <h2 class="heading">1 Bookmark by someone</h2>
               </div>"#,
        ),
    )
    .await;

    let mut user = User::new("someone", connection(&server), true).await.unwrap();
    assert!(user.is_loaded());
    assert_eq!(user.bio().unwrap(), "Writes things.");
    assert_eq!(user.works().unwrap(), 2);
    assert_eq!(user.bookmarks().unwrap(), 1);
    assert_eq!(user.authenticity_token(), Some("page-token"));

    let ids: Vec<u64> = user
        .get_works(true)
        .await
        .unwrap()
        .iter()
        .map(Work::id)
        .collect();
    assert_eq!(ids, vec![21, 22]);
}

#[tokio::test]
async fn test_user_missing_on_reload_is_unloaded() {
    let server = MockServer::start().await;
    for listing in ["works", "profile", "bookmarks"] {
        Mock::given(method("GET"))
            .and(path(format!("/users/gone/{}", listing)))
            .respond_with(html(
                200,
                page(r#"<div class="bio module"><blockquote class="userstuff">Was here.</blockquote></div>"#),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(html(404, page(r#"<h2 class="heading">Error 404</h2>"#)))
        .mount(&server)
        .await;

    let mut user = User::new("gone", connection(&server), true).await.unwrap();
    assert_eq!(user.bio().unwrap(), "Was here.");

    let result = user.reload().await;
    assert!(matches!(result, Err(Ao3Error::InvalidId(_))));
    assert!(!user.is_loaded());
    assert_eq!(user.authenticity_token(), None);
    assert!(matches!(user.bio(), Err(Ao3Error::Unloaded(_))));
}

#[tokio::test]
async fn test_search_update() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/search"))
        .and(query_param("work_search[query]", "dragons"))
        .and(query_param("work_search[word_count]", ">1000"))
        .and(query_param("work_search[sort_column]", "kudos_count"))
        .respond_with(html(
            200,
            page(
                r#"<div id="main" class="works-search region">
                     <h3 class="heading">41 Found</h3>
                     <ol class="work index group">
                       <li role="article"><h4 class="heading"><a href="/works/31">Wyrm</a> by <a rel="author" href="/users/x">x</a></h4></li>
                     </ol>
                   </div>"#,
            ),
        ))
        .mount(&server)
        .await;

    let query = SearchQuery {
        word_count: Some(Constraint::at_least(1000)),
        sort_column: Some(SortColumn::Kudos),
        ..SearchQuery::new("dragons")
    };
    let mut search = Search::new(query, connection(&server));
    assert!(search.results().is_none());

    search.update().await.unwrap();
    assert_eq!(search.total_results(), 41);
    assert_eq!(search.pages(), 3);
    let results = search.results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title().unwrap(), "Wyrm");
    assert_eq!(results[0].authors().unwrap(), vec!["x"]);
}

#[tokio::test]
async fn test_search_without_results() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/works/search",
        page("<p>No results found. You may want to edit your search to make it less specific.</p>"),
    )
    .await;

    let mut search = Search::new(SearchQuery::new("zzzz"), connection(&server));
    search.update().await.unwrap();
    assert_eq!(search.results().map(<[Work]>::len), Some(0));
    assert_eq!(search.pages(), 0);
}
