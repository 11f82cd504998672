//! End-to-end ingestion: HTTP (wiremock) → normalizer → reconcile → SQLite.
//!
//! Each test gets its own in-memory database and mock server. Private hosts
//! are allowed because the mock server listens on 127.0.0.1.

use castfeed::config::{FetchConfig, IngestConfig};
use castfeed::feed::HttpFetcher;
use castfeed::ingest::{IngestError, Ingestor};
use castfeed::reconcile::{FeedRequest, ReconcilePolicy, SkipReason};
use castfeed::storage::{Database, EpisodeFilter};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NS: &str = r#"xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd""#;

fn item(url: &str, title: &str) -> String {
    format!(
        r#"<item><title>{title}</title><pubDate>Mon, 02 Jan 2023 10:00:00 +0000</pubDate><enclosure url="{url}" type="audio/mpeg"/></item>"#
    )
}

fn rss(title: &str, items: &[(&str, &str)]) -> String {
    let items: String = items.iter().map(|(url, title)| item(url, title)).collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0" {NS}><channel><title>{title}</title><link>https://show.example.com</link><itunes:author>The Host</itunes:author>{items}</channel></rss>"#
    )
}

async fn mount(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn ingestor(config: IngestConfig) -> Ingestor<HttpFetcher> {
    let db = Database::open(":memory:").await.unwrap();
    let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
    Ingestor::new(db, fetcher, config).allow_private_hosts(true)
}

fn episode_urls(episodes: &[castfeed::storage::Episode]) -> Vec<&str> {
    let mut urls: Vec<&str> = episodes.iter().map(|e| e.url.as_str()).collect();
    urls.sort_unstable();
    urls
}

// ============================================================================
// add_feed
// ============================================================================

#[tokio::test]
async fn test_add_feed_stores_feed_and_episodes() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/feed.xml",
        rss(
            "My Show",
            &[
                ("https://cdn.example.com/1.mp3", "One"),
                ("https://cdn.example.com/2.mp3", "Two"),
            ],
        ),
    )
    .await;
    let ingestor = ingestor(IngestConfig::default()).await;
    let url = format!("{}/feed.xml", server.uri());

    let outcome = ingestor
        .add_feed(FeedRequest {
            topic: Some("Comedy".into()),
            ..FeedRequest::new(&url)
        })
        .await
        .unwrap();
    assert_eq!(outcome.counts.created, 1);
    assert_eq!(outcome.counts.new_episodes, 2);

    let db = ingestor.database();
    let feed = db.get_feed(outcome.feed_id).await.unwrap().unwrap();
    assert_eq!(feed.url, url);
    assert_eq!(feed.name.as_deref(), Some("My Show"));
    assert_eq!(feed.topic.as_deref(), Some("Comedy"));
    assert_eq!(feed.homepage_url.as_deref(), Some("https://show.example.com"));
    assert!(feed.is_active);
    assert!(feed.last_checked.is_some());

    let episodes = db.episodes_for_feed(feed.id).await.unwrap();
    assert_eq!(
        episode_urls(&episodes),
        vec!["https://cdn.example.com/1.mp3", "https://cdn.example.com/2.mp3"]
    );
    let one = episodes.iter().find(|e| e.title == "One").unwrap();
    assert_eq!(one.host.as_deref(), Some("The Host"));
    assert_eq!(
        one.pub_date.map(|d| d.to_iso8601()).as_deref(),
        Some("2023-01-02T10:00:00+00:00")
    );
    assert!(!one.is_favorite);
}

#[tokio::test]
async fn test_add_feed_twice_is_idempotent() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/feed.xml",
        rss("Show", &[("https://cdn.example.com/1.mp3", "One")]),
    )
    .await;
    let ingestor = ingestor(IngestConfig::default()).await;
    let url = format!("{}/feed.xml", server.uri());

    let first = ingestor.add_feed(FeedRequest::new(&url)).await.unwrap();
    let second = ingestor.add_feed(FeedRequest::new(&url)).await.unwrap();

    assert_eq!(first.feed_id, second.feed_id);
    assert_eq!(second.counts.new_episodes, 0);
    assert_eq!(second.skipped[0].reason, SkipReason::AlreadyKnown);
    assert_eq!(ingestor.database().list_feeds().await.unwrap().len(), 1);
    assert_eq!(
        ingestor
            .database()
            .list_episodes(&EpisodeFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_curated_name_survives_but_placeholder_is_replaced() {
    let server = MockServer::start().await;
    mount(&server, "/a.xml", rss("Parsed A", &[])).await;
    mount(&server, "/b.xml", rss("Parsed B", &[])).await;
    let ingestor = ingestor(IngestConfig::default()).await;
    let url_a = format!("{}/a.xml", server.uri());
    let url_b = format!("{}/b.xml", server.uri());

    let a = ingestor
        .add_feed(FeedRequest {
            name: Some("My Name".into()),
            ..FeedRequest::new(&url_a)
        })
        .await
        .unwrap();
    let b = ingestor
        .add_feed(FeedRequest {
            name: Some("Unknown Feed".into()),
            topic: Some("Unknown Topic".into()),
            ..FeedRequest::new(&url_b)
        })
        .await
        .unwrap();

    ingestor.add_feed(FeedRequest::new(&url_a)).await.unwrap();
    ingestor.add_feed(FeedRequest::new(&url_b)).await.unwrap();

    let db = ingestor.database();
    let a = db.get_feed(a.feed_id).await.unwrap().unwrap();
    let b = db.get_feed(b.feed_id).await.unwrap().unwrap();
    assert_eq!(a.name.as_deref(), Some("My Name"));
    assert_eq!(b.name.as_deref(), Some("Parsed B"));
    // Nothing incoming for topic, so the placeholder stays.
    assert_eq!(b.topic.as_deref(), Some("Unknown Topic"));
}

#[tokio::test]
async fn test_re_adding_does_not_reactivate_feed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/feed.xml",
        rss("Show", &[("https://cdn.example.com/1.mp3", "One")]),
    )
    .await;
    let ingestor = ingestor(IngestConfig::default()).await;
    let url = format!("{}/feed.xml", server.uri());

    let added = ingestor.add_feed(FeedRequest::new(&url)).await.unwrap();
    let db = ingestor.database();
    db.set_feed_active(added.feed_id, false).await.unwrap();

    ingestor.add_feed(FeedRequest::new(&url)).await.unwrap();
    assert!(!db.get_feed(added.feed_id).await.unwrap().unwrap().is_active);

    ingestor
        .add_feed(FeedRequest {
            is_active: Some(true),
            ..FeedRequest::new(&url)
        })
        .await
        .unwrap();
    assert!(db.get_feed(added.feed_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_episode_owned_by_other_feed_is_skipped() {
    let server = MockServer::start().await;
    let shared = "https://cdn.example.com/shared.mp3";
    mount(&server, "/a.xml", rss("A", &[(shared, "Shared")])).await;
    mount(
        &server,
        "/b.xml",
        rss(
            "B",
            &[(shared, "Shared again"), ("https://cdn.example.com/b1.mp3", "B1")],
        ),
    )
    .await;
    let ingestor = ingestor(IngestConfig::default()).await;

    let a = ingestor
        .add_feed(FeedRequest::new(format!("{}/a.xml", server.uri())))
        .await
        .unwrap();
    let b = ingestor
        .add_feed(FeedRequest::new(format!("{}/b.xml", server.uri())))
        .await
        .unwrap();

    assert_eq!(b.counts.new_episodes, 1);
    assert_eq!(b.skipped.len(), 1);
    assert_eq!(b.skipped[0].url, shared);
    assert_eq!(b.skipped[0].reason, SkipReason::OwnedByOtherFeed);

    let owner = ingestor
        .database()
        .find_episode_by_url(shared)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.feed_id, a.feed_id);
    assert_eq!(owner.title, "Shared");
}

// ============================================================================
// refresh_feed
// ============================================================================

#[tokio::test]
async fn test_refresh_replaces_episodes_and_keeps_favorites() {
    let server = MockServer::start().await;
    let ep1 = "https://cdn.example.com/1.mp3";
    let ep2 = "https://cdn.example.com/2.mp3";
    let ep3 = "https://cdn.example.com/3.mp3";

    // The first response is served once, then the updated document.
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(rss("Show", &[(ep1, "One"), (ep2, "Two")])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount(
        &server,
        "/feed.xml",
        rss("Show", &[(ep2, "Two (remastered)"), (ep3, "Three")]),
    )
    .await;

    let ingestor = ingestor(IngestConfig::default()).await;
    let added = ingestor
        .add_feed(FeedRequest::new(format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    let db = ingestor.database();
    let two = db.find_episode_by_url(ep2).await.unwrap().unwrap();
    db.set_episode_favorite(two.id, true).await.unwrap();

    let refreshed = ingestor.refresh_feed(added.feed_id).await.unwrap();
    assert_eq!(refreshed.counts.deleted_episodes, 2);
    assert_eq!(refreshed.counts.new_episodes, 2);

    let episodes = db.episodes_for_feed(added.feed_id).await.unwrap();
    assert_eq!(episode_urls(&episodes), vec![ep2, ep3]);
    let two = episodes.iter().find(|e| e.url == ep2).unwrap();
    assert_eq!(two.title, "Two (remastered)");
    assert!(two.is_favorite);
    assert!(!episodes.iter().find(|e| e.url == ep3).unwrap().is_favorite);
}

#[tokio::test]
async fn test_additive_refresh_policy_keeps_old_episodes() {
    let server = MockServer::start().await;
    let ep1 = "https://cdn.example.com/1.mp3";
    let ep2 = "https://cdn.example.com/2.mp3";
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss("Show", &[(ep1, "One")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount(&server, "/feed.xml", rss("Show", &[(ep2, "Two")])).await;

    let ingestor = ingestor(IngestConfig {
        refresh_policy: ReconcilePolicy::Additive,
        ..IngestConfig::default()
    })
    .await;
    let added = ingestor
        .add_feed(FeedRequest::new(format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let refreshed = ingestor.refresh_feed(added.feed_id).await.unwrap();

    assert_eq!(refreshed.counts.deleted_episodes, 0);
    assert_eq!(refreshed.counts.new_episodes, 1);
    let episodes = ingestor.database().episodes_for_feed(added.feed_id).await.unwrap();
    assert_eq!(episode_urls(&episodes), vec![ep1, ep2]);
}

#[tokio::test]
async fn test_refresh_with_malformed_xml_writes_nothing() {
    let server = MockServer::start().await;
    let ep1 = "https://cdn.example.com/1.mp3";
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss("Show", &[(ep1, "One")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount(&server, "/feed.xml", "<rss><channel><title>Broken".into()).await;

    let ingestor = ingestor(IngestConfig::default()).await;
    let added = ingestor
        .add_feed(FeedRequest::new(format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let before = ingestor.database().get_feed(added.feed_id).await.unwrap();

    let err = ingestor.refresh_feed(added.feed_id).await.unwrap_err();
    assert!(matches!(err, IngestError::Parse(_)), "{err:?}");
    assert_eq!(err.status_class(), 422);

    let db = ingestor.database();
    assert_eq!(db.get_feed(added.feed_id).await.unwrap(), before);
    assert_eq!(
        episode_urls(&db.episodes_for_feed(added.feed_id).await.unwrap()),
        vec![ep1]
    );
}

#[tokio::test]
async fn test_refresh_errors() {
    let server = MockServer::start().await;
    mount(&server, "/feed.xml", rss("Show", &[])).await;
    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body/></html>"))
        .mount(&server)
        .await;
    let ingestor = ingestor(IngestConfig::default()).await;

    let err = ingestor.refresh_feed(42).await.unwrap_err();
    assert!(matches!(err, IngestError::NotFound(42)));
    assert_eq!(err.status_class(), 404);

    let inactive = ingestor
        .add_feed(FeedRequest {
            is_active: Some(false),
            ..FeedRequest::new(format!("{}/feed.xml", server.uri()))
        })
        .await
        .unwrap();
    let err = ingestor.refresh_feed(inactive.feed_id).await.unwrap_err();
    assert!(matches!(err, IngestError::Inactive(_)));

    let err = ingestor
        .add_feed(FeedRequest::new(format!("{}/page.html", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Unsupported(ref root) if root == "html"));

    let err = ingestor
        .add_feed(FeedRequest::new(format!("{}/missing.xml", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(err.status_class(), 502);
    assert_eq!(ingestor.database().list_feeds().await.unwrap().len(), 1);
}

// ============================================================================
// bulk_import
// ============================================================================

#[tokio::test]
async fn test_bulk_import_continues_past_failures() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a.xml",
        rss("A", &[("https://cdn.example.com/a1.mp3", "A1")]),
    )
    .await;
    mount(
        &server,
        "/b.xml",
        rss(
            "B",
            &[
                ("https://cdn.example.com/b1.mp3", "B1"),
                ("https://cdn.example.com/b2.mp3", "B2"),
            ],
        ),
    )
    .await;
    mount(&server, "/broken.xml", "not xml at all <".into()).await;

    let ingestor = ingestor(IngestConfig {
        concurrency: 2,
        ..IngestConfig::default()
    })
    .await;

    // Feed A already exists: it counts as updated, not imported.
    ingestor
        .add_feed(FeedRequest::new(format!("{}/a.xml", server.uri())))
        .await
        .unwrap();

    let summary = ingestor
        .bulk_import(vec![
            FeedRequest::new(format!("{}/a.xml", server.uri())),
            FeedRequest {
                topic: Some("News".into()),
                ..FeedRequest::new(format!("{}/b.xml", server.uri()))
            },
            FeedRequest::new(format!("{}/broken.xml", server.uri())),
            FeedRequest::new("   "),
        ])
        .await;

    assert_eq!(summary.imported, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.new_episodes, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.errors.len(), 2);
    assert!(summary.errors.iter().any(|e| e.contains("/broken.xml")));

    let feeds = ingestor.database().list_feeds().await.unwrap();
    assert_eq!(feeds.len(), 2);
    let b = feeds.iter().find(|f| f.name.as_deref() == Some("B")).unwrap();
    assert_eq!(b.topic.as_deref(), Some("News"));
}
