//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! fetch, parse, dedup and enqueue cycle end-to-end.

use aoty_harvest::config::{Config, CrawlerConfig, FieldKind, FieldSpec, OutputConfig};
use aoty_harvest::crawler::{harvest, Coordinator};
use aoty_harvest::output::{FailureKind, JsonLinesSink, MemorySink, RecordSink};
use aoty_harvest::storage::{open_store, RunStatus, StateStore};
use aoty_harvest::HarvestError;
use std::path::Path;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with a single `title` field
fn create_test_config(seeds: Vec<String>) -> Config {
    let mut config = Config {
        seeds,
        crawler: CrawlerConfig {
            max_concurrency: 4,
            max_per_host_concurrency: 2,
            max_retries: 2,
            request_timeout_ms: 2_000,
            politeness_delay_ms: 0,
            max_depth: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 20,
            shutdown_grace_ms: 500,
        },
        ..Default::default()
    };
    config.user_agent.crawler_name = "TestBot".to_string();
    config
        .extraction
        .fields
        .push(FieldSpec::new("title", "h1", FieldKind::Text));
    config
}

fn with_state(mut config: Config, db_path: &Path) -> Config {
    config.output = OutputConfig {
        records_path: None,
        state_path: Some(db_path.to_string_lossy().into_owned()),
    };
    config
}

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_page_extracts_title() {
    let mock_server = MockServer::start().await;
    mount_html(
        &mock_server,
        "/1",
        r#"<html><body><h1>Foo</h1><a href="https://elsewhere.test/x">away</a></body></html>"#
            .to_string(),
    )
    .await;

    let config = create_test_config(vec![format!("{}/1", mock_server.uri())]);
    let mut sink = MemorySink::new();
    let summary = harvest(config, &mut sink).await.expect("harvest should succeed");

    assert_eq!(sink.len(), 1);
    let record = &sink.records()[0];
    assert_eq!(record.text("title"), Some("Foo"));
    assert!(record.links.is_empty());
    assert_eq!(summary.records, 1);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn test_server_error_exhausts_retries() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![format!("{}/bad", mock_server.uri())]);
    let mut sink = MemorySink::new();
    let summary = harvest(config, &mut sink).await.unwrap();

    assert!(sink.is_empty());
    assert_eq!(summary.records, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::TooManyRetries);
    assert_eq!(summary.failures[0].retries, 2);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![format!("{}/missing", mock_server.uri())]);
    let summary = harvest(config, &mut MemorySink::new()).await.unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::HttpError(404));
    assert_eq!(summary.failures[0].retries, 0);
}

#[tokio::test]
async fn test_rate_limited_then_recovers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/busy", "<h1>Eventually</h1>".to_string()).await;

    let config = create_test_config(vec![format!("{}/busy", mock_server.uri())]);
    let mut sink = MemorySink::new();
    let summary = harvest(config, &mut sink).await.unwrap();

    assert!(!summary.has_failures());
    assert_eq!(sink.records()[0].text("title"), Some("Eventually"));
}

#[tokio::test]
async fn test_retries_keep_politeness_delay() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(vec![format!("{}/bad", mock_server.uri())]);
    config.crawler.politeness_delay_ms = 250;

    let summary = harvest(config, &mut MemorySink::new()).await.unwrap();

    assert_eq!(summary.failures[0].kind, FailureKind::TooManyRetries);
    // Three requests to one host need two politeness gaps
    assert!(
        summary.elapsed >= Duration::from_millis(500),
        "three requests to one host within {:?}",
        summary.elapsed
    );
}

#[tokio::test]
async fn test_long_retry_after_is_not_shortened() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(vec![format!("{}/busy", mock_server.uri())]);
    let summary = harvest(config, &mut MemorySink::new()).await.unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::HttpError(429));
    assert_eq!(summary.failures[0].retries, 0);
}

#[tokio::test]
async fn test_breadth_first_dispatch_order() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    mount_html(&mock_server, "/a", format!(r#"<h1>A</h1><a href="{}/a-child">c</a>"#, base)).await;
    mount_html(&mock_server, "/b", format!(r#"<h1>B</h1><a href="{}/b-child">c</a>"#, base)).await;
    mount_html(&mock_server, "/a-child", "<h1>AC</h1>".to_string()).await;
    mount_html(&mock_server, "/b-child", "<h1>BC</h1>".to_string()).await;

    let mut config = create_test_config(vec![format!("{}/a", base), format!("{}/b", base)]);
    config.crawler.max_concurrency = 1;
    config.crawler.max_per_host_concurrency = 1;

    let summary = harvest(config, &mut MemorySink::new()).await.unwrap();
    assert_eq!(summary.records, 4);

    let order: Vec<String> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect();

    let position = |p: &str| order.iter().position(|o| o == p).unwrap();
    assert!(position("/a") < position("/a-child"));
    assert!(position("/a") < position("/b-child"));
    assert!(position("/b") < position("/a-child"));
    assert!(position("/b") < position("/b-child"));
}

#[tokio::test]
async fn test_second_run_dispatches_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Once</h1>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let config = with_state(create_test_config(vec![format!("{}/1", mock_server.uri())]), &db_path);

    let first = Coordinator::new(config.clone(), false)
        .unwrap()
        .run(&mut MemorySink::new())
        .await
        .unwrap();
    assert_eq!(first.dispatched, 1);

    let second = Coordinator::new(config, false)
        .unwrap()
        .run(&mut MemorySink::new())
        .await
        .unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.records, 0);
    assert_eq!(second.duplicates, 1);

    let store = open_store(&db_path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.latest_run.unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_fresh_run_refetches() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Twice</h1>"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = with_state(
        create_test_config(vec![format!("{}/1", mock_server.uri())]),
        &dir.path().join("state.db"),
    );

    for _ in 0..2 {
        let summary = Coordinator::new(config.clone(), true)
            .unwrap()
            .run(&mut MemorySink::new())
            .await
            .unwrap();
        assert_eq!(summary.records, 1);
    }
}

#[tokio::test]
async fn test_cancelled_run_resumes_from_frontier() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Later</h1>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let config = with_state(create_test_config(vec![format!("{}/1", mock_server.uri())]), &db_path);

    let coordinator = Coordinator::new(config.clone(), false).unwrap();
    coordinator.cancel_handle().cancel();
    let interrupted = coordinator.run(&mut MemorySink::new()).await.unwrap();
    assert!(interrupted.cancelled);
    assert_eq!(interrupted.abandoned.len(), 1);

    {
        let store = open_store(&db_path).unwrap();
        assert_eq!(store.load_frontier().unwrap().len(), 1);
        assert_eq!(
            store.latest_run().unwrap().unwrap().status,
            RunStatus::Interrupted
        );
    }

    let mut sink = MemorySink::new();
    let resumed = Coordinator::new(config, false)
        .unwrap()
        .run(&mut sink)
        .await
        .unwrap();
    assert_eq!(resumed.records, 1);
    assert_eq!(sink.records()[0].text("title"), Some("Later"));

    let store = open_store(&db_path).unwrap();
    assert!(store.load_frontier().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_with_fetch_in_flight_saves_it_for_resume() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1>Slow</h1>")
                .set_delay(Duration::from_secs(1)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/slow", "<h1>Slow</h1>".to_string()).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let mut config = with_state(
        create_test_config(vec![format!("{}/slow", mock_server.uri())]),
        &db_path,
    );
    config.crawler.shutdown_grace_ms = 100;

    let coordinator = Coordinator::new(config.clone(), false).unwrap();
    let cancel = coordinator.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let interrupted = coordinator.run(&mut MemorySink::new()).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(900));

    assert!(interrupted.cancelled);
    assert_eq!(interrupted.records, 0);
    assert_eq!(interrupted.dispatched, 1);
    assert_eq!(interrupted.abandoned.len(), 1);
    assert_eq!(interrupted.abandoned[0].reason, "in flight at cancellation");
    assert!(interrupted.abandoned[0].target.ends_with("/slow"));
    assert!(!interrupted.has_failures());

    {
        let store = open_store(&db_path).unwrap();
        let frontier = store.load_frontier().unwrap();
        assert_eq!(frontier.len(), 1);
        assert!(frontier[0].target.ends_with("/slow"));
        assert_eq!(
            store.latest_run().unwrap().unwrap().status,
            RunStatus::Interrupted
        );
    }

    let mut sink = MemorySink::new();
    let resumed = Coordinator::new(config, false)
        .unwrap()
        .run(&mut sink)
        .await
        .unwrap();
    assert_eq!(resumed.records, 1);
    assert_eq!(sink.records()[0].text("title"), Some("Slow"));
    assert!(open_store(&db_path).unwrap().load_frontier().unwrap().is_empty());
}

#[tokio::test]
async fn test_unread_stream_holds_back_fetching() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let links: String = (0..20)
        .map(|i| format!(r#"<a href="{}/p/{}">{}</a>"#, base, i, i))
        .collect();
    mount_html(&mock_server, "/root", format!("<h1>Root</h1>{}", links)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Page</h1>"))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(vec![format!("{}/root", base)]);
    config.crawler.max_concurrency = 2;
    config.crawler.max_per_host_concurrency = 2;

    let stream = Coordinator::new(config, false).unwrap().stream();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let fetched = mock_server.received_requests().await.unwrap().len();
    assert!(fetched <= 6, "fetched {} pages while nothing was read", fetched);

    let (records, summary) = stream.finish().await.unwrap();
    assert_eq!(records.len(), 21);
    assert_eq!(summary.records, 21);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 21);
}

#[tokio::test]
async fn test_stream_yields_records_lazily() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    mount_html(&mock_server, "/1", format!(r#"<h1>One</h1><a href="{}/2">2</a>"#, base)).await;
    mount_html(&mock_server, "/2", "<h1>Two</h1>".to_string()).await;

    let coordinator = Coordinator::new(create_test_config(vec![format!("{}/1", base)]), false).unwrap();
    let mut stream = coordinator.stream();

    let first = stream.next().await.expect("first record");
    assert_eq!(first.text("title"), Some("One"));

    let (rest, summary) = stream.finish().await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].text("title"), Some("Two"));
    assert_eq!(summary.records, 2);
}

#[tokio::test]
async fn test_invalid_markup_is_reported_not_fatal() {
    let mock_server = MockServer::start().await;
    mount_html(&mock_server, "/text", "just some plain text".to_string()).await;
    mount_html(&mock_server, "/ok", "<p>no title here</p>".to_string()).await;

    let base = mock_server.uri();
    let config = create_test_config(vec![format!("{}/text", base), format!("{}/ok", base)]);
    let mut sink = MemorySink::new();
    let summary = harvest(config, &mut sink).await.unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(sink.records()[0].get("title"), None);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::InvalidMarkup);
}

#[tokio::test]
async fn test_misconfiguration_fails_before_fetching() {
    let mock_server = MockServer::start().await;

    let mut config = create_test_config(vec![format!("{}/1", mock_server.uri())]);
    config.extraction.fields.clear();
    let result = harvest(config, &mut MemorySink::new()).await;
    assert!(matches!(result, Err(HarvestError::Config(_))));

    let config = create_test_config(vec!["not a url".to_string()]);
    let result = harvest(config, &mut MemorySink::new()).await;
    assert!(matches!(result, Err(HarvestError::Config(_))));

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_album_preset_with_json_lines_output() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    mount_html(
        &mock_server,
        "/album/1-loveless.php",
        format!(
            r#"<html><body>
            <h1 class="albumTitle"><span itemprop="name">Loveless</span></h1>
            <div class="artist"><span itemprop="name"><a href="/artist/9-mbv.php">My Bloody Valentine</a></span></div>
            <div class="albumUserScore"><a title="88.2">88</a></div>
            <table class="trackListTable">
              <tr><td class="trackNumber">1</td><td class="trackTitle"><a>Only Shallow</a><div class="length">4:17</div></td></tr>
              <tr><td class="trackNumber">2</td><td class="trackTitle"><a>Loomer</a><div class="length">2:38</div></td></tr>
            </table>
            <a href="{}/album/2-isnt-anything.php">related</a>
            </body></html>"#,
            base
        ),
    )
    .await;
    mount_html(
        &mock_server,
        "/album/2-isnt-anything.php",
        r#"<h1 class="albumTitle"><span itemprop="name">Isn't Anything</span></h1>"#.to_string(),
    )
    .await;

    let mut config = create_test_config(vec![format!("{}/album/1-loveless.php", base)]);
    config.extraction.fields.clear();
    config.extraction.preset = Some("album".to_string());

    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("records.jsonl");
    let mut sink = JsonLinesSink::create(&records_path).unwrap();
    let summary = harvest(config, &mut sink).await.unwrap();
    sink.flush().unwrap();
    drop(sink);

    assert_eq!(summary.records, 2);
    // The artist link does not match the album pattern
    assert_eq!(summary.discovered, 1);

    let contents = std::fs::read_to_string(&records_path).unwrap();
    let records: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);

    let first = records
        .iter()
        .find(|r| r["fields"]["title"] == "Loveless")
        .expect("album record");
    assert_eq!(first["fields"]["artist"], "My Bloody Valentine");
    assert_eq!(first["fields"]["user_score"], 88.2);
    assert_eq!(first["fields"]["tracklist"][1]["title"], "Loomer");
    assert_eq!(first["fields"]["tracklist"][0]["duration"], "4:17");
    assert!(first["fields"]["critic_score"].is_null());
}
