//! End-to-end tests for the harvesting pipeline
//!
//! These tests run both harvesting phases against a wiremock site, with a
//! fake exit network standing in for Tor and a temporary SQLite database.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::config::parse_config;
use sumi_harvest::fetch::{build_http_client, HttpFetcher};
use sumi_harvest::partition::{RangeAssignment, RangeSource};
use sumi_harvest::pipeline::{Harvester, Pipeline};
use sumi_harvest::rotation::{
    ExitNetwork, IpAuthority, IpChanger, LocalSafety, Retention, RotationError,
};
use sumi_harvest::site::{SiteCapability, SiteRegistry};
use sumi_harvest::storage::{lock_storage, share, SharedStorage, SqliteStorage, Storage};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING_PAGES: u64 = 4;
const ITEMS_PER_PAGE: u64 = 3;

/// Exit network handing out 10.0.0.1, 10.0.0.2, ... on every renewal
struct SequentialNetwork {
    next: AtomicU32,
    renewals: Arc<AtomicU32>,
}

#[async_trait]
impl ExitNetwork for SequentialNetwork {
    async fn renew_exit_circuit(&self) -> Result<(), RotationError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        self.next.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_exit_address(&self) -> Result<IpAddr, RotationError> {
        let n = self.next.load(Ordering::SeqCst);
        Ok(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + n)))
    }
}

/// Mounts the listing pages and their item pages
async fn mount_site(mock_server: &MockServer, pages: u64, items_per_page: u64) {
    for page in 1..=pages {
        let links: String = (1..=items_per_page)
            .map(|item| format!(r#"<h3><a href="/posts/{}-{}">Post</a></h3>"#, page, item))
            .collect();

        Mock::given(method("GET"))
            .and(path("/posts/"))
            .and(query_param("page", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<html><body>{}</body></html>", links)),
            )
            .mount(mock_server)
            .await;

        for item in 1..=items_per_page {
            Mock::given(method("GET"))
                .and(path(format!("/posts/{}-{}", page, item)))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "<html><body><h1>Post {}-{}</h1></body></html>",
                    page, item
                )))
                .mount(mock_server)
                .await;
        }
    }
}

struct Fixture {
    harvester: Harvester,
    storage: SharedStorage,
    renewals: Arc<AtomicU32>,
    _dir: TempDir,
}

fn fixture(base_url: &str, workers: usize, range: RangeAssignment) -> Fixture {
    fixture_with(base_url, workers, range, "")
}

/// `pipeline_extra` is appended to the `[pipeline]` table
fn fixture_with(base_url: &str, workers: usize, range: RangeAssignment, pipeline_extra: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");

    let config = parse_config(&format!(
        r#"
[pipeline]
workers-count = {}
poll-interval-ms = 50
transaction-size = 5
{}

[output]
database-path = "{}"

[site]
kind = "example"
base-url = "{}/posts/"
list-url-template = "?page="
lists-count = {}
"#,
        workers,
        pipeline_extra,
        db_path.display(),
        base_url,
        LISTING_PAGES
    ))
    .expect("Failed to parse config");

    let storage = share(SqliteStorage::new(Path::new(&db_path), config.pipeline.transaction_size).unwrap());

    let renewals = Arc::new(AtomicU32::new(0));
    let network = SequentialNetwork {
        next: AtomicU32::new(0),
        renewals: Arc::clone(&renewals),
    };
    let authority = Arc::new(IpAuthority::new(
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
        Retention::RetainAll,
    ));
    let rotator = Arc::new(IpChanger::new(
        network,
        LocalSafety::new(authority),
        5,
        Duration::ZERO,
    ));

    let client = build_http_client(None, Duration::from_secs(5)).unwrap();
    let fetcher = Arc::new(HttpFetcher::with_client(client, config.proxy.user_agents.clone()));
    let site: Arc<dyn SiteCapability> = Arc::from(SiteRegistry::with_builtin().build(&config.site).unwrap());

    let pipeline = Pipeline::new(&config.pipeline, fetcher, rotator, site, Arc::clone(&storage));
    let harvester = Harvester::new(pipeline, RangeSource::Local(range));

    Fixture {
        harvester,
        storage,
        renewals,
        _dir: dir,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_harvest() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, LISTING_PAGES, ITEMS_PER_PAGE).await;

    let fixture = fixture(&mock_server.uri(), 2, RangeAssignment::new(LISTING_PAGES, 0));

    fixture.harvester.prepare().await.expect("Initial rotation failed");
    let (lists, items) = fixture.harvester.harvest().await.expect("Harvest failed");

    assert_eq!(lists.urls_to_process, LISTING_PAGES);
    assert_eq!(lists.urls_processed, LISTING_PAGES);
    assert_eq!(items.urls_to_process, LISTING_PAGES * ITEMS_PER_PAGE);
    assert_eq!(items.urls_processed, LISTING_PAGES * ITEMS_PER_PAGE);

    let storage = lock_storage(&fixture.storage).unwrap();
    assert_eq!(storage.count_records().unwrap(), LISTING_PAGES * ITEMS_PER_PAGE);
    assert_eq!(storage.count_pending().unwrap(), 0);

    // One rotation up front, then at least one per batch
    let renewals = fixture.renewals.load(Ordering::SeqCst) as u64;
    assert!(renewals >= 1 + (LISTING_PAGES + LISTING_PAGES * ITEMS_PER_PAGE) / 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hundred_items_with_single_worker() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, 10, 10).await;

    let fixture = fixture(&mock_server.uri(), 1, RangeAssignment::new(10, 0));

    fixture.harvester.collect_list_urls().await.unwrap();
    fixture.harvester.collect_item_properties().await.unwrap();

    let storage = lock_storage(&fixture.storage).unwrap();
    assert_eq!(storage.count_records().unwrap(), 100);
    assert_eq!(storage.count_pending().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_list_phase_only_leaves_urls_pending() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server, LISTING_PAGES, ITEMS_PER_PAGE).await;

    // Pages 3 and 4 only
    let fixture = fixture(&mock_server.uri(), 3, RangeAssignment::new(4, 2));

    let summary = fixture.harvester.collect_list_urls().await.unwrap();
    assert_eq!(summary.urls_processed, 2);

    let mut storage = lock_storage(&fixture.storage).unwrap();
    assert_eq!(storage.count_records().unwrap(), 0);
    assert_eq!(storage.count_pending().unwrap(), 2 * ITEMS_PER_PAGE);

    let pending = storage.pending_item_urls().unwrap();
    assert!(pending.iter().all(|url| url.contains("/posts/3-") || url.contains("/posts/4-")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_items_are_retried_until_they_succeed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<h3><a href="/posts/flaky">Flaky</a></h3><h3><a href="/posts/steady">Steady</a></h3>"#,
        ))
        .mount(&mock_server)
        .await;

    // First two attempts fail with a retryable status
    Mock::given(method("GET"))
        .and(path("/posts/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Flaky</h1>"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/steady"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Steady</h1>"))
        .mount(&mock_server)
        .await;

    let fixture = fixture(&mock_server.uri(), 2, RangeAssignment::new(1, 0));

    let lists = fixture.harvester.collect_list_urls().await.unwrap();
    assert_eq!(lists.urls_processed, 1);

    let items = fixture.harvester.collect_item_properties().await.unwrap();
    assert_eq!(items.urls_processed, 2);

    let storage = lock_storage(&fixture.storage).unwrap();
    assert_eq!(storage.count_records().unwrap(), 2);
    assert_eq!(storage.count_pending().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_on_demand_rotation_follows_rate_limits() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<h3><a href="/posts/limited">Limited</a></h3>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Limited</h1>"))
        .mount(&mock_server)
        .await;

    let fixture = fixture_with(
        &mock_server.uri(),
        2,
        RangeAssignment::new(1, 0),
        "rotation = \"on-demand\"\nrotate-on-status = [429]",
    );

    fixture.harvester.collect_list_urls().await.unwrap();
    let items = fixture.harvester.collect_item_properties().await.unwrap();

    assert_eq!(items.urls_processed, 1);
    assert_eq!(lock_storage(&fixture.storage).unwrap().count_records().unwrap(), 1);

    // Only the rate-limited batch switched the exit address
    assert_eq!(fixture.renewals.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_range_does_nothing() {
    let mock_server = MockServer::start().await;
    let fixture = fixture(&mock_server.uri(), 2, RangeAssignment::EMPTY);

    let summary = fixture.harvester.collect_list_urls().await.unwrap();

    assert_eq!(summary.urls_to_process, 0);
    assert_eq!(summary.urls_processed, 0);
    assert_eq!(fixture.renewals.load(Ordering::SeqCst), 0);
}
