// Crawl tests against mock HTTP servers

use sitemapper_core::sitemap::{SitemapIndexDoc, SitemapRef, UrlEntry, UrlSetDoc};
use sitemapper_validator::job::{JobStatus, JobStore};
use sitemapper_validator::log::{ResultLog, parse_rows};
use sitemapper_validator::result::{Outcome, ValidationRow};
use sitemapper_validator::service::ValidationService;
use sitemapper_validator::validator::{Gates, INVALID_FORMAT, Validator, ValidatorConfig};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn index_xml(locations: &[String]) -> Vec<u8> {
    SitemapIndexDoc {
        sitemaps: locations
            .iter()
            .map(|l| SitemapRef {
                location: l.clone(),
                last_modified: Some("2024-03-05".to_string()),
            })
            .collect(),
    }
    .to_xml()
    .unwrap()
}

fn urlset_xml(locations: &[String]) -> Vec<u8> {
    UrlSetDoc {
        news_namespace: false,
        urls: locations
            .iter()
            .map(|l| UrlEntry {
                location: l.clone(),
                ..Default::default()
            })
            .collect(),
    }
    .to_xml()
    .unwrap()
}

async fn mount_get(server: &MockServer, route: &str, status: u16, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/xml")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

async fn mount_head(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn new_log() -> (TempDir, ResultLog) {
    let temp_dir = TempDir::new().unwrap();
    let log = ResultLog::create(&temp_dir.path().join("results.csv")).unwrap();
    (temp_dir, log)
}

fn read_rows(log: &ResultLog) -> Vec<ValidationRow> {
    parse_rows(&std::fs::read(log.path()).unwrap()).unwrap()
}

fn row_for<'a>(rows: &'a [ValidationRow], url: &str) -> &'a ValidationRow {
    rows.iter()
        .find(|r| r.url == url)
        .unwrap_or_else(|| panic!("no row for {}", url))
}

// ============================================================================
// Sitemap Index Tests
// ============================================================================

#[tokio::test]
async fn test_index_with_three_children() {
    let server = MockServer::start().await;
    let base = server.uri();

    let children: Vec<String> = (1..=3).map(|i| format!("{}/s{}.xml", base, i)).collect();
    mount_get(&server, "/index.xml", 200, index_xml(&children)).await;

    let leaves = [
        ["/ok", "/created"],
        ["/missing", "/ok2"],
        ["/broken", "/accepted"],
    ];
    for (i, pair) in leaves.iter().enumerate() {
        let locations: Vec<String> = pair.iter().map(|p| format!("{}{}", base, p)).collect();
        mount_get(&server, &format!("/s{}.xml", i + 1), 200, urlset_xml(&locations)).await;
    }
    mount_head(&server, "/ok", 200).await;
    mount_head(&server, "/created", 201).await;
    mount_head(&server, "/missing", 404).await;
    mount_head(&server, "/ok2", 200).await;
    mount_head(&server, "/broken", 500).await;
    mount_head(&server, "/accepted", 202).await;

    let (_temp_dir, log) = new_log();
    let validator = Validator::new().unwrap();
    validator
        .validate(&format!("{}/index.xml", base), &log)
        .await
        .unwrap();

    let rows = read_rows(&log);
    assert_eq!(rows.len(), 10);
    assert_eq!(log.summary().rows, 10);

    assert_eq!(rows[0], ValidationRow::ok(format!("{}/index.xml", base), 200));
    for child in &children {
        assert_eq!(row_for(&rows, child).outcome, Outcome::Ok);
    }

    for pair in &leaves {
        for leaf in pair {
            let row = row_for(&rows, &format!("{}{}", base, leaf));
            assert_eq!(row.is_ok(), (200..300).contains(&row.status_code), "{:?}", row);
        }
    }

    let missing = row_for(&rows, &format!("{}/missing", base));
    assert_eq!(missing.outcome, Outcome::Error);
    assert_eq!(missing.status_code, 404);
    assert_eq!(missing.error, "status code 404");
}

#[tokio::test]
async fn test_child_failures_are_rows() {
    let server = MockServer::start().await;
    let base = server.uri();

    let children = vec![
        format!("{}/down.xml", base),
        format!("{}/garbage.xml", base),
        format!("{}/nested.xml", base),
    ];
    mount_get(&server, "/index.xml", 200, index_xml(&children)).await;
    mount_get(&server, "/down.xml", 503, Vec::new()).await;
    mount_get(&server, "/garbage.xml", 200, b"<html><body>nope</body></html>".to_vec()).await;
    mount_get(&server, "/nested.xml", 200, index_xml(&[format!("{}/deeper.xml", base)])).await;

    let (_temp_dir, log) = new_log();
    Validator::new()
        .unwrap()
        .validate(&format!("{}/index.xml", base), &log)
        .await
        .unwrap();

    let rows = read_rows(&log);
    assert_eq!(rows.len(), 4);

    let down = row_for(&rows, &children[0]);
    assert_eq!((down.outcome, down.status_code), (Outcome::Error, 503));

    let garbage = row_for(&rows, &children[1]);
    assert_eq!((garbage.outcome, garbage.status_code), (Outcome::Error, 0));
    assert!(garbage.error.starts_with("Invalid XML"));

    let nested = row_for(&rows, &children[2]);
    assert_eq!(nested.outcome, Outcome::Error);
    assert!(!rows.iter().any(|r| r.url.ends_with("/deeper.xml")));
}

// ============================================================================
// Root Document Tests
// ============================================================================

#[tokio::test]
async fn test_urlset_root() {
    let server = MockServer::start().await;
    let base = server.uri();

    let locations: Vec<String> = ["/a", "/b", "/c"].iter().map(|p| format!("{}{}", base, p)).collect();
    mount_get(&server, "/sitemap.xml", 200, urlset_xml(&locations)).await;
    for p in ["/a", "/b", "/c"] {
        mount_head(&server, p, 200).await;
    }

    let (_temp_dir, log) = new_log();
    Validator::new()
        .unwrap()
        .validate(&format!("{}/sitemap.xml", base), &log)
        .await
        .unwrap();

    let rows = read_rows(&log);
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_invalid_root_format() {
    let server = MockServer::start().await;
    mount_get(&server, "/page", 200, b"<html><body>hi</body></html>".to_vec()).await;
    mount_get(
        &server,
        "/empty.xml",
        200,
        br#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"></sitemapindex>"#.to_vec(),
    )
    .await;

    for route in ["/page", "/empty.xml"] {
        let (_temp_dir, log) = new_log();
        let url = format!("{}{}", server.uri(), route);
        Validator::new().unwrap().validate(&url, &log).await.unwrap();

        let rows = read_rows(&log);
        assert_eq!(rows, vec![ValidationRow::error(url, 0, INVALID_FORMAT)]);
    }
}

#[tokio::test]
async fn test_root_fetch_failures() {
    let server = MockServer::start().await;
    let (_temp_dir, log) = new_log();

    // Nothing mounted: wiremock answers 404
    let url = format!("{}/sitemap.xml", server.uri());
    Validator::new().unwrap().validate(&url, &log).await.unwrap();
    let rows = read_rows(&log);
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].outcome, rows[0].status_code), (Outcome::Error, 404));

    let (_temp_dir2, log) = new_log();
    Validator::new()
        .unwrap()
        .validate("http://127.0.0.1:1/sitemap.xml", &log)
        .await
        .unwrap();
    let rows = read_rows(&log);
    assert_eq!(rows.len(), 1);
    assert_eq!((rows[0].outcome, rows[0].status_code), (Outcome::Error, 0));
    assert!(!rows[0].error.is_empty());
}

#[tokio::test]
async fn test_unreachable_leaf_has_status_zero() {
    let server = MockServer::start().await;
    let dead = "http://127.0.0.1:1/gone".to_string();
    mount_get(&server, "/sitemap.xml", 200, urlset_xml(std::slice::from_ref(&dead))).await;

    let (_temp_dir, log) = new_log();
    Validator::new()
        .unwrap()
        .validate(&format!("{}/sitemap.xml", server.uri()), &log)
        .await
        .unwrap();

    let rows = read_rows(&log);
    let row = row_for(&rows, &dead);
    assert_eq!((row.outcome, row.status_code), (Outcome::Error, 0));
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_gates_bound_concurrency() {
    let server = MockServer::start().await;
    let base = server.uri();

    let children: Vec<String> = (0..8).map(|i| format!("{}/child{}.xml", base, i)).collect();
    mount_get(&server, "/index.xml", 200, index_xml(&children)).await;

    for i in 0..8 {
        let locations: Vec<String> = (0..5).map(|j| format!("{}/page/{}/{}", base, i, j)).collect();
        Mock::given(method("GET"))
            .and(path(format!("/child{}.xml", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(urlset_xml(&locations))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let validator = Validator::new().unwrap();
    let gates = Gates::from_config(validator.config());
    let (_temp_dir, log) = new_log();
    validator
        .validate_with_gates(&format!("{}/index.xml", base), &log, &gates)
        .await
        .unwrap();

    assert_eq!(read_rows(&log).len(), 1 + 8 + 40);
    assert!(gates.sitemaps.peak() <= 5, "sitemap peak {}", gates.sitemaps.peak());
    assert!(gates.urls.peak() <= 10, "url peak {}", gates.urls.peak());
    assert!(gates.urls.peak() > 1);
    assert_eq!(gates.sitemaps.in_flight(), 0);
    assert_eq!(gates.urls.in_flight(), 0);
}

#[tokio::test]
async fn test_custom_limits_are_honored() {
    let server = MockServer::start().await;
    let base = server.uri();

    let locations: Vec<String> = (0..12).map(|j| format!("{}/p/{}", base, j)).collect();
    mount_get(&server, "/sitemap.xml", 200, urlset_xml(&locations)).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let validator = Validator::from_config(ValidatorConfig {
        url_concurrency: 2,
        ..Default::default()
    })
    .unwrap();
    let gates = Gates::from_config(validator.config());
    let (_temp_dir, log) = new_log();
    validator
        .validate_with_gates(&format!("{}/sitemap.xml", base), &log, &gates)
        .await
        .unwrap();

    assert_eq!(read_rows(&log).len(), 13);
    assert!(gates.urls.peak() <= 2);
}

// ============================================================================
// Job Tests
// ============================================================================

#[tokio::test]
async fn test_started_job_completes() {
    let server = MockServer::start().await;
    let base = server.uri();
    let locations = vec![format!("{}/a", base)];
    mount_get(&server, "/sitemap.xml", 200, urlset_xml(&locations)).await;
    mount_head(&server, "/a", 200).await;

    let temp_dir = TempDir::new().unwrap();
    let service = ValidationService::new(Validator::new().unwrap(), JobStore::new(temp_dir.path()));

    let started = service
        .start(&format!("{}/sitemap.xml", base))
        .await
        .unwrap();
    let results = service.jobs().read_results(&started.job_id).await.unwrap();
    assert!(results.starts_with(b"URL,Status,StatusCode,Error\n"));

    let mut state = service.jobs().status(&started.job_id).await.unwrap();
    for _ in 0..100 {
        if state.status.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        state = service.jobs().status(&started.job_id).await.unwrap();
    }

    assert_eq!(state.status, JobStatus::Succeeded);
    assert_eq!(state.summary.rows, 2);

    let rows = parse_rows(&service.jobs().read_results(&started.job_id).await.unwrap()).unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_validate_runs_to_completion() {
    let server = MockServer::start().await;
    mount_get(&server, "/sitemap.xml", 200, b"not a sitemap".to_vec()).await;

    let temp_dir = TempDir::new().unwrap();
    let service = ValidationService::new(Validator::new().unwrap(), JobStore::new(temp_dir.path()));

    let state = service
        .validate(&format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();

    // An unusable document is a finding, not a failed job
    assert_eq!(state.status, JobStatus::Succeeded);
    assert_eq!(state.summary.errors, 1);
    assert_eq!(service.jobs().status(&state.job_id).await.unwrap(), state);
}
