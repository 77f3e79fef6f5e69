//! Integration tests for `HttpMediaFetcher::fetch`.
//!
//! Each test stands up a local `wiremock` server, so no real network
//! traffic is made.

use catalog_media::{HttpMediaFetcher, MediaError, MediaFetch};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EIGHT_MB: u64 = 8 * 1024 * 1024;

fn test_fetcher(max_bytes: u64) -> HttpMediaFetcher {
    HttpMediaFetcher::new(5, "catalog-test/0.1", max_bytes).expect("failed to build fetcher")
}

#[tokio::test]
async fn fetch_returns_body_and_extension() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/img/shoe.JPG"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/shoe.JPG"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let media = test_fetcher(EIGHT_MB)
        .fetch(&format!("{}/img/shoe.JPG", server.uri()))
        .await
        .expect("fetch should succeed");

    assert_eq!(media.bytes, b"jpeg-bytes");
    assert_eq!(media.extension, ".jpg");
}

#[tokio::test]
async fn fetch_rejects_when_head_reports_over_limit() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/big.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-length", "9000000"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 9_000_000]))
        .mount(&server)
        .await;

    let result = test_fetcher(EIGHT_MB)
        .fetch(&format!("{}/big.png", server.uri()))
        .await;

    assert!(
        matches!(result, Err(MediaError::TooLarge { limit: EIGHT_MB, .. })),
        "expected TooLarge, got: {result:?}"
    );
}

#[tokio::test]
async fn fetch_caps_body_without_trusted_length() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/sneaky.gif"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sneaky.gif"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1_u8; 64]))
        .mount(&server)
        .await;

    let result = test_fetcher(32)
        .fetch(&format!("{}/sneaky.gif", server.uri()))
        .await;

    assert!(
        matches!(result, Err(MediaError::TooLarge { limit: 32, .. })),
        "expected TooLarge, got: {result:?}"
    );
}

#[tokio::test]
async fn fetch_maps_non_success_get_to_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/gone.png", server.uri());
    let result = test_fetcher(EIGHT_MB).fetch(&url).await;

    match result {
        Err(MediaError::UnexpectedStatus { status, url: got }) => {
            assert_eq!(status, 404);
            assert_eq!(got, url);
        }
        other => panic!("expected UnexpectedStatus, got: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_never_contacts_server_for_bad_extension() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = test_fetcher(EIGHT_MB)
        .fetch(&format!("{}/doc.pdf", server.uri()))
        .await;

    assert!(
        matches!(result, Err(MediaError::UnsupportedExtension { .. })),
        "expected UnsupportedExtension, got: {result:?}"
    );
}
