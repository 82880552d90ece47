use std::time::Duration;

use chrono::{TimeZone, Utc};
use datawars::{DatawarsClient, DatawarsConfig, FetchWindow, HistorySource, SourceError};
use model::ItemId;
use nonzero_ext::nonzero;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DatawarsClient {
    let config = DatawarsConfig {
        requests_per_second: nonzero!(1000u32),
        request_timeout: Duration::from_millis(500),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(10),
        ..DatawarsConfig::default()
    }
    .with_base_url(server.uri());
    DatawarsClient::new(config).expect("client")
}

#[tokio::test]
async fn fetches_history_for_several_items() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/json"))
        .and(query_param("itemID", "19721,24"))
        .and(query_param("start", "2024-05-02T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"itemID": 19721, "date": "2024-05-02T00:00:00.000Z", "sell_price_min": 3100},
            {"itemID": 24, "date": "2024-05-02T00:00:00.000Z", "buy_sold": 12},
            {"itemID": 19721, "date": "2024-05-03T00:00:00.000Z", "sell_price_min": 3150}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let start = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    let points = client
        .fetch_history(&[ItemId(19721), ItemId(24)], FetchWindow::starting(start))
        .await
        .expect("history");

    assert_eq!(points.len(), 3);
    assert_eq!(points[0].item, ItemId(19721));
    assert_eq!(points[0].sell_price_min, 3100);
    assert_eq!(points[1].item, ItemId(24));
    assert_eq!(points[1].buy_sold, 12);
    assert_eq!(points[2].timestamp, Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn hourly_history_hits_hourly_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/hourly/json"))
        .and(query_param("itemID", "24"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"itemID": 24, "date": "2024-05-02T13:00:00.000Z"}
        ])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let points = client
        .fetch_hourly_history(&[ItemId(24)], FetchWindow::full())
        .await
        .expect("hourly");
    assert_eq!(points.len(), 1);
}

#[tokio::test]
async fn fetches_item_catalog() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 19721, "name": "Glob of Ectoplasm"},
            {"id": 24, "name": "Sealed Package of Snowballs"}
        ])))
        .mount(&server)
        .await;

    let items = client_for(&server).fetch_items().await.expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Glob of Ectoplasm");
}

#[tokio::test]
async fn server_errors_are_retried_until_attempts_run_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_history(&[ItemId(24)], FetchWindow::full())
        .await
        .expect_err("should fail");
    assert!(matches!(err, SourceError::Status { status: 503, .. }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such item"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_history(&[ItemId(24)], FetchWindow::full())
        .await
        .expect_err("should fail");
    match err {
        SourceError::Status { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such item");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_responses_surface_as_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut config = DatawarsConfig {
        requests_per_second: nonzero!(1000u32),
        request_timeout: Duration::from_millis(100),
        max_attempts: 1,
        ..DatawarsConfig::default()
    };
    config = config.with_base_url(server.uri());
    let client = DatawarsClient::new(config).expect("client");

    let err = client
        .fetch_history(&[ItemId(24)], FetchWindow::full())
        .await
        .expect_err("should time out");
    assert!(matches!(err, SourceError::Timeout { .. }));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/history/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .fetch_history(&[ItemId(24)], FetchWindow::full())
        .await
        .expect_err("should fail");
    assert!(matches!(err, SourceError::Decode { .. }));
}
