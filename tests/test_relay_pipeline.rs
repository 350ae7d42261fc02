//! End-to-end relay runs against mock fetcher and transport
//!
//! Tests focus on BEHAVIOR: what reaches the broker, in what order, and the
//! exit status a run maps to.


use sensor2mqtt::config::ConfigError;
use sensor2mqtt::error::RelayError;
use sensor2mqtt::feed::ParseError;
use sensor2mqtt::publish::SessionState;
use sensor2mqtt::relay::Relay;
use sensor2mqtt::testing::{MockFetcher, MockTransport};
use sensor2mqtt::transport::mqtt::{ConnectFailureKind, MqttError};
use test_helpers::{feed_body, test_config, TlsFixture};

#[tokio::test]
async fn test_known_and_unknown_station_scenario() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3"), ("999", "1.0")], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher.clone(), transport.clone()).unwrap();
    let report = relay.run().await.unwrap();

    let published = transport.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, "/api/temperature/S50");
    assert_eq!(published[0].payload_str(), "27.3");
    assert_eq!(published[1].topic, "/api/status");
    assert_eq!(published[1].payload_str(), "healthy");
    assert!(published.iter().all(|message| message.retain));

    assert_eq!(report.readings, 2);
    assert_eq!(report.summary.published, 2);
    assert_eq!(report.summary.dropped, 1);
    assert_eq!(report.status.as_str(), "healthy");

    assert_eq!(
        fetcher.requests(),
        vec!["https://api.data.gov.sg/v1/environment/air-temperature"]
    );
    assert_eq!(transport.disconnect_calls(), 1);
    assert_eq!(relay.session().state(), SessionState::Closed);
}

#[tokio::test]
async fn test_configured_stations_route_to_their_topics() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(
        &[
            ("S50", "29.8"),
            ("S107", "30.1"),
            ("S24", "31"),
            ("S60", "29.4"),
        ],
        "healthy",
    ));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    relay.run().await.unwrap();

    let published: Vec<(String, String)> = transport
        .published()
        .iter()
        .map(|message| (message.topic.clone(), message.payload_str()))
        .collect();
    assert_eq!(
        published,
        vec![
            ("/api/temperature/S50".to_string(), "29.8".to_string()),
            ("/api/temperature/S107".to_string(), "30.1".to_string()),
            ("/api/temperature/S60".to_string(), "29.4".to_string()),
            ("/api/status".to_string(), "healthy".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_status_is_published_last() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(
        &[("50", "28"), ("60", "27.5"), ("107", "26.25")],
        "healthy",
    ));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    relay.run().await.unwrap();

    let topics = transport.published_topics();
    assert_eq!(topics.len(), 4);
    assert_eq!(topics.last().map(String::as_str), Some("/api/status"));
    assert_eq!(transport.published()[0].payload_str(), "28");
}

#[tokio::test]
async fn test_missing_key_store_fails_before_any_network_io() {
    let tls = TlsFixture::new();
    let mut config = test_config(&tls);
    config.mqtt.key_store = tls.dir.path().join("absent.key");

    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3")], "healthy"));

    let mut relay = Relay::new(config, fetcher.clone(), transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Config(ConfigError::MissingKeyStore(_))
    ));
    assert_eq!(error.exit_code(), 1);
    assert!(fetcher.requests().is_empty());
    assert_eq!(transport.connect_calls(), 0);
    assert_eq!(relay.session().state(), SessionState::Failed);
}

#[tokio::test]
async fn test_missing_trust_store_fails_before_any_network_io() {
    let tls = TlsFixture::new();
    let mut config = test_config(&tls);
    config.mqtt.trust_store = tls.dir.path().join("absent.crt");

    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3")], "healthy"));

    let mut relay = Relay::new(config, fetcher.clone(), transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Config(ConfigError::MissingTrustStore(_))
    ));
    assert!(fetcher.requests().is_empty());
    assert_eq!(transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_non_numeric_value_publishes_nothing() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3"), ("60", "\"abc\"")], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Parse(ParseError::MalformedNumber { field: "value", .. })
    ));
    assert_eq!(error.exit_code(), 2);
    assert_eq!(transport.connect_calls(), 0);
    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn test_unexpected_list_content_publishes_nothing() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(
        r#"{"readings":[{"station_id":"S50","value":27.3} null],"api_info":{"status":"healthy"}}"#,
    );

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Parse(ParseError::UnexpectedContent { .. })
    ));
    assert_eq!(error.exit_code(), 2);
    assert_eq!(transport.connect_calls(), 0);
    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_exits_minus_one() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();

    let mut relay =
        Relay::new(test_config(&tls), MockFetcher::with_status(503), transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(error, RelayError::Transport(_)));
    assert_eq!(error.exit_code(), -1);
    assert_eq!(transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_connect_failure_is_not_retried() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    transport.fail_connect(ConnectFailureKind::Timeout);
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3")], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Connection(MqttError::ConnectionTimedOut(_))
    ));
    match &error {
        RelayError::Connection(mqtt) => assert_eq!(
            mqtt.connect_failure_kind(),
            Some(ConnectFailureKind::Timeout)
        ),
        other => panic!("expected a connection error, got {other:?}"),
    }
    assert_eq!(error.exit_code(), 1);
    assert_eq!(transport.connect_calls(), 1);
    assert!(transport.published().is_empty());
    assert_eq!(transport.disconnect_calls(), 0);
}

#[tokio::test]
async fn test_publish_failure_still_attempts_rest_and_disconnects() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    transport.fail_publish_to("/api/temperature/S50");
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3"), ("60", "26.9")], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    let error = relay.run().await.unwrap_err();

    assert!(matches!(
        error,
        RelayError::Publish {
            failed: 1,
            attempted: 3
        }
    ));
    assert_eq!(error.exit_code(), 1);
    assert_eq!(
        transport.published_topics(),
        vec!["/api/temperature/S60", "/api/status"]
    );
    assert_eq!(transport.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_empty_readings_publishes_status_only() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    let report = relay.run().await.unwrap();

    assert_eq!(report.readings, 0);
    assert_eq!(transport.published_topics(), vec!["/api/status"]);
}

#[tokio::test]
async fn test_transport_receives_last_will_and_client_identity() {
    let tls = TlsFixture::new();
    let transport = MockTransport::new();
    let fetcher = MockFetcher::with_body(feed_body(&[("50", "27.3")], "healthy"));

    let mut relay = Relay::new(test_config(&tls), fetcher, transport.clone()).unwrap();
    relay.run().await.unwrap();

    let params = transport.configured_params().unwrap();
    assert_eq!(params.client_id, "mqtt_id");
    assert_eq!(params.broker.port, 8885);
    assert_eq!(params.last_will.topic, "events/disconnect");
    assert_eq!(params.last_will.payload, "temperature sensor disconnected.");
    assert!(params.last_will.retain);
}
