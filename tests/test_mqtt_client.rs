//! MQTT client connect behavior without a broker
//!
//! These tests use local sockets only. A closed port and a listener that
//! never speaks TLS each produce a classified, non-retried connect failure.

use rumqttc::v5::mqttbytes::QoS;
use sensor2mqtt::transport::mqtt::{
    BrokerAddress, ConnectFailureKind, ConnectParams, ConnectionState, LastWillMessage,
    MqttClient, MqttError, TlsMaterials,
};
use sensor2mqtt::transport::Transport;
use std::net::TcpListener;
use std::time::Duration;

fn params_for(port: u16) -> ConnectParams {
    ConnectParams {
        broker: BrokerAddress {
            host: "127.0.0.1".to_string(),
            port,
        },
        client_id: "mqtt_id".to_string(),
        credentials: None,
        last_will: LastWillMessage {
            topic: "events/disconnect".to_string(),
            payload: "temperature sensor disconnected.".to_string(),
            qos: QoS::AtLeastOnce,
            retain: true,
        },
        tls: TlsMaterials {
            ca: b"not a certificate".to_vec(),
            client_cert: b"not a certificate".to_vec(),
            client_key: b"not a key".to_vec(),
        },
        timeout: Duration::from_secs(5),
        keep_alive: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn test_connect_to_closed_port_fails_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = MqttClient::new();
    client.configure(params_for(port));

    let error = client.connect().await.unwrap_err();

    assert!(error.connect_failure_kind().is_some());
    assert!(!matches!(error, MqttError::ConnectTimeout(_)));
    assert!(!client.is_connected());
    assert!(matches!(
        client.connection_state(),
        Some(ConnectionState::Failed(_))
    ));
}

#[tokio::test]
async fn test_unusable_trust_store_is_a_tls_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = MqttClient::new();
    client.configure(params_for(port));

    let error = client.connect().await.unwrap_err();

    assert_eq!(error.connect_failure_kind(), Some(ConnectFailureKind::Tls));
    drop(listener);
}

#[tokio::test]
async fn test_publish_after_failed_connect_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = MqttClient::new();
    client.configure(params_for(port));
    let _ = client.connect().await;

    let result = client
        .publish("/api/status", b"healthy".to_vec(), QoS::AtLeastOnce, true)
        .await;
    assert!(matches!(result, Err(MqttError::NotConnected { .. })));
    assert!(client.disconnect().await.is_ok());
}
