//! Pure event routing for the MQTT event loop
//!
//! This module contains pure functions that turn rumqttc events and errors
//! into routing decisions, plus the report-only delivery observer.

use super::connection::{ConnectFailure, ConnectFailureKind};
use rumqttc::v5::mqttbytes::v5::{
    ConnectReturnCode, Packet, PubAckReason, PubCompReason, PubRecReason,
};
use rumqttc::v5::{ConnectionError, Event};
use rumqttc::Outgoing;
use tracing::{debug, info, warn};

/// Pure routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if connack.code == ConnectReturnCode::Success {
                        EventRoute::ConnectionAcknowledged
                    } else {
                        EventRoute::ConnectionRejected(format!("{:?}", connack.code))
                    }
                }
                Packet::PubAck(puback) => match &puback.reason {
                    PubAckReason::Success | PubAckReason::NoMatchingSubscribers => {
                        EventRoute::DeliveryComplete {
                            packet_id: puback.pkid,
                        }
                    }
                    reason => EventRoute::DeliveryFailed {
                        packet_id: puback.pkid,
                        reason: format!("{reason:?}"),
                    },
                },
                Packet::PubRec(pubrec) => match &pubrec.reason {
                    PubRecReason::Success | PubRecReason::NoMatchingSubscribers => {
                        EventRoute::InfrastructureEvent(format!("{pubrec:?}"))
                    }
                    reason => EventRoute::DeliveryFailed {
                        packet_id: pubrec.pkid,
                        reason: format!("{reason:?}"),
                    },
                },
                Packet::PubComp(pubcomp) => match &pubcomp.reason {
                    PubCompReason::Success => EventRoute::DeliveryComplete {
                        packet_id: pubcomp.pkid,
                    },
                    reason => EventRoute::DeliveryFailed {
                        packet_id: pubcomp.pkid,
                        reason: format!("{reason:?}"),
                    },
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::DisconnectedByBroker(format!("{:?}", disconnect.reason_code))
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(packet_id)) => EventRoute::PublishSent {
                packet_id: *packet_id,
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Classify an event loop error into a connect failure (pure function)
    pub fn classify_connection_error(error: &ConnectionError) -> ConnectFailure {
        let kind = match error {
            ConnectionError::ConnectionRefused(_) => ConnectFailureKind::AuthFailure,
            ConnectionError::Tls(_) => ConnectFailureKind::Tls,
            _ => ConnectFailureKind::Network,
        };
        ConnectFailure::new(kind, error.to_string())
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck with a success code
    ConnectionAcknowledged,
    /// ConnAck with a failure code
    ConnectionRejected(String),
    /// A PUBLISH was written to the wire; packet id 0 for QoS 0
    PublishSent { packet_id: u16 },
    /// PubAck (QoS 1) or PubComp (QoS 2) for one of our publishes
    DeliveryComplete { packet_id: u16 },
    /// PubAck, PubRec or PubComp carrying a failure reason code
    DeliveryFailed { packet_id: u16, reason: String },
    /// Broker sent DISCONNECT
    DisconnectedByBroker(String),
    /// Our DISCONNECT was written to the wire
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Side-channel notifications from the transport
///
/// Implementations only report. They are invoked from the event loop task and
/// have no way to alter the publish sequence.
pub trait DeliveryObserver: Send + Sync {
    /// The broker acknowledged the publish with this packet id
    fn delivery_complete(&self, packet_id: u16);

    /// The broker answered the publish with a failure reason code
    fn delivery_failed(&self, packet_id: u16, reason: &str);

    /// The connection dropped outside of a requested disconnect
    fn connection_lost(&self, cause: &str);
}

/// Observer that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl DeliveryObserver for LoggingObserver {
    fn delivery_complete(&self, packet_id: u16) {
        debug!(target: "mqtt_transport", packet_id, "Delivery complete");
    }

    fn delivery_failed(&self, packet_id: u16, reason: &str) {
        warn!(target: "mqtt_transport", packet_id, reason = %reason, "Broker rejected publish");
    }

    fn connection_lost(&self, cause: &str) {
        if cause.is_empty() {
            warn!(target: "mqtt_transport", "Connection lost");
        } else {
            warn!(target: "mqtt_transport", cause = %cause, "Connection lost");
        }
    }
}

/// Log a connection state transition
pub(crate) fn log_transition(from: &str, to: &str) {
    info!(target: "mqtt_transport", from, to, "MQTT connection state changed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, Disconnect, DisconnectReasonCode, PubAck, PubComp, PubRec,
    };

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            EventRoute::ConnectionAcknowledged
        );

        let rejected = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&rejected),
            EventRoute::ConnectionRejected(code) if code.contains("NotAuthorized")
        ));
    }

    #[test]
    fn test_route_puback() {
        let puback = Event::Incoming(Packet::PubAck(PubAck {
            pkid: 7,
            reason: PubAckReason::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&puback),
            EventRoute::DeliveryComplete { packet_id: 7 }
        );
    }

    #[test]
    fn test_route_puback_with_failure_reason() {
        let rejected = Event::Incoming(Packet::PubAck(PubAck {
            pkid: 9,
            reason: PubAckReason::NotAuthorized,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&rejected),
            EventRoute::DeliveryFailed {
                packet_id: 9,
                reason: "NotAuthorized".to_string()
            }
        );

        let unrouted = Event::Incoming(Packet::PubAck(PubAck {
            pkid: 10,
            reason: PubAckReason::NoMatchingSubscribers,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&unrouted),
            EventRoute::DeliveryComplete { packet_id: 10 }
        );
    }

    #[test]
    fn test_route_qos2_handshake() {
        let received = Event::Incoming(Packet::PubRec(PubRec {
            pkid: 4,
            reason: PubRecReason::Success,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&received),
            EventRoute::InfrastructureEvent(_)
        ));

        let refused = Event::Incoming(Packet::PubRec(PubRec {
            pkid: 4,
            reason: PubRecReason::QuotaExceeded,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&refused),
            EventRoute::DeliveryFailed { packet_id: 4, .. }
        ));

        let complete = Event::Incoming(Packet::PubComp(PubComp {
            pkid: 4,
            reason: PubCompReason::Success,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&complete),
            EventRoute::DeliveryComplete { packet_id: 4 }
        );
    }

    #[test]
    fn test_route_outgoing_publish() {
        let sent = Event::Outgoing(Outgoing::Publish(12));
        assert_eq!(
            MessageHandler::route_mqtt_event(&sent),
            EventRoute::PublishSent { packet_id: 12 }
        );
    }

    #[test]
    fn test_route_disconnects() {
        let broker = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(&broker),
            EventRoute::DisconnectedByBroker(_)
        ));

        let ours = Event::Outgoing(Outgoing::Disconnect);
        assert_eq!(
            MessageHandler::route_mqtt_event(&ours),
            EventRoute::DisconnectSent
        );

        let ping = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(
            MessageHandler::route_mqtt_event(&ping),
            EventRoute::OutgoingEvent
        );
    }

    #[test]
    fn test_classify_connection_errors() {
        let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        assert_eq!(
            MessageHandler::classify_connection_error(&refused).kind,
            ConnectFailureKind::AuthFailure
        );

        let io = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let failure = MessageHandler::classify_connection_error(&io);
        assert_eq!(failure.kind, ConnectFailureKind::Network);
        assert!(failure.reason.contains("connection refused"));
    }

    #[test]
    fn test_logging_observer_is_report_only() {
        let observer = LoggingObserver;
        observer.delivery_complete(1);
        observer.delivery_failed(2, "NotAuthorized");
        observer.connection_lost("");
        observer.connection_lost("broker went away");
    }
}
