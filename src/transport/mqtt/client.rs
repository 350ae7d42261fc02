//! Impure I/O operations for the MQTT client
//!
//! This module owns the rumqttc client, the spawned event loop task and the
//! watch channel that carries connection state back to the caller. Each
//! publish waits for its own acknowledgement, bounded by the session timeout.

use super::connection::{
    configure_mqtt_options, ConnectFailure, ConnectFailureKind, ConnectParams, ConnectionState,
    MqttError,
};
use super::delivery::DeliveryTracker;
use super::message_handler::{
    log_transition, DeliveryObserver, EventRoute, LoggingObserver, MessageHandler,
};
use crate::transport::Transport;
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, ConnectionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Capacity of the request channel between the client and its event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// MQTT v5 transport over rustls
pub struct MqttClient {
    params: Option<ConnectParams>,
    client: Option<AsyncClient>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    event_loop_handle: Option<JoinHandle<()>>,
    observer: Arc<dyn DeliveryObserver>,
    deliveries: Arc<DeliveryTracker>,
}

impl Default for MqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttClient {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(LoggingObserver))
    }

    /// Create a client that reports deliveries and connection loss to `observer`
    pub fn with_observer(observer: Arc<dyn DeliveryObserver>) -> Self {
        Self {
            params: None,
            client: None,
            state_tx: None,
            state_rx: None,
            event_loop_handle: None,
            observer,
            deliveries: Arc::new(DeliveryTracker::new()),
        }
    }

    /// Get current connection state
    /// Returns None if connect has not been attempted yet
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    fn params(&self) -> Result<&ConnectParams, MqttError> {
        self.params.as_ref().ok_or(MqttError::NotConfigured)
    }

    /// Move to `next`, logging the transition
    fn transition(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
        let previous = state_tx.borrow().name();
        if previous != next.name() {
            log_transition(previous, next.name());
        }
        let _ = state_tx.send(next);
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let confirmation = tokio::time::timeout(timeout, async {
            loop {
                match state_rx.borrow_and_update().clone() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Failed(failure) => return Err(failure.into()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(MqttError::ConnectionFailed(reason));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailed(
                        "Event loop stopped before ConnAck".to_string(),
                    ));
                }
            }
        })
        .await;

        match confirmation {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectTimeout(timeout)),
        }
    }

    /// Apply a routed event to the connection state
    /// Returns true to keep polling, false to stop the event loop
    fn process_event_route(
        route: EventRoute,
        state_tx: &watch::Sender<ConnectionState>,
        observer: &dyn DeliveryObserver,
        deliveries: &DeliveryTracker,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                Self::transition(state_tx, ConnectionState::Connected);
                true
            }
            EventRoute::ConnectionRejected(code) => {
                Self::transition(
                    state_tx,
                    ConnectionState::Failed(ConnectFailure::new(
                        ConnectFailureKind::AuthFailure,
                        code,
                    )),
                );
                false
            }
            EventRoute::PublishSent { packet_id } => {
                deliveries.sent(packet_id);
                true
            }
            EventRoute::DeliveryComplete { packet_id } => {
                deliveries.acknowledged(packet_id, Ok(()));
                observer.delivery_complete(packet_id);
                true
            }
            EventRoute::DeliveryFailed { packet_id, reason } => {
                observer.delivery_failed(packet_id, &reason);
                deliveries.acknowledged(packet_id, Err(reason));
                true
            }
            EventRoute::DisconnectedByBroker(reason) => {
                Self::transition(state_tx, ConnectionState::Disconnected(reason.clone()));
                observer.connection_lost(&reason);
                false
            }
            EventRoute::DisconnectSent => {
                Self::transition(
                    state_tx,
                    ConnectionState::Disconnected("Client disconnected".to_string()),
                );
                false
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Record an event loop error against the current state
    fn handle_event_loop_error(
        error: &ConnectionError,
        state_tx: &watch::Sender<ConnectionState>,
        observer: &dyn DeliveryObserver,
    ) {
        let current = state_tx.borrow().clone();
        match current {
            ConnectionState::Connecting => {
                let failure = MessageHandler::classify_connection_error(error);
                error!(kind = ?failure.kind, "MQTT connection attempt failed: {}", error);
                Self::transition(state_tx, ConnectionState::Failed(failure));
            }
            ConnectionState::Connected => {
                let cause = error.to_string();
                Self::transition(state_tx, ConnectionState::Disconnected(cause.clone()));
                observer.connection_lost(&cause);
            }
            ConnectionState::Disconnected(_) | ConnectionState::Failed(_) => {
                debug!(target: "mqtt_transport", "Event loop error after close: {}", error);
            }
        }
    }

    /// Check connection state before operations
    fn check_connection_state(&self) -> Result<&AsyncClient, MqttError> {
        let state = self.connection_state();
        if let (Some(client), true) = (
            self.client.as_ref(),
            matches!(state, Some(ConnectionState::Connected)),
        ) {
            return Ok(client);
        }
        Err(MqttError::NotConnected { state })
    }

    fn abort_event_loop(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        self.client = None;
    }
}

#[async_trait]
impl Transport for MqttClient {
    fn configure(&mut self, params: ConnectParams) {
        debug!(
            host = %params.broker.host,
            port = params.broker.port,
            client_id = %params.client_id,
            "MQTT transport configured"
        );
        self.params = Some(params);
    }

    async fn connect(&mut self) -> Result<(), MqttError> {
        let params = self.params()?.clone();
        if self.client.is_some() {
            return Err(MqttError::InvalidState {
                operation: "connect",
                state: self
                    .connection_state()
                    .map_or("connecting", |state| state.name())
                    .to_string(),
            });
        }

        info!(
            host = %params.broker.host,
            port = params.broker.port,
            client_id = %params.client_id,
            "Connecting to MQTT broker"
        );

        let options = configure_mqtt_options(&params);
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        self.state_tx = Some(state_tx.clone());
        self.state_rx = Some(state_rx.clone());

        let observer = self.observer.clone();
        let deliveries = self.deliveries.clone();
        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        if !Self::process_event_route(
                            route,
                            &state_tx,
                            observer.as_ref(),
                            deliveries.as_ref(),
                        ) {
                            break;
                        }
                    }
                    Err(e) => {
                        // No reconnection: the run is single-pass.
                        Self::handle_event_loop_error(&e, &state_tx, observer.as_ref());
                        break;
                    }
                }
            }
            deliveries.clear();
            debug!(target: "mqtt_transport", "MQTT event loop stopped");
        });

        self.client = Some(client);
        self.event_loop_handle = Some(handle);

        match Self::wait_for_connection_confirmation(state_rx, params.timeout).await {
            Ok(()) => {
                info!("Connected to MQTT broker");
                Ok(())
            }
            Err(e) => {
                if let (MqttError::ConnectTimeout(_), Some(state_tx)) = (&e, &self.state_tx) {
                    Self::transition(
                        state_tx,
                        ConnectionState::Failed(ConnectFailure::new(
                            ConnectFailureKind::Timeout,
                            e.to_string(),
                        )),
                    );
                }
                self.abort_event_loop();
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        let client = self.check_connection_state()?;
        let timeout = self.params()?.timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = || MqttError::PublishTimeout {
            topic: topic.to_string(),
            timeout,
        };

        let (seq, acknowledged) = self.deliveries.enqueue(topic);
        match tokio::time::timeout_at(deadline, client.publish(topic, qos, retain, payload)).await
        {
            Ok(Ok(())) => debug!(topic = %topic, ?qos, retain, "Publish handed to event loop"),
            Ok(Err(e)) => {
                self.deliveries.cancel(seq);
                return Err(MqttError::PublishFailed {
                    topic: topic.to_string(),
                    source: Box::new(e),
                });
            }
            Err(_) => {
                self.deliveries.cancel(seq);
                return Err(timed_out());
            }
        }

        match tokio::time::timeout_at(deadline, acknowledged).await {
            Ok(Ok(Ok(()))) => {
                debug!(topic = %topic, "Publish acknowledged");
                Ok(())
            }
            Ok(Ok(Err(reason))) => Err(MqttError::PublishFailed {
                topic: topic.to_string(),
                source: format!("broker answered {reason}").into(),
            }),
            Ok(Err(_)) => Err(MqttError::PublishFailed {
                topic: topic.to_string(),
                source: "connection closed before the broker acknowledged".into(),
            }),
            Err(_) => Err(timed_out()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let Some(client) = self.client.take() else {
            debug!("Disconnect requested without an open connection");
            return Ok(());
        };
        let timeout = self.params()?.timeout;

        let unresolved = self.deliveries.outstanding();
        if unresolved > 0 {
            warn!(unresolved, "Disconnecting with unacknowledged publishes");
        }

        let request = tokio::time::timeout(timeout, client.disconnect()).await;
        let result = match request {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MqttError::DisconnectFailed(e.to_string())),
            Err(_) => Err(MqttError::DisconnectFailed(format!(
                "disconnect request not accepted within {timeout:?}"
            ))),
        };

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => debug!("Event loop task shut down gracefully"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => warn!("Event loop task didn't shut down in time, aborting"),
                _ => {}
            }
        }

        if let Some(state_tx) = &self.state_tx {
            if matches!(*state_tx.borrow(), ConnectionState::Connected) {
                Self::transition(
                    state_tx,
                    ConnectionState::Disconnected("Client disconnected".to_string()),
                );
            }
        }

        info!("MQTT client disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Drop cannot await a graceful DISCONNECT; it only stops the task.
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}
