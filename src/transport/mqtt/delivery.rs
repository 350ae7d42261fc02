//! Pairing of publish requests with their broker acknowledgements
//!
//! rumqttc assigns packet ids inside the event loop and reports them as
//! outgoing `Publish` events in request order. The tracker queues each request
//! until its packet id is known, then holds it until the PubAck or PubComp
//! resolves it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Outcome of one publish as reported by the broker
pub type DeliveryResult = Result<(), String>;

struct PendingDelivery {
    seq: u64,
    topic: String,
    done: oneshot::Sender<DeliveryResult>,
}

#[derive(Default)]
struct TrackerState {
    next_seq: u64,
    queued: VecDeque<PendingDelivery>,
    in_flight: HashMap<u16, PendingDelivery>,
}

/// Publishes awaiting a packet id or an acknowledgement
#[derive(Default)]
pub struct DeliveryTracker {
    state: Mutex<TrackerState>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a publish before its request is handed to the event loop
    pub fn enqueue(&self, topic: &str) -> (u64, oneshot::Receiver<DeliveryResult>) {
        let (done, acknowledged) = oneshot::channel();
        let mut state = self.state();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queued.push_back(PendingDelivery {
            seq,
            topic: topic.to_string(),
            done,
        });
        (seq, acknowledged)
    }

    /// Forget a publish whose request never reached the event loop
    pub fn cancel(&self, seq: u64) {
        self.state().queued.retain(|pending| pending.seq != seq);
    }

    /// The oldest queued publish went out with `packet_id`
    ///
    /// QoS 0 publishes carry packet id 0 and complete on send.
    pub fn sent(&self, packet_id: u16) {
        let mut state = self.state();
        let Some(pending) = state.queued.pop_front() else {
            return;
        };
        if packet_id == 0 {
            let _ = pending.done.send(Ok(()));
        } else {
            state.in_flight.insert(packet_id, pending);
        }
    }

    /// Resolve the publish with `packet_id`; returns its topic when known
    pub fn acknowledged(&self, packet_id: u16, result: DeliveryResult) -> Option<String> {
        let pending = self.state().in_flight.remove(&packet_id)?;
        let _ = pending.done.send(result);
        Some(pending.topic)
    }

    /// Drop every pending publish; their waiters see the connection as closed
    pub fn clear(&self) {
        let mut state = self.state();
        state.queued.clear();
        state.in_flight.clear();
    }

    /// Number of publishes not yet resolved
    pub fn outstanding(&self) -> usize {
        let state = self.state();
        state.queued.len() + state.in_flight.len()
    }
}
