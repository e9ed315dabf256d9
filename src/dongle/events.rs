//! Event fan-out for connection state and raw traffic.
//!
//! Every subscriber owns an unbounded receiver and sees every event published
//! after it subscribed, in publish order. Publishing never waits on a
//! subscriber; a slow consumer only grows its own queue.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::state::ConnectionState;
use crate::logutil::byte_repr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    ConnectionStateChanged(ConnectionState),
    OutgoingBytes(Vec<u8>),
    IncomingBytes(Vec<u8>),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ConnectionStateChanged(s) => write!(f, "state -> {}", s),
            Event::OutgoingBytes(b) => write!(f, ">> {}", byte_repr(b)),
            Event::IncomingBytes(b) => write!(f, "<< {}", byte_repr(b)),
        }
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        EventStream { rx }
    }

    /// Deliver `event` to every live subscriber, pruning closed ones.
    pub fn publish(&self, event: Event) {
        log::trace!("event: {}", event);
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Event>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Wait for the next event. `None` once the link is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = self.try_recv() {
            out.push(ev);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Event::ConnectionStateChanged(ConnectionState::Idle));
        bus.publish(Event::OutgoingBytes(vec![1, 2]));
        let expected = vec![
            Event::ConnectionStateChanged(ConnectionState::Idle),
            Event::OutgoingBytes(vec![1, 2]),
        ];
        assert_eq!(a.drain(), expected);
        assert_eq!(b.drain(), expected);
    }

    #[test]
    fn late_subscriber_only_sees_later_events() {
        let bus = EventBus::new();
        bus.publish(Event::IncomingBytes(vec![9]));
        let mut late = bus.subscribe();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(Event::IncomingBytes(vec![]));
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
    }

    #[test]
    fn json_shape() {
        let json = serde_json::to_string(&Event::ConnectionStateChanged(ConnectionState::Writing))
            .unwrap();
        assert_eq!(json, r#"{"type":"connection_state_changed","data":"writing"}"#);
    }
}
