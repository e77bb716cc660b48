use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// A scheduling event ready for fan-out: the channel it belongs to
/// (`resource_<id>` or `flight_<id>`) and the event as a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// Broadcast hub keyed by resource or flight id. The engine publishes every
/// committed event here; the host API layer subscribes and decides what (if
/// anything) reaches passengers — fan-out policy is not the engine's job.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a resource or flight. Creates the
    /// channel if needed.
    pub fn subscribe(&self, id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&id) {
            let payload = match serde_json::to_string(event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("failed to serialize notification: {e}");
                    return;
                }
            };
            let _ = sender.send(Notification {
                channel: channel_name(id, event),
                payload,
            });
        }
    }

    /// Remove a channel (e.g. when a resource is deleted).
    pub fn remove(&self, id: &Ulid) {
        self.channels.remove(id);
    }
}

fn channel_name(id: Ulid, event: &Event) -> String {
    match event {
        Event::FlightScheduled { .. }
        | Event::FlightRescheduled { .. }
        | Event::FlightStatusChanged { .. }
        | Event::FlightRemoved { .. }
        | Event::SeatReserved { .. }
        | Event::SeatCancelled { .. } => format!("flight_{id}"),
        _ => format!("resource_{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, TimeWindow};

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        let event = Event::ResourceCreated {
            id: rid,
            kind: ResourceKind::Gate,
            name: Some("A1".into()),
        };
        hub.send(rid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, format!("resource_{rid}"));
        let parsed: serde_json::Value = serde_json::from_str(&received.payload).unwrap();
        assert!(parsed.is_object());
    }

    #[tokio::test]
    async fn flight_events_use_flight_channel() {
        let hub = NotifyHub::new();
        let fid = Ulid::new();
        let mut rx = hub.subscribe(fid);

        hub.send(
            fid,
            &Event::ResourceAssigned {
                resource_id: Ulid::new(),
                flight_id: fid,
                window: TimeWindow::new(0, 1000),
            },
        );
        hub.send(fid, &Event::FlightRemoved { id: fid });

        // First event is resource-scoped even when keyed by flight id
        assert_eq!(rx.recv().await.unwrap().channel, format!("resource_{fid}"));
        assert_eq!(rx.recv().await.unwrap().channel, format!("flight_{fid}"));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        // No subscriber — should not panic
        hub.send(rid, &Event::ResourceDeleted { id: rid });
    }
}
