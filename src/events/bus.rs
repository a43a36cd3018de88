//! In-process multi-room pub/sub

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::messages::EventMessage;

/// Per-room broadcast capacity; lagging receivers drop and resync
const ROOM_CAPACITY: usize = 256;

/// A pub/sub room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Contest(Uuid),
    Team(Uuid),
    Admins,
}

impl Room {
    /// Stable room key, also used by gateway subscriptions
    pub fn key(&self) -> String {
        match self {
            Self::Contest(id) => format!("contest:{}", id),
            Self::Team(id) => format!("team:{}", id),
            Self::Admins => "admins".to_string(),
        }
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Sink side of the event bus. Everything that publishes state changes
/// depends on this trait; the concrete bus is injected at startup.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Publish to one room. Best-effort: no receivers, no delivery.
    fn emit(&self, room: Room, message: EventMessage);

    /// Publish the same message to several rooms
    fn emit_many(&self, rooms: &[Room], message: EventMessage) {
        for room in rooms {
            self.emit(*room, message.clone());
        }
    }
}

/// In-process bus: one broadcast channel per room, ordering preserved
/// within a room.
pub struct EventBus {
    rooms: RwLock<HashMap<Room, broadcast::Sender<EventMessage>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a room, creating its channel on first use
    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<EventMessage> {
        let mut rooms = self.rooms.write().expect("event bus lock poisoned");
        rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Number of live subscribers in a room
    pub fn subscriber_count(&self, room: Room) -> usize {
        let rooms = self.rooms.read().expect("event bus lock poisoned");
        rooms.get(&room).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn emit(&self, room: Room, message: EventMessage) {
        let rooms = self.rooms.read().expect("event bus lock poisoned");
        if let Some(tx) = rooms.get(&room) {
            // Err means no live receivers; dropped messages are not re-sent
            let _ = tx.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::messages::EventPayload;

    fn queued_message(position: u64) -> EventMessage {
        EventMessage::new(EventPayload::Queued {
            submission_id: Uuid::new_v4(),
            position,
            eta_seconds: 10,
        })
    }

    #[tokio::test]
    async fn test_room_isolation() {
        let bus = EventBus::new();
        let contest = Room::Contest(Uuid::new_v4());
        let team = Room::Team(Uuid::new_v4());

        let mut contest_rx = bus.subscribe(contest);
        let mut team_rx = bus.subscribe(team);

        bus.emit(contest, queued_message(1));

        let got = contest_rx.recv().await.unwrap();
        assert_eq!(got.kind(), "queued");
        assert!(team_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_order_preserved_within_room() {
        let bus = EventBus::new();
        let room = Room::Admins;
        let mut rx = bus.subscribe(room);

        for position in 0..5 {
            bus.emit(room, queued_message(position));
        }

        for expected in 0..5u64 {
            let msg = rx.recv().await.unwrap();
            match msg.payload {
                EventPayload::Queued { position, .. } => assert_eq!(position, expected),
                _ => panic!("unexpected payload"),
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(Room::Admins, queued_message(0));
        assert_eq!(bus.subscriber_count(Room::Admins), 0);
    }

    #[test]
    fn test_room_keys() {
        let id = Uuid::nil();
        assert_eq!(Room::Contest(id).key(), format!("contest:{}", id));
        assert_eq!(Room::Admins.key(), "admins");
    }
}
