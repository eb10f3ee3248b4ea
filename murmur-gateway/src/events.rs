//! Wire shapes shared by the event log and the WebSocket protocol.

use serde::{Deserialize, Serialize};

use crate::registry::ConnectionId;

/// A present player. Players are identified by the id of the connection
/// that joined them, on whichever instance accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: ConnectionId,
}

/// A presence change, as appended to and read from the event log and as
/// forwarded to clients in diff payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "player joined")]
    PlayerJoined { player: Player },
    #[serde(rename = "player left")]
    PlayerLeft { player: Player },
}

impl Event {
    pub fn joined(id: ConnectionId) -> Self {
        Event::PlayerJoined {
            player: Player { id },
        }
    }

    pub fn left(id: ConnectionId) -> Self {
        Event::PlayerLeft {
            player: Player { id },
        }
    }

    pub fn player_id(&self) -> &ConnectionId {
        match self {
            Event::PlayerJoined { player } | Event::PlayerLeft { player } => &player.id,
        }
    }
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Reply fanned out to every local connection after a log liveness check.
#[derive(Debug, Clone, Serialize)]
pub struct PongFrame<'a> {
    pub event: &'static str,
    pub reply: &'a str,
}

impl<'a> PongFrame<'a> {
    pub fn new(reply: &'a str) -> Self {
        Self {
            event: "pong",
            reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let joined = Event::joined(ConnectionId::from("p1"));
        assert_eq!(
            serde_json::to_value(&joined).unwrap(),
            json!({ "event": "player joined", "player": { "id": "p1" } })
        );

        let left = Event::left(ConnectionId::from("p1"));
        assert_eq!(
            serde_json::to_string(&left).unwrap(),
            r#"{"event":"player left","player":{"id":"p1"}}"#
        );
    }

    #[test]
    fn test_event_decodes_from_log_text() {
        let event: Event =
            serde_json::from_str(r#"{"event":"player left","player":{"id":"abc"}}"#).unwrap();
        assert_eq!(event, Event::left(ConnectionId::from("abc")));
        assert_eq!(event.player_id().as_str(), "abc");
    }

    #[test]
    fn test_unknown_event_kind_is_rejected() {
        let result: Result<Event, _> =
            serde_json::from_str(r#"{"event":"player teleported","player":{"id":"abc"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_client_ping() {
        let message: ClientMessage = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(message, ClientMessage::Ping);
    }

    #[test]
    fn test_pong_frame() {
        assert_eq!(
            serde_json::to_string(&PongFrame::new("PONG")).unwrap(),
            r#"{"event":"pong","reply":"PONG"}"#
        );
    }
}
