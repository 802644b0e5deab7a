//! Relay protocol messages
//!
//! Every frame is a single JSON object whose `type` field selects the
//! variant. Payloads are kept as raw JSON text and relayed byte for byte.

use party_core::{ErrorCode, RelayError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::invitations::Invitation;

/// Opaque relayed payload, exactly as the sender wrote it
pub type Payload = Box<RawValue>;

/// Frames sent by clients
#[derive(Clone, Debug)]
pub enum ClientMessage {
    /// Create a room and become its host
    Create {
        session_id: Option<String>,
        peer_id: Option<String>,
    },

    /// Join an existing room
    Join {
        session_id: Option<String>,
        peer_id: Option<String>,
    },

    /// Relay a payload to every other member of the room
    Broadcast { payload: Option<Payload> },

    /// Relay a payload to a single member of the room
    SendTo {
        to: Option<String>,
        payload: Option<Payload>,
    },

    /// Application-level keepalive
    Ping,

    /// Bind a user identity to this connection for invitations
    Register { user_uuid: Option<String> },

    /// Page another user into a room
    Invite {
        session_id: Option<String>,
        user_uuid: Option<String>,
        target_user_uuid: Option<String>,
        display_name: Option<String>,
        media_title: Option<String>,
        media_thumb: Option<String>,
    },

    /// Accept a queued invitation
    AcceptInvite {
        session_id: Option<String>,
        user_uuid: Option<String>,
        display_name: Option<String>,
    },

    /// Decline a queued invitation
    DeclineInvite {
        session_id: Option<String>,
        user_uuid: Option<String>,
        display_name: Option<String>,
    },

    /// List invitations queued for the registered identity
    GetInvitations,
}

/// Inbound frame as it appears on the wire.
///
/// Decoded in one pass straight from the socket bytes; an internally tagged
/// enum would buffer the payload and lose its original text.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    session_id: Option<String>,
    peer_id: Option<String>,
    to: Option<String>,
    #[serde(default, deserialize_with = "present_payload")]
    payload: Option<Payload>,
    #[serde(rename = "userUUID")]
    user_uuid: Option<String>,
    #[serde(rename = "targetUserUUID")]
    target_user_uuid: Option<String>,
    display_name: Option<String>,
    media_title: Option<String>,
    media_thumb: Option<String>,
}

/// A present payload is kept even when it is `null`
fn present_payload<'de, D>(deserializer: D) -> Result<Option<Payload>, D::Error>
where
    D: Deserializer<'de>,
{
    Payload::deserialize(deserializer).map(Some)
}

impl ClientMessage {
    /// Parse a frame
    pub fn from_json(frame: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawFrame = serde_json::from_slice(frame)?;

        let msg = match raw.kind.as_str() {
            "create" => Self::Create {
                session_id: raw.session_id,
                peer_id: raw.peer_id,
            },
            "join" => Self::Join {
                session_id: raw.session_id,
                peer_id: raw.peer_id,
            },
            "broadcast" => Self::Broadcast {
                payload: raw.payload,
            },
            "sendTo" => Self::SendTo {
                to: raw.to,
                payload: raw.payload,
            },
            "ping" => Self::Ping,
            "register" => Self::Register {
                user_uuid: raw.user_uuid,
            },
            "invite" => Self::Invite {
                session_id: raw.session_id,
                user_uuid: raw.user_uuid,
                target_user_uuid: raw.target_user_uuid,
                display_name: raw.display_name,
                media_title: raw.media_title,
                media_thumb: raw.media_thumb,
            },
            "acceptInvite" => Self::AcceptInvite {
                session_id: raw.session_id,
                user_uuid: raw.user_uuid,
                display_name: raw.display_name,
            },
            "declineInvite" => Self::DeclineInvite {
                session_id: raw.session_id,
                user_uuid: raw.user_uuid,
                display_name: raw.display_name,
            },
            "getInvitations" => Self::GetInvitations,
            other => {
                return Err(serde_json::Error::custom(format!(
                    "unknown message type `{}`",
                    other
                )))
            }
        };
        Ok(msg)
    }
}

/// Frames sent by the server
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Room created, sender is host
    Created { session_id: String },

    /// Room joined; `peers` lists the members already present
    Joined {
        session_id: String,
        peers: Vec<String>,
    },

    /// Another peer joined the room
    PeerJoined { peer_id: String },

    /// Another peer left the room
    PeerLeft { peer_id: String },

    /// Relayed payload
    Message {
        from: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
    },

    /// Reply to `ping`
    Pong,

    /// Identity bound
    Registered {
        #[serde(rename = "userUUID")]
        user_uuid: String,
    },

    /// Queued invitations
    Invitations { invitations: Vec<Invitation> },

    /// Invitation pushed to an online target
    Invitation { invitation: Invitation },

    /// Invitation queued for the target
    InviteSent {
        session_id: String,
        #[serde(rename = "userUUID")]
        user_uuid: String,
    },

    /// Invitation accepted by `user_uuid`
    InviteAccepted {
        session_id: String,
        #[serde(rename = "userUUID")]
        user_uuid: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Invitation declined by `user_uuid`
    InviteDeclined {
        session_id: String,
        #[serde(rename = "userUUID")]
        user_uuid: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Create an error message
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&RelayError> for ServerMessage {
    fn from(err: &RelayError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn raw(text: &str) -> Payload {
        RawValue::from_string(text.to_string()).unwrap()
    }

    #[test]
    fn test_parse_create() {
        let msg = ClientMessage::from_json(br#"{"type":"create","sessionId":"abc","peerId":"p1"}"#)
            .unwrap();
        match msg {
            ClientMessage::Create {
                session_id,
                peer_id,
            } => {
                assert_eq!(session_id.as_deref(), Some("abc"));
                assert_eq!(peer_id.as_deref(), Some("p1"));
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ignores_unrelated_fields() {
        let msg = ClientMessage::from_json(br#"{"type":"ping","sessionId":"abc","extra":42}"#)
            .unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_parse_invite_field_names() {
        let frame = json!({
            "type": "invite",
            "sessionId": "abc",
            "userUUID": "host-uuid",
            "targetUserUUID": "guest-uuid",
            "displayName": "Host",
            "mediaTitle": "Movie",
            "mediaThumb": "/thumb/1",
        });
        let msg = ClientMessage::from_json(frame.to_string().as_bytes()).unwrap();
        match msg {
            ClientMessage::Invite {
                user_uuid,
                target_user_uuid,
                media_thumb,
                ..
            } => {
                assert_eq!(user_uuid.as_deref(), Some("host-uuid"));
                assert_eq!(target_user_uuid.as_deref(), Some("guest-uuid"));
                assert_eq!(media_thumb.as_deref(), Some("/thumb/1"));
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_send_to_keeps_payload() {
        let msg =
            ClientMessage::from_json(br#"{"type":"sendTo","to":"p2","payload":{"x":1}}"#).unwrap();
        match msg {
            ClientMessage::SendTo { to, payload } => {
                assert_eq!(to.as_deref(), Some("p2"));
                assert_eq!(payload.unwrap().get(), r#"{"x":1}"#);
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_payload_text_is_kept() {
        let frame = br#"{"type":"broadcast","payload":{"z":1, "a":[1.10,2]}}"#;
        match ClientMessage::from_json(frame).unwrap() {
            ClientMessage::Broadcast { payload } => {
                assert_eq!(payload.unwrap().get(), r#"{"z":1, "a":[1.10,2]}"#);
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_null_payload_is_present() {
        match ClientMessage::from_json(br#"{"type":"broadcast","payload":null}"#).unwrap() {
            ClientMessage::Broadcast { payload } => assert_eq!(payload.unwrap().get(), "null"),
            other => panic!("wrong message type: {:?}", other),
        }
        match ClientMessage::from_json(br#"{"type":"broadcast"}"#).unwrap() {
            ClientMessage::Broadcast { payload } => assert!(payload.is_none()),
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_relayed_payload_serializes_verbatim() {
        let msg = ServerMessage::Message {
            from: "p1".into(),
            payload: Some(raw(r#"{"z":1,"n":123456789012345678901234567890}"#)),
        };
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"message","from":"p1","payload":{"z":1,"n":123456789012345678901234567890}}"#
        );
    }

    #[test]
    fn test_reject_unknown_and_malformed() {
        assert!(ClientMessage::from_json(br#"{"type":"warp"}"#).is_err());
        assert!(ClientMessage::from_json(br#"{"sessionId":"abc"}"#).is_err());
        assert!(ClientMessage::from_json(b"not json").is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let joined = ServerMessage::Joined {
            session_id: "abc".into(),
            peers: vec!["p1".into()],
        };
        let value: Value = serde_json::from_str(&joined.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "joined", "sessionId": "abc", "peers": ["p1"]}));

        let relayed = ServerMessage::Message {
            from: "p1".into(),
            payload: Some(raw(r#"{"x": 1}"#)),
        };
        let value: Value = serde_json::from_str(&relayed.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "message", "from": "p1", "payload": {"x": 1}}));

        let pong: Value = serde_json::from_str(&ServerMessage::Pong.to_json().unwrap()).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));

        let accepted = ServerMessage::InviteAccepted {
            session_id: "abc".into(),
            user_uuid: "guest".into(),
            display_name: Some("Guest".into()),
        };
        let value: Value = serde_json::from_str(&accepted.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "inviteAccepted");
        assert_eq!(value["userUUID"], "guest");
        assert_eq!(value["displayName"], "Guest");
    }

    #[test]
    fn test_error_message() {
        let msg = ServerMessage::from(&RelayError::PeerNotFound);
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("not_in_room"));
    }
}
