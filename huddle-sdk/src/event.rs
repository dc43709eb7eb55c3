//! Chat events and their wire codec.
//!
//! The wire form is a JSON object with a `type` tag (`"JOIN"`, `"LEAVE"`,
//! `"CHAT"`) plus `sender`, `content`, `tenantId`, `memberId` and, for chat
//! messages, `sentAt`. Tags this client doesn't know decode to
//! [`ChatEvent::Unknown`] instead of erroring, so a newer broker can't kill
//! the inbound pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One event on a tenant's topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A member entered the tenant's chat scope.
    Join {
        sender: String,
        tenant_id: String,
        member_id: u64,
    },

    /// A member left the tenant's chat scope.
    Leave {
        sender: String,
        tenant_id: String,
        member_id: u64,
    },

    /// A chat message. `content` is always non-empty; `sent_at` is the
    /// wire-time timestamp stamped when the frame was actually written,
    /// not when the user hit enter.
    Message {
        sender: String,
        content: String,
        tenant_id: String,
        member_id: u64,
        sent_at: DateTime<Utc>,
    },

    /// An event tag this client doesn't understand. Kept in the log so
    /// ordering is preserved; presentation renders it as nothing.
    Unknown { tag: String },
}

impl ChatEvent {
    /// The event's own timestamp, if it carries one.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ChatEvent::Message { sent_at, .. } => Some(*sent_at),
            _ => None,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            ChatEvent::Join { sender, .. }
            | ChatEvent::Leave { sender, .. }
            | ChatEvent::Message { sender, .. } => Some(sender),
            ChatEvent::Unknown { .. } => None,
        }
    }

    /// Re-stamp a `Message` with the current time. Called at the moment a
    /// frame is written so that queued-while-offline messages carry their
    /// transmission time, not their typed time.
    pub fn stamped_now(self) -> Self {
        match self {
            ChatEvent::Message {
                sender,
                content,
                tenant_id,
                member_id,
                ..
            } => ChatEvent::Message {
                sender,
                content,
                tenant_id,
                member_id,
                sent_at: Utc::now(),
            },
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A `CHAT` frame without content is rejected; Join/Leave carry none.
    #[error("CHAT frame is missing content")]
    MissingContent,

    #[error("frame is missing required field `{0}`")]
    MissingField(&'static str),

    /// `Unknown` exists only on the inbound path.
    #[error("cannot encode an unknown event")]
    UnknownEvent,
}

/// Schema-tagged wire shape. All fields default so that frames carrying
/// future tags (and possibly future fields) still deserialize.
#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "tenantId", default)]
    tenant_id: String,
    #[serde(rename = "memberId", default)]
    member_id: u64,
    #[serde(rename = "sentAt", default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
}

/// Encode an event as its JSON wire payload.
pub fn encode_to_string(event: &ChatEvent) -> Result<String, CodecError> {
    let wire = match event {
        ChatEvent::Join {
            sender,
            tenant_id,
            member_id,
        } => WireEvent {
            kind: "JOIN".to_string(),
            sender: sender.clone(),
            content: String::new(),
            tenant_id: tenant_id.clone(),
            member_id: *member_id,
            sent_at: None,
        },
        ChatEvent::Leave {
            sender,
            tenant_id,
            member_id,
        } => WireEvent {
            kind: "LEAVE".to_string(),
            sender: sender.clone(),
            content: String::new(),
            tenant_id: tenant_id.clone(),
            member_id: *member_id,
            sent_at: None,
        },
        ChatEvent::Message {
            sender,
            content,
            tenant_id,
            member_id,
            sent_at,
        } => {
            if content.is_empty() {
                return Err(CodecError::MissingContent);
            }
            WireEvent {
                kind: "CHAT".to_string(),
                sender: sender.clone(),
                content: content.clone(),
                tenant_id: tenant_id.clone(),
                member_id: *member_id,
                sent_at: Some(*sent_at),
            }
        }
        ChatEvent::Unknown { .. } => return Err(CodecError::UnknownEvent),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Encode an event as bytes.
pub fn encode(event: &ChatEvent) -> Result<Vec<u8>, CodecError> {
    encode_to_string(event).map(String::into_bytes)
}

/// Decode one wire payload. Unrecognized tags come back as
/// [`ChatEvent::Unknown`]; only structurally broken frames error.
pub fn decode(bytes: &[u8]) -> Result<ChatEvent, CodecError> {
    let wire: WireEvent = serde_json::from_slice(bytes)?;
    match wire.kind.as_str() {
        "JOIN" | "LEAVE" | "CHAT" => {
            if wire.sender.is_empty() {
                return Err(CodecError::MissingField("sender"));
            }
            if wire.tenant_id.is_empty() {
                return Err(CodecError::MissingField("tenantId"));
            }
            if wire.member_id == 0 {
                return Err(CodecError::MissingField("memberId"));
            }
        }
        other => {
            return Ok(ChatEvent::Unknown {
                tag: other.to_string(),
            });
        }
    }
    let event = match wire.kind.as_str() {
        "JOIN" => ChatEvent::Join {
            sender: wire.sender,
            tenant_id: wire.tenant_id,
            member_id: wire.member_id,
        },
        "LEAVE" => ChatEvent::Leave {
            sender: wire.sender,
            tenant_id: wire.tenant_id,
            member_id: wire.member_id,
        },
        _ => {
            if wire.content.is_empty() {
                return Err(CodecError::MissingContent);
            }
            ChatEvent::Message {
                sender: wire.sender,
                content: wire.content,
                tenant_id: wire.tenant_id,
                member_id: wire.member_id,
                // A broker that omits sentAt still yields a usable event;
                // arrival time stands in.
                sent_at: wire.sent_at.unwrap_or_else(Utc::now),
            }
        }
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> ChatEvent {
        ChatEvent::Message {
            sender: "Ana K".to_string(),
            content: content.to_string(),
            tenant_id: "t42".to_string(),
            member_id: 7,
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn message_round_trips() {
        let event = message("hello");
        let decoded = decode(&encode(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn join_carries_no_content() {
        let event = ChatEvent::Join {
            sender: "Ana K".to_string(),
            tenant_id: "t42".to_string(),
            member_id: 7,
        };
        let payload = encode_to_string(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "JOIN");
        assert_eq!(value["content"], "");
        assert!(value.get("sentAt").is_none());
        assert_eq!(decode(payload.as_bytes()).unwrap(), event);
    }

    #[test]
    fn chat_without_content_is_rejected() {
        let payload = br#"{"type":"CHAT","sender":"Ana K","tenantId":"t42","memberId":7}"#;
        assert!(matches!(decode(payload), Err(CodecError::MissingContent)));
        assert!(matches!(
            encode(&message("")),
            Err(CodecError::MissingContent)
        ));
    }

    #[test]
    fn missing_sender_is_rejected() {
        let payload = br#"{"type":"CHAT","content":"hi","tenantId":"t42","memberId":7}"#;
        assert!(matches!(
            decode(payload),
            Err(CodecError::MissingField("sender"))
        ));
    }

    #[test]
    fn missing_tenant_or_member_is_rejected() {
        let no_tenant = br#"{"type":"JOIN","sender":"Ana K","memberId":7}"#;
        assert!(matches!(
            decode(no_tenant),
            Err(CodecError::MissingField("tenantId"))
        ));
        let no_member = br#"{"type":"LEAVE","sender":"Ana K","tenantId":"t42"}"#;
        assert!(matches!(
            decode(no_member),
            Err(CodecError::MissingField("memberId"))
        ));
        let chat = br#"{"type":"CHAT","sender":"Ana K","content":"hi","memberId":7}"#;
        assert!(matches!(
            decode(chat),
            Err(CodecError::MissingField("tenantId"))
        ));
    }

    #[test]
    fn unknown_tag_decodes_to_placeholder() {
        let payload = br#"{"type":"TYPING","sender":"Ana K","tenantId":"t42"}"#;
        assert_eq!(
            decode(payload).unwrap(),
            ChatEvent::Unknown {
                tag: "TYPING".to_string()
            }
        );
        // And an unknown tag with no other fields at all still decodes.
        assert_eq!(
            decode(br#"{"type":"POKE"}"#).unwrap(),
            ChatEvent::Unknown {
                tag: "POKE".to_string()
            }
        );
    }

    #[test]
    fn unknown_cannot_be_encoded() {
        let event = ChatEvent::Unknown {
            tag: "POKE".to_string(),
        };
        assert!(matches!(encode(&event), Err(CodecError::UnknownEvent)));
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(matches!(decode(b"not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn stamped_now_only_touches_messages() {
        let join = ChatEvent::Join {
            sender: "Ana K".to_string(),
            tenant_id: "t42".to_string(),
            member_id: 7,
        };
        assert_eq!(join.clone().stamped_now(), join);

        let before = Utc::now();
        let stamped = message("hi").stamped_now();
        assert!(stamped.sent_at().unwrap() >= before);
    }
}
