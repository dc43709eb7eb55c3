//! Tenant → topic mapping and inbound demultiplexing.
//!
//! One session, one topic, for the session's whole lifetime. Should the
//! transport ever multiplex, frames for other tenants' topics are dropped
//! without surfacing — a session only cares about its own tenant. The
//! router preserves arrival order and does not deduplicate; event identity
//! doesn't exist at this layer.

use std::fmt;

use crate::event::{self, ChatEvent};

/// A broker pub/sub topic. Exactly one per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// `topic(tenantId) = "tenant-" + tenantId`.
    pub fn for_tenant(tenant_id: &str) -> Self {
        Topic(format!("tenant-{tenant_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Demuxes inbound frames into typed events for one topic.
#[derive(Debug)]
pub struct TopicRouter {
    topic: Topic,
}

impl TopicRouter {
    pub fn new(topic: Topic) -> Self {
        Self { topic }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Decode a frame if it belongs to this router's topic.
    ///
    /// Foreign topics and malformed payloads both yield `None`; a bad
    /// frame is dropped and logged, never a stream-ending error.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Option<ChatEvent> {
        if topic != self.topic.as_str() {
            tracing::trace!(%topic, own = %self.topic, "dropping frame for foreign topic");
            return None;
        }
        match event::decode(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(content: &str) -> String {
        event::encode_to_string(&ChatEvent::Message {
            sender: "Ana K".to_string(),
            content: content.to_string(),
            tenant_id: "t42".to_string(),
            member_id: 7,
            sent_at: chrono::Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn maps_tenant_to_topic() {
        assert_eq!(Topic::for_tenant("t42").as_str(), "tenant-t42");
    }

    #[test]
    fn routes_own_topic_only() {
        let router = TopicRouter::new(Topic::for_tenant("t42"));
        assert!(router.route("tenant-t42", payload("hi").as_bytes()).is_some());
        assert!(router.route("tenant-t99", payload("hi").as_bytes()).is_none());
    }

    #[test]
    fn malformed_payload_is_dropped_not_fatal() {
        let router = TopicRouter::new(Topic::for_tenant("t42"));
        assert!(router.route("tenant-t42", b"{broken").is_none());
        // The next valid frame still goes through.
        assert!(router.route("tenant-t42", payload("still alive").as_bytes()).is_some());
    }

    #[test]
    fn unknown_tags_pass_through() {
        let router = TopicRouter::new(Topic::for_tenant("t42"));
        let routed = router
            .route("tenant-t42", br#"{"type":"POKE","sender":"x"}"#)
            .unwrap();
        assert_eq!(
            routed,
            ChatEvent::Unknown {
                tag: "POKE".to_string()
            }
        );
    }
}
