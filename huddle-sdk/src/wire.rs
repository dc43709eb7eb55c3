//! The broker's line protocol.
//!
//! One frame per `\r\n`-terminated line. Verb first, then space-separated
//! arguments; JSON payloads are the final argument and may contain spaces.
//!
//! ```text
//! client → broker   CONNECT huddle/1 <tenantId> <memberId>
//!                   SUBSCRIBE <topic>
//!                   SEND <destination> <json>
//!                   PONG <token>
//!                   DISCONNECT
//! broker → client   CONNECTED
//!                   MESSAGE <topic> <json>
//!                   PING <token>
//!                   ERROR <text>
//! ```
//!
//! Both directions are implemented here; the client only formats
//! [`ClientFrame`]s and parses [`ServerFrame`]s, but broker-side tooling
//! (and the integration tests) need the reverse.

use thiserror::Error;

/// Protocol identifier sent in `CONNECT`.
pub const PROTOCOL: &str = "huddle/1";

/// Destination for presence announcements (Join).
pub const DEST_ADD_MEMBER: &str = "chat.add-member";
/// Destination for chat messages; Leave also travels here.
pub const DEST_SEND_MESSAGE: &str = "chat.send-message";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Frames the client writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Connect { tenant_id: String, member_id: u64 },
    Subscribe { topic: String },
    Send { destination: String, payload: String },
    Pong { token: String },
    Disconnect,
}

/// Frames the broker writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Connected,
    Message { topic: String, payload: String },
    Ping { token: String },
    Error { text: String },
}

impl ClientFrame {
    /// Render as a wire line, including the trailing `\r\n`.
    pub fn format(&self) -> String {
        match self {
            ClientFrame::Connect {
                tenant_id,
                member_id,
            } => format!("CONNECT {PROTOCOL} {tenant_id} {member_id}\r\n"),
            ClientFrame::Subscribe { topic } => format!("SUBSCRIBE {topic}\r\n"),
            ClientFrame::Send {
                destination,
                payload,
            } => format!("SEND {destination} {payload}\r\n"),
            ClientFrame::Pong { token } => format!("PONG {token}\r\n"),
            ClientFrame::Disconnect => "DISCONNECT\r\n".to_string(),
        }
    }

    /// Parse a line (already stripped of its terminator).
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let malformed = || WireError::Malformed(line.to_string());
        let (verb, rest) = split_verb(line);
        match verb {
            "CONNECT" => {
                let mut args = rest.split(' ');
                let proto = args.next().ok_or_else(malformed)?;
                if proto != PROTOCOL {
                    return Err(WireError::Malformed(format!(
                        "unsupported protocol `{proto}`"
                    )));
                }
                let tenant_id = args.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
                let member_id = args
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(malformed)?;
                if args.next().is_some() {
                    return Err(malformed());
                }
                Ok(ClientFrame::Connect {
                    tenant_id: tenant_id.to_string(),
                    member_id,
                })
            }
            "SUBSCRIBE" => {
                if rest.is_empty() || rest.contains(' ') {
                    return Err(malformed());
                }
                Ok(ClientFrame::Subscribe {
                    topic: rest.to_string(),
                })
            }
            "SEND" => {
                let (destination, payload) = rest.split_once(' ').ok_or_else(malformed)?;
                if destination.is_empty() || payload.is_empty() {
                    return Err(malformed());
                }
                Ok(ClientFrame::Send {
                    destination: destination.to_string(),
                    payload: payload.to_string(),
                })
            }
            "PONG" => Ok(ClientFrame::Pong {
                token: rest.to_string(),
            }),
            "DISCONNECT" => Ok(ClientFrame::Disconnect),
            _ => Err(malformed()),
        }
    }
}

impl ServerFrame {
    /// Render as a wire line, including the trailing `\r\n`.
    pub fn format(&self) -> String {
        match self {
            ServerFrame::Connected => "CONNECTED\r\n".to_string(),
            ServerFrame::Message { topic, payload } => {
                format!("MESSAGE {topic} {payload}\r\n")
            }
            ServerFrame::Ping { token } => format!("PING {token}\r\n"),
            ServerFrame::Error { text } => format!("ERROR {text}\r\n"),
        }
    }

    /// Parse a line (already stripped of its terminator).
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let malformed = || WireError::Malformed(line.to_string());
        let (verb, rest) = split_verb(line);
        match verb {
            "CONNECTED" => Ok(ServerFrame::Connected),
            "MESSAGE" => {
                let (topic, payload) = rest.split_once(' ').ok_or_else(malformed)?;
                if topic.is_empty() || payload.is_empty() {
                    return Err(malformed());
                }
                Ok(ServerFrame::Message {
                    topic: topic.to_string(),
                    payload: payload.to_string(),
                })
            }
            "PING" => Ok(ServerFrame::Ping {
                token: rest.to_string(),
            }),
            "ERROR" => Ok(ServerFrame::Error {
                text: rest.to_string(),
            }),
            _ => Err(malformed()),
        }
    }
}

fn split_verb(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest),
        None => (line, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_round_trip() {
        let frames = [
            ClientFrame::Connect {
                tenant_id: "t42".to_string(),
                member_id: 7,
            },
            ClientFrame::Subscribe {
                topic: "tenant-t42".to_string(),
            },
            ClientFrame::Send {
                destination: DEST_SEND_MESSAGE.to_string(),
                payload: r#"{"type":"CHAT","content":"two words"}"#.to_string(),
            },
            ClientFrame::Pong {
                token: "ka-1".to_string(),
            },
            ClientFrame::Disconnect,
        ];
        for frame in frames {
            let line = frame.format();
            assert!(line.ends_with("\r\n"));
            assert_eq!(ClientFrame::parse(line.trim_end()).unwrap(), frame);
        }
    }

    #[test]
    fn server_frames_round_trip() {
        let frames = [
            ServerFrame::Connected,
            ServerFrame::Message {
                topic: "tenant-t42".to_string(),
                payload: r#"{"type":"JOIN","sender":"Ana K"}"#.to_string(),
            },
            ServerFrame::Ping {
                token: "ka-2".to_string(),
            },
            ServerFrame::Error {
                text: "tenant suspended".to_string(),
            },
        ];
        for frame in frames {
            let line = frame.format();
            assert_eq!(ServerFrame::parse(line.trim_end()).unwrap(), frame);
        }
    }

    #[test]
    fn payload_keeps_embedded_spaces() {
        let line = r#"MESSAGE tenant-t42 {"content":"hello there world"}"#;
        match ServerFrame::parse(line).unwrap() {
            ServerFrame::Message { payload, .. } => {
                assert_eq!(payload, r#"{"content":"hello there world"}"#);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_verbs_and_bad_args() {
        assert!(ServerFrame::parse("NOPE").is_err());
        assert!(ServerFrame::parse("MESSAGE tenant-t42").is_err());
        assert!(ClientFrame::parse("CONNECT huddle/0 t42 7").is_err());
        assert!(ClientFrame::parse("CONNECT huddle/1 t42 notanumber").is_err());
        assert!(ClientFrame::parse("SEND chat.send-message").is_err());
    }
}
