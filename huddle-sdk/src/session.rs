//! Session lifecycle: one task per chat view.
//!
//! A [`Session`] is an explicit value with a create/destroy lifecycle —
//! whoever opens the chat view owns it, and there is no shared singleton.
//! All mutable session state (queue, log, connection, sequence counter)
//! lives inside a single spawned task; every suspension point is inside
//! that task's `select!`, so teardown simply drops whatever was in flight
//! (handshake, backoff timer) and nothing can fire afterwards against
//! destroyed state.
//!
//! Lifecycle: resolve identity (fail closed, no socket), connect, announce
//! Join once after the first Connected, append inbound events to the
//! ordered log, and on teardown announce Leave best-effort and close.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};

use crate::connection::{BrokerConfig, ConnectionManager, ConnectionState, FrameWriter, Link};
use crate::error::ChatError;
use crate::event::{self, ChatEvent};
use crate::identity::{self, Identity};
use crate::log::{EventLog, LogEntry};
use crate::queue::OutboundQueue;
use crate::topic::{Topic, TopicRouter};
use crate::wire::{ClientFrame, DEST_ADD_MEMBER, DEST_SEND_MESSAGE, ServerFrame};

/// What happened to a published message, from the caller's side. Publish
/// never fails just because the network is down; it degrades to queued
/// and the queue flushes FIFO on the next Connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the broker; `sent_at` is the wire timestamp.
    Sent { sent_at: DateTime<Utc> },
    /// Buffered locally; `depth` is the queue depth including this one.
    Queued { depth: usize },
}

enum Command {
    Send {
        content: String,
        reply: oneshot::Sender<Delivery>,
    },
    Close,
}

/// Handle to a live chat session. Cheap to clone; the session tears down
/// when `close` is called or every handle is dropped.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    topic: Topic,
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    log: EventLog,
    queue_depth: Arc<AtomicUsize>,
}

impl Session {
    /// Resolve `credential` and start a session against `config`.
    ///
    /// Fails closed: an unresolvable credential returns
    /// [`ChatError::InvalidCredential`] before any socket is opened.
    /// Must be called from within a tokio runtime.
    pub fn open(
        config: BrokerConfig,
        credential: &str,
    ) -> Result<(Session, mpsc::Receiver<LogEntry>), ChatError> {
        let identity = identity::resolve(credential)?;
        let topic = Topic::for_tenant(&identity.tenant_id);
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(4096);
        let (mgr, state_rx) = ConnectionManager::new(config, topic.clone(), identity.clone());
        let log = EventLog::new();
        let queue_depth = Arc::new(AtomicUsize::new(0));

        let task = SessionTask {
            identity: identity.clone(),
            mgr,
            router: TopicRouter::new(topic.clone()),
            queue: OutboundQueue::new(),
            log: log.clone(),
            events_tx,
            cmd_rx,
            queue_depth: queue_depth.clone(),
            arrival_seq: 0,
            joined: false,
        };
        tokio::spawn(task.run());

        Ok((
            Session {
                identity,
                topic,
                cmd_tx,
                state_rx,
                log,
                queue_depth,
            },
            events_rx,
        ))
    }

    /// Publish a chat message as this session's identity.
    ///
    /// Empty content is rejected — only Join/Leave carry none. While not
    /// Connected the message is queued, which the reply makes visible so
    /// the UI can show a delivery-pending state instead of losing it.
    pub async fn send(&self, content: &str) -> Result<Delivery, ChatError> {
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                content: content.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        reply_rx.await.map_err(|_| ChatError::SessionClosed)
    }

    /// Tear the session down: best-effort Leave, then close the transport.
    /// Never fails; closing an already-closed session is a no-op.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The ordered event log; safe to read while the session appends.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection-state transitions, e.g. to disable the send box
    /// while reconnecting.
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Number of locally-originated events waiting for the next Connected.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

fn message_event(identity: &Identity, content: String) -> ChatEvent {
    ChatEvent::Message {
        sender: identity.display_name.clone(),
        content,
        tenant_id: identity.tenant_id.clone(),
        member_id: identity.member_id,
        sent_at: Utc::now(),
    }
}

enum Opened {
    Link(Link),
    Closed,
}

struct SessionTask {
    identity: Identity,
    mgr: ConnectionManager,
    router: TopicRouter,
    queue: OutboundQueue,
    log: EventLog,
    events_tx: mpsc::Sender<LogEntry>,
    cmd_rx: mpsc::Receiver<Command>,
    queue_depth: Arc<AtomicUsize>,
    arrival_seq: u64,
    joined: bool,
}

impl SessionTask {
    async fn run(mut self) {
        'reconnect: loop {
            // Drive towards Connected while still serving the handle:
            // sends issued now are queued, and a close (or all handles
            // dropped) cancels the in-flight handshake or backoff timer.
            let opened = {
                let open_fut = self.mgr.open();
                tokio::pin!(open_fut);
                loop {
                    tokio::select! {
                        link = &mut open_fut => break Opened::Link(link),
                        cmd = self.cmd_rx.recv() => match cmd {
                            Some(Command::Send { content, reply }) => {
                                self.queue.enqueue(message_event(&self.identity, content));
                                self.queue_depth.store(self.queue.len(), Ordering::Relaxed);
                                let _ = reply.send(Delivery::Queued {
                                    depth: self.queue.len(),
                                });
                            }
                            Some(Command::Close) | None => break Opened::Closed,
                        },
                    }
                }
            };
            let link = match opened {
                Opened::Link(link) => link,
                Opened::Closed => {
                    // Torn down before reaching Connected: no Join was or
                    // will ever be sent.
                    self.mgr.close();
                    return;
                }
            };
            let Link {
                mut reader,
                mut writer,
                generation,
            } = link;

            // Queued events go out first, in enqueue order, before any new
            // publish is accepted.
            if let Err(err) = self.flush_queue(&mut writer).await {
                tracing::warn!(generation, error = %err, "flush after connect failed");
                self.mgr.mark_reconnecting();
                continue 'reconnect;
            }

            // Join is announced once per session, on the first Connected.
            // It is never queued: a session torn down while connecting
            // must not leave a phantom Join behind.
            if !self.joined
                && let Ok(payload) = event::encode_to_string(&ChatEvent::Join {
                    sender: self.identity.display_name.clone(),
                    tenant_id: self.identity.tenant_id.clone(),
                    member_id: self.identity.member_id,
                })
            {
                let frame = ClientFrame::Send {
                    destination: DEST_ADD_MEMBER.to_string(),
                    payload,
                };
                match writer.write_frame(&frame).await {
                    Ok(()) => self.joined = true,
                    Err(err) => {
                        tracing::warn!(generation, error = %err, "join announcement failed");
                        self.mgr.mark_reconnecting();
                        continue 'reconnect;
                    }
                }
            }

            loop {
                tokio::select! {
                    inbound = reader.read_frame() => match inbound {
                        Ok(Some(ServerFrame::Message { topic, payload })) => {
                            if let Some(event) = self.router.route(&topic, payload.as_bytes()) {
                                self.arrival_seq += 1;
                                let entry = self.log.append(event, self.arrival_seq);
                                if self.events_tx.try_send(entry).is_err() {
                                    tracing::trace!("event receiver lagging or gone");
                                }
                            }
                        }
                        Ok(Some(ServerFrame::Ping { token })) => {
                            if let Err(err) = writer.write_frame(&ClientFrame::Pong { token }).await {
                                tracing::warn!(generation, error = %err, "keepalive reply failed");
                                self.mgr.mark_reconnecting();
                                continue 'reconnect;
                            }
                        }
                        // Duplicate CONNECTED after handshake; harmless.
                        Ok(Some(ServerFrame::Connected)) => {}
                        Ok(Some(ServerFrame::Error { text })) => {
                            tracing::warn!(generation, %text, "broker reported an error");
                        }
                        Ok(None) => {
                            tracing::info!(generation, "broker closed the connection");
                            self.mgr.mark_reconnecting();
                            continue 'reconnect;
                        }
                        Err(err) => {
                            tracing::warn!(generation, error = %err, "transport error");
                            self.mgr.mark_reconnecting();
                            continue 'reconnect;
                        }
                    },
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(Command::Send { content, reply }) => {
                            // sent_at is assigned here, at transmission,
                            // not when the user typed the message.
                            let event = message_event(&self.identity, content).stamped_now();
                            match event::encode_to_string(&event) {
                                Ok(payload) => {
                                    let frame = ClientFrame::Send {
                                        destination: DEST_SEND_MESSAGE.to_string(),
                                        payload,
                                    };
                                    match writer.write_frame(&frame).await {
                                        Ok(()) => {
                                            let sent_at =
                                                event.sent_at().unwrap_or_else(Utc::now);
                                            let _ = reply.send(Delivery::Sent { sent_at });
                                        }
                                        Err(err) => {
                                            tracing::warn!(generation, error = %err, "publish failed; queuing");
                                            self.queue.enqueue(event);
                                            self.queue_depth
                                                .store(self.queue.len(), Ordering::Relaxed);
                                            let _ = reply.send(Delivery::Queued {
                                                depth: self.queue.len(),
                                            });
                                            self.mgr.mark_reconnecting();
                                            continue 'reconnect;
                                        }
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "message did not encode; queuing");
                                    self.queue.enqueue(event);
                                    self.queue_depth.store(self.queue.len(), Ordering::Relaxed);
                                    let _ = reply.send(Delivery::Queued {
                                        depth: self.queue.len(),
                                    });
                                }
                            }
                        }
                        Some(Command::Close) | None => {
                            self.teardown(&mut writer).await;
                            return;
                        }
                    },
                }
            }
        }
    }

    /// Write out everything queued while offline, oldest first. A failed
    /// write puts the event back at the head so order survives the retry.
    async fn flush_queue(&mut self, writer: &mut FrameWriter) -> std::io::Result<()> {
        while let Some(queued) = self.queue.pop() {
            let event = queued.stamped_now();
            let payload = match event::encode_to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unencodable queued event");
                    self.queue_depth.store(self.queue.len(), Ordering::Relaxed);
                    continue;
                }
            };
            let frame = ClientFrame::Send {
                destination: DEST_SEND_MESSAGE.to_string(),
                payload,
            };
            if let Err(err) = writer.write_frame(&frame).await {
                self.queue.requeue_front(event);
                self.queue_depth.store(self.queue.len(), Ordering::Relaxed);
                return Err(err);
            }
            self.queue_depth.store(self.queue.len(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Best-effort goodbye. Teardown never fails: a lost Leave is logged
    /// and forgotten.
    async fn teardown(&mut self, writer: &mut FrameWriter) {
        if self.joined
            && let Ok(payload) = event::encode_to_string(&ChatEvent::Leave {
                sender: self.identity.display_name.clone(),
                tenant_id: self.identity.tenant_id.clone(),
                member_id: self.identity.member_id,
            })
        {
            let frame = ClientFrame::Send {
                destination: DEST_SEND_MESSAGE.to_string(),
                payload,
            };
            if let Err(err) = writer.write_frame(&frame).await {
                tracing::debug!(error = %err, "leave announcement lost");
            }
        }
        let _ = writer.write_frame(&ClientFrame::Disconnect).await;
        self.mgr.close();
    }
}
