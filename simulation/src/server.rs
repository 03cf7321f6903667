//! In-process stand-in for the chat server
//!
//! Accepts read-state requests, optionally rejects some paths, and queues the
//! flag events the real server would push back to the client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use indras_unread::{
    ConversationKey, FlagEvent, Message, MessageDetails, MessageId, ServerRequest, ServerTransport,
    StreamId, TransportError, UnreadSnapshot,
};

use crate::scenario::ServerConfig;

/// Scripted server
#[derive(Debug)]
pub struct SimServer {
    config: ServerConfig,
    /// Every message the server knows about
    conversations: BTreeMap<MessageId, ConversationKey>,
    posted: Mutex<Vec<ServerRequest>>,
    echoes: Mutex<Vec<FlagEvent>>,
}

impl SimServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            conversations: BTreeMap::new(),
            posted: Mutex::new(Vec::new()),
            echoes: Mutex::new(Vec::new()),
        }
    }

    /// Teach the server which conversation each message belongs to
    pub fn with_messages<'a>(mut self, messages: impl IntoIterator<Item = &'a Message>) -> Self {
        for message in messages {
            self.conversations.insert(message.id, message.conversation.clone());
        }
        self
    }

    /// Teach the server the conversations named in a startup snapshot
    pub fn with_snapshot(mut self, snapshot: &UnreadSnapshot) -> Self {
        for stream in &snapshot.streams {
            let conversation = ConversationKey::stream(stream.stream_id, stream.topic.clone());
            for id in &stream.unread_message_ids {
                self.conversations.insert(*id, conversation.clone());
            }
        }
        for pm in &snapshot.pms {
            let conversation = ConversationKey::private(pm.participants.clone());
            for id in &pm.unread_message_ids {
                self.conversations.insert(*id, conversation.clone());
            }
        }
        self
    }

    /// Requests received so far, accepted or not
    pub fn posted(&self) -> Vec<ServerRequest> {
        self.posted.lock().clone()
    }

    /// Flag events waiting to be delivered to the client
    pub fn take_echoes(&self) -> Vec<FlagEvent> {
        std::mem::take(&mut *self.echoes.lock())
    }

    fn ids_where(&self, matches: impl Fn(&ConversationKey) -> bool) -> Vec<MessageId> {
        self.conversations
            .iter()
            .filter(|(_, conversation)| matches(conversation))
            .map(|(id, _)| *id)
            .collect()
    }

    fn in_stream(stream_id: StreamId) -> impl Fn(&ConversationKey) -> bool {
        move |conversation| conversation.stream_id() == Some(stream_id)
    }

    /// The flag event the server pushes after accepting `request`
    fn echo_for(&self, request: &ServerRequest) -> Option<FlagEvent> {
        let message_ids = match request {
            ServerRequest::MarkRead { messages } => messages.clone(),
            ServerRequest::MarkUnread { messages } => {
                // Direct-message details need raw user ids the server does
                // not keep here; the client falls back to its cache.
                let message_details = messages
                    .iter()
                    .filter_map(|id| match self.conversations.get(id)? {
                        ConversationKey::Stream { stream_id, topic } => {
                            Some((*id, MessageDetails::stream(*stream_id, topic.clone())))
                        }
                        ConversationKey::Private { .. } => None,
                    })
                    .collect();
                return Some(FlagEvent::Unread {
                    message_ids: messages.clone(),
                    message_details,
                });
            }
            ServerRequest::MarkAllRead => self.ids_where(|_| true),
            ServerRequest::MarkStreamRead { stream_id } => {
                self.ids_where(Self::in_stream(*stream_id))
            }
            ServerRequest::MarkTopicRead { stream_id, topic } => self.ids_where(|conversation| {
                matches!(conversation, ConversationKey::Stream { stream_id: s, topic: t }
                    if s == stream_id && t == topic)
            }),
        };

        (!message_ids.is_empty()).then_some(FlagEvent::Read { message_ids })
    }
}

#[async_trait]
impl ServerTransport for SimServer {
    async fn post(&self, request: &ServerRequest) -> Result<(), TransportError> {
        self.posted.lock().push(request.clone());

        if self.config.reject_paths.iter().any(|path| path == request.path()) {
            info!(path = request.path(), "Server rejected request");
            return Err(TransportError::Rejected {
                status: 400,
                reason: "rejected by scenario".to_string(),
            });
        }

        if self.config.echo
            && let Some(event) = self.echo_for(request)
        {
            debug!(path = request.path(), ids = event.message_ids().len(), "Queued server echo");
            self.echoes.lock().push(event);
        }

        Ok(())
    }
}
