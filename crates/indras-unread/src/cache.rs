//! Access to the client's message cache
//!
//! Messages are owned elsewhere; the read-state core only looks them up by
//! id and flips their `unread` flag.

use std::collections::HashMap;

use crate::message::{Message, MessageId};

/// Lookup and flag access for locally cached messages
pub trait MessageCache {
    /// Get a cached message, if this client ever fetched it
    fn get(&self, id: MessageId) -> Option<Message>;

    /// Set the unread flag on a cached message
    ///
    /// Returns false if the message is not cached.
    fn set_unread(&mut self, id: MessageId, unread: bool) -> bool;

    /// Add or replace a message
    fn insert(&mut self, message: Message);
}

/// HashMap-backed message cache
#[derive(Debug, Default)]
pub struct InMemoryMessageCache {
    messages: HashMap<MessageId, Message>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache holding the given messages
    pub fn with_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut cache = Self::new();
        for message in messages {
            cache.insert(message);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageCache for InMemoryMessageCache {
    fn get(&self, id: MessageId) -> Option<Message> {
        self.messages.get(&id).cloned()
    }

    fn set_unread(&mut self, id: MessageId, unread: bool) -> bool {
        match self.messages.get_mut(&id) {
            Some(message) => {
                message.unread = unread;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, message: Message) {
        self.messages.insert(message.id, message);
    }
}
