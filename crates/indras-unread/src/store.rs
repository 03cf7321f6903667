//! Unread store: the single source of truth for read state
//!
//! Holds the set of message ids this client considers unread, grouped by
//! conversation, plus a reverse index from id to conversation. An id lives
//! in at most one conversation set, and is present iff it is unread.
//! Ids the store has never heard of are treated as read.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::{
    ConversationKey, Message, MessageId, ParticipantKey, StreamId, UnreadEntry,
};

/// Unread ids in one channel topic, as delivered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamUnread {
    pub stream_id: StreamId,
    pub topic: String,
    pub unread_message_ids: Vec<MessageId>,
}

/// Unread ids in one direct-message conversation, as delivered at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateUnread {
    pub participants: ParticipantKey,
    pub unread_message_ids: Vec<MessageId>,
}

/// Initial unread state sent by the server when the client registers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnreadSnapshot {
    pub streams: Vec<StreamUnread>,
    pub pms: Vec<PrivateUnread>,
    /// Unread ids that mention the current user
    pub mentions: Vec<MessageId>,
}

/// Aggregate counts handed to the counter surfaces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCounts {
    pub total: usize,
    pub private_message_count: usize,
    pub mentioned_count: usize,
    pub stream_counts: BTreeMap<StreamId, usize>,
    pub private_counts: BTreeMap<ParticipantKey, usize>,
}

/// In-memory unread index
#[derive(Debug, Default)]
pub struct UnreadStore {
    /// Unread ids per conversation; empty sets are removed
    conversations: HashMap<ConversationKey, BTreeSet<MessageId>>,
    /// Message id to owning conversation
    index: HashMap<MessageId, ConversationKey>,
    /// Unread ids that mention the current user
    mentions: BTreeSet<MessageId>,
}

impl UnreadStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store populated from a startup snapshot
    pub fn from_snapshot(snapshot: UnreadSnapshot) -> Self {
        let mut store = Self::new();
        store.load_snapshot(snapshot);
        store
    }

    /// Populate from a startup snapshot
    ///
    /// Entries are merged into whatever the store already holds.
    pub fn load_snapshot(&mut self, snapshot: UnreadSnapshot) {
        let mentions: BTreeSet<MessageId> = snapshot.mentions.into_iter().collect();

        for stream in snapshot.streams {
            let conversation = ConversationKey::stream(stream.stream_id, stream.topic);
            for id in stream.unread_message_ids {
                self.insert(UnreadEntry {
                    id,
                    conversation: conversation.clone(),
                    mentioned: mentions.contains(&id),
                });
            }
        }

        for pm in snapshot.pms {
            let conversation = ConversationKey::private(pm.participants);
            for id in pm.unread_message_ids {
                self.insert(UnreadEntry {
                    id,
                    conversation: conversation.clone(),
                    mentioned: mentions.contains(&id),
                });
            }
        }

        debug!(total = self.index.len(), "Loaded unread snapshot");
    }

    /// Index newly fetched messages that arrive flagged unread
    ///
    /// Returns how many ids were added.
    pub fn process_loaded_messages(&mut self, messages: &[Message]) -> usize {
        messages
            .iter()
            .filter(|m| m.unread)
            .filter(|m| self.insert(m.entry()))
            .count()
    }

    /// Mark an id as read
    ///
    /// Returns true if the id was unread before the call.
    pub fn mark_read(&mut self, id: MessageId) -> bool {
        let Some(conversation) = self.index.remove(&id) else {
            return false;
        };

        if let Some(ids) = self.conversations.get_mut(&conversation) {
            ids.remove(&id);
            if ids.is_empty() {
                self.conversations.remove(&conversation);
            }
        }
        self.mentions.remove(&id);

        true
    }

    /// Mark an id as unread, placing it in the entry's conversation
    ///
    /// Accepts a partial descriptor, so callers without the full message can
    /// still record the transition. Returns true if the id was read before.
    pub fn mark_unread(&mut self, entry: UnreadEntry) -> bool {
        self.insert(entry)
    }

    fn insert(&mut self, entry: UnreadEntry) -> bool {
        if self.index.contains_key(&entry.id) {
            return false;
        }

        self.conversations
            .entry(entry.conversation.clone())
            .or_default()
            .insert(entry.id);
        if entry.mentioned {
            self.mentions.insert(entry.id);
        }
        self.index.insert(entry.id, entry.conversation);

        true
    }

    /// Check whether an id is unread
    pub fn is_unread(&self, id: MessageId) -> bool {
        self.index.contains_key(&id)
    }

    /// Check whether an unread id mentions the current user
    pub fn is_mentioned(&self, id: MessageId) -> bool {
        self.mentions.contains(&id)
    }

    /// The ids from `ids` that are currently unread, in input order
    pub fn filter_unread(&self, ids: &[MessageId]) -> Vec<MessageId> {
        ids.iter().copied().filter(|id| self.is_unread(*id)).collect()
    }

    /// The ids from `ids` that are currently read, in input order
    pub fn filter_read(&self, ids: &[MessageId]) -> Vec<MessageId> {
        ids.iter().copied().filter(|id| !self.is_unread(*id)).collect()
    }

    /// The messages from `messages` whose ids are currently unread
    pub fn filter_unread_messages(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .filter(|m| self.is_unread(m.id))
            .cloned()
            .collect()
    }

    /// Forget every unread id
    ///
    /// Used for the bulk mark-everything-read action, which reloads the
    /// client instead of patching views.
    pub fn bankruptcy(&mut self) {
        debug!(dropped = self.index.len(), "Declaring unread bankruptcy");
        self.conversations.clear();
        self.index.clear();
        self.mentions.clear();
    }

    /// Number of unread ids in a conversation
    pub fn count_for_conversation(&self, key: &ConversationKey) -> usize {
        self.conversations.get(key).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Unread ids in a conversation, ascending
    pub fn ids_for_conversation(&self, key: &ConversationKey) -> Vec<MessageId> {
        self.conversations
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Unread ids across every topic of a stream, ascending
    pub fn ids_for_stream(&self, stream_id: StreamId) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self
            .conversations
            .iter()
            .filter(|(key, _)| key.stream_id() == Some(stream_id))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Conversation an unread id belongs to
    pub fn conversation_of(&self, id: MessageId) -> Option<&ConversationKey> {
        self.index.get(&id)
    }

    /// Total unread ids
    pub fn total(&self) -> usize {
        self.index.len()
    }

    /// Unread ids that mention the current user
    pub fn mentioned_count(&self) -> usize {
        self.mentions.len()
    }

    /// Compute aggregate counts for the counter surfaces
    pub fn counts(&self) -> UnreadCounts {
        let mut counts = UnreadCounts {
            total: self.index.len(),
            mentioned_count: self.mentions.len(),
            ..UnreadCounts::default()
        };

        for (key, ids) in &self.conversations {
            match key {
                ConversationKey::Stream { stream_id, .. } => {
                    *counts.stream_counts.entry(*stream_id).or_insert(0) += ids.len();
                }
                ConversationKey::Private { participants } => {
                    counts.private_message_count += ids.len();
                    *counts.private_counts.entry(participants.clone()).or_insert(0) += ids.len();
                }
            }
        }

        counts
    }
}
