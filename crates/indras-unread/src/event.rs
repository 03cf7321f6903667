//! Decoded server events that change read state

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::{ConversationKey, MessageId, ParticipantKey, StreamId, UnreadEntry, UserId};

/// Kind of conversation named in an unread event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Stream,
    Private,
}

/// What the server tells us about a message it just marked unread
///
/// The event may reference messages this client never fetched, so this is
/// all we can count on having.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetails {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, alias = "participant_ids", skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(default)]
    pub mentioned: bool,
}

impl MessageDetails {
    pub fn stream(stream_id: StreamId, topic: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Stream,
            stream_id: Some(stream_id),
            topic: Some(topic.into()),
            user_ids: None,
            mentioned: false,
        }
    }

    pub fn private(user_ids: Vec<UserId>) -> Self {
        Self {
            kind: MessageType::Private,
            stream_id: None,
            topic: None,
            user_ids: Some(user_ids),
            mentioned: false,
        }
    }

    /// Rebuild the conversation descriptor
    ///
    /// Returns `None` when the payload lacks the fields its type needs.
    pub fn conversation(&self, current_user: Option<UserId>) -> Option<ConversationKey> {
        match self.kind {
            MessageType::Stream => {
                let stream_id = self.stream_id?;
                let topic = self.topic.clone()?;
                Some(ConversationKey::stream(stream_id, topic))
            }
            MessageType::Private => {
                let user_ids = self.user_ids.as_deref()?;
                Some(ConversationKey::private(ParticipantKey::from_user_ids(
                    user_ids,
                    current_user,
                )))
            }
        }
    }

    /// Partial store entry for `id`
    pub fn entry(&self, id: MessageId, current_user: Option<UserId>) -> Option<UnreadEntry> {
        self.conversation(current_user).map(|conversation| UnreadEntry {
            id,
            conversation,
            mentioned: self.mentioned,
        })
    }
}

/// Operation carried by a flag-update event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagOp {
    /// Read flag added
    Add,
    /// Read flag removed
    Remove,
}

/// Flag-update event as it arrives on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFlagEvent {
    op: FlagOp,
    message_ids: Vec<MessageId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    message_details: BTreeMap<MessageId, MessageDetails>,
}

/// A read-flag change pushed by the server
///
/// Decodes from the server's flag-update event: `add` sets the read flag,
/// `remove` clears it and carries per-message details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFlagEvent", into = "RawFlagEvent")]
pub enum FlagEvent {
    /// Messages became read, possibly on another device
    Read { message_ids: Vec<MessageId> },

    /// Messages became unread
    Unread {
        message_ids: Vec<MessageId>,
        message_details: BTreeMap<MessageId, MessageDetails>,
    },
}

impl FlagEvent {
    pub fn message_ids(&self) -> &[MessageId] {
        match self {
            Self::Read { message_ids } | Self::Unread { message_ids, .. } => message_ids,
        }
    }
}

impl From<RawFlagEvent> for FlagEvent {
    fn from(raw: RawFlagEvent) -> Self {
        match raw.op {
            FlagOp::Add => Self::Read {
                message_ids: raw.message_ids,
            },
            FlagOp::Remove => Self::Unread {
                message_ids: raw.message_ids,
                message_details: raw.message_details,
            },
        }
    }
}

impl From<FlagEvent> for RawFlagEvent {
    fn from(event: FlagEvent) -> Self {
        match event {
            FlagEvent::Read { message_ids } => Self {
                op: FlagOp::Add,
                message_ids,
                message_details: BTreeMap::new(),
            },
            FlagEvent::Unread {
                message_ids,
                message_details,
            } => Self {
                op: FlagOp::Remove,
                message_ids,
                message_details,
            },
        }
    }
}
