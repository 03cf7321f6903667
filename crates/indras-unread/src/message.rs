//! Message identities and conversation descriptors

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Server-assigned message identifier
///
/// Ids grow roughly monotonically within a conversation, which is what
/// lets views answer "everything from this id onward".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical key for a direct-message conversation
///
/// Sorted, deduplicated participant ids joined with commas, e.g. `"4,7,12"`.
/// The current user is left out unless they are talking to themselves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantKey(String);

impl ParticipantKey {
    /// Build the key from a participant list
    pub fn from_user_ids(user_ids: &[UserId], current_user: Option<UserId>) -> Self {
        let mut ids: Vec<UserId> = user_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        if let Some(me) = current_user
            && ids.len() > 1
        {
            ids.retain(|id| *id != me);
        }

        let joined = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self(joined)
    }

    /// Wrap an already-canonical key string
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Groups messages into conversations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationKey {
    /// Channel message: stream plus topic
    Stream { stream_id: StreamId, topic: String },
    /// Direct message between a participant set
    Private { participants: ParticipantKey },
}

impl ConversationKey {
    pub fn stream(stream_id: StreamId, topic: impl Into<String>) -> Self {
        Self::Stream {
            stream_id,
            topic: topic.into(),
        }
    }

    pub fn private(participants: ParticipantKey) -> Self {
        Self::Private { participants }
    }

    /// Check if this is a channel conversation
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    /// Stream id for channel conversations
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::Stream { stream_id, .. } => Some(*stream_id),
            Self::Private { .. } => None,
        }
    }
}

impl Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream { stream_id, topic } => write!(f, "stream:{}/{}", stream_id, topic),
            Self::Private { participants } => write!(f, "pm:{}", participants),
        }
    }
}

/// A cached message as seen by the read-state core
///
/// Only `unread` is ever written here; everything else belongs to the
/// message cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub unread: bool,
    pub conversation: ConversationKey,
    /// Whether the current user was mentioned
    #[serde(default)]
    pub mentioned: bool,
}

impl Message {
    /// Create an unread message
    pub fn unread(id: impl Into<MessageId>, conversation: ConversationKey) -> Self {
        Self {
            id: id.into(),
            unread: true,
            conversation,
            mentioned: false,
        }
    }

    /// Create an already-read message
    pub fn read(id: impl Into<MessageId>, conversation: ConversationKey) -> Self {
        Self {
            unread: false,
            ..Self::unread(id, conversation)
        }
    }

    /// Mark this message as mentioning the current user
    pub fn with_mention(mut self) -> Self {
        self.mentioned = true;
        self
    }

    /// The store entry describing this message
    pub fn entry(&self) -> UnreadEntry {
        UnreadEntry {
            id: self.id,
            conversation: self.conversation.clone(),
            mentioned: self.mentioned,
        }
    }
}

/// Partial message descriptor accepted by the unread store
///
/// Server unread events only carry enough to place the id in its
/// conversation, not a full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadEntry {
    pub id: MessageId,
    pub conversation: ConversationKey,
    pub mentioned: bool,
}

/// Where a read transition came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOrigin {
    /// Explicit user action
    #[default]
    Local,
    /// Reported by the server
    Server,
    /// User scrolled to the bottom of a view
    Scroll,
}

impl Display for ReadOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Server => write!(f, "server"),
            Self::Scroll => write!(f, "scroll"),
        }
    }
}

/// Options forwarded unchanged to the per-message side effects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadOptions {
    pub origin: ReadOrigin,
    /// Leave the narrow-scoped read flag untouched for this transition
    pub skip_narrow_flag: bool,
}

impl ReadOptions {
    pub fn from_server() -> Self {
        Self {
            origin: ReadOrigin::Server,
            ..Self::default()
        }
    }

    pub fn from_scroll() -> Self {
        Self {
            origin: ReadOrigin::Scroll,
            ..Self::default()
        }
    }

    pub fn skip_narrow_flag(mut self) -> Self {
        self.skip_narrow_flag = true;
        self
    }
}
