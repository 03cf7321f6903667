//! # Indras Unread
//!
//! Read-state tracking for Indras chat clients.
//!
//! Keeps track of which messages the user has read, keeps every open view
//! of the message history consistent with that, and reconciles local
//! read/unread actions with the server's (possibly late, repeated, or
//! foreign) flag events.
//!
//! ## Components
//!
//! - [`UnreadStore`]: the set of unread ids, indexed by conversation
//! - [`ViewRegistry`]: every rendered view plus the active-view pointer
//! - [`ReadStateEngine`]: turns triggers into store mutations and side effects
//! - [`OutboundNotifier`]: best-effort, batched requests to the server
//!
//! ## Example
//!
//! ```rust,ignore
//! use indras_unread::*;
//!
//! let (notifier, queue) = OutboundNotifier::channel();
//! OutboundDispatcher::new(queue, Arc::new(transport)).spawn();
//!
//! let mut engine = ReadStateEngine::new(
//!     EngineConfig::for_user(UserId(7)),
//!     InMemoryMessageCache::new(),
//!     my_surfaces,
//!     notifier,
//! )
//! .with_snapshot(snapshot);
//!
//! engine.register_view(MessageList::new(ViewId(1), ViewKind::Home));
//! engine.set_active_view(ViewId(1))?;
//!
//! // User scrolled to the bottom
//! engine.process_visible(&Viewport::at_bottom());
//!
//! // Server pushed a flag change
//! engine.handle_event(serde_json::from_str(payload)?);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod notifier;
pub mod store;
pub mod surface;
pub mod view;

// Re-exports
pub use cache::{InMemoryMessageCache, MessageCache};
pub use config::EngineConfig;
pub use engine::{
    EventOutcome, ReadOutcome, ReadStateEngine, ScrollOutcome, UnreadOutcome, Viewport,
};
pub use error::{TransportError, UnreadError, UnreadResult};
pub use event::{FlagEvent, FlagOp, MessageDetails, MessageType};
pub use message::{
    ConversationKey, Message, MessageId, ParticipantKey, ReadOptions, ReadOrigin, StreamId,
    UnreadEntry, UserId,
};
pub use notifier::{
    Continuation, DispatchStats, OutboundCall, OutboundDispatcher, OutboundNotifier, OutboundQueue,
    ServerRequest, ServerTransport,
};
pub use store::{PrivateUnread, StreamUnread, UnreadCounts, UnreadSnapshot, UnreadStore};
pub use surface::{NoopSurfaces, ReloadOptions, Reloader, UnreadSurfaces};
pub use view::{MessageList, ViewId, ViewKind, ViewRegistry};
