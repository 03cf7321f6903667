//! Outward-facing side effects of read-state transitions
//!
//! Rendering, notification banners and counters live outside this crate.
//! The engine drives them through [`UnreadSurfaces`].

use serde::{Deserialize, Serialize};

use crate::message::{ConversationKey, Message, ReadOptions};
use crate::store::UnreadCounts;
use crate::view::ViewId;

/// UI surfaces that mirror the unread store
pub trait UnreadSurfaces {
    /// Repaint a message as read in one view
    fn show_message_as_read(&mut self, view: ViewId, message: &Message, options: &ReadOptions);

    /// Close any desktop notification still showing for the message
    fn close_notification(&mut self, message: &Message);

    /// A conversation's unread count changed
    fn update_conversation_counter(&mut self, conversation: &ConversationKey, count: usize);

    /// Refresh every aggregate counter at once
    fn refresh_unread_counts(&mut self, counts: &UnreadCounts);

    /// Re-render every view from scratch
    fn rerender_views(&mut self);

    /// Offer a manual "mark as read" banner for a view that cannot
    /// auto-read on scroll
    fn notify_messages_remain_unread(&mut self, view: ViewId);
}

/// Surfaces that ignore every effect
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSurfaces;

impl UnreadSurfaces for NoopSurfaces {
    fn show_message_as_read(&mut self, _view: ViewId, _message: &Message, _options: &ReadOptions) {}

    fn close_notification(&mut self, _message: &Message) {}

    fn update_conversation_counter(&mut self, _conversation: &ConversationKey, _count: usize) {}

    fn refresh_unread_counts(&mut self, _counts: &UnreadCounts) {}

    fn rerender_views(&mut self) {}

    fn notify_messages_remain_unread(&mut self, _view: ViewId) {}
}

/// How the client should reload after discarding local unread state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadOptions {
    pub immediate: bool,
    /// Keep the scroll pointer; off after bankruptcy so the user is not
    /// left deep in the past
    pub save_pointer: bool,
    pub save_narrow: bool,
    pub save_compose: bool,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            save_pointer: false,
            save_narrow: true,
            save_compose: true,
        }
    }
}

/// Full application reload, requested after bankruptcy
pub trait Reloader: Send + Sync {
    fn request_reload(&self, options: ReloadOptions);
}
