//! Logging implementations of the client's UI surfaces

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use indras_unread::{
    ConversationKey, Message, ReadOptions, ReloadOptions, Reloader, UnreadCounts, UnreadSurfaces,
    ViewId,
};

/// How often each surface was touched during a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceStats {
    pub repaints: usize,
    pub notifications_closed: usize,
    pub counter_updates: usize,
    pub count_refreshes: usize,
    pub rerenders: usize,
    pub banners: usize,
}

/// Surfaces that log every effect and keep tallies
#[derive(Debug, Default)]
pub struct TracingSurfaces {
    pub stats: SurfaceStats,
    last_counts: Option<UnreadCounts>,
}

impl TracingSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts from the most recent aggregate refresh
    pub fn last_counts(&self) -> Option<&UnreadCounts> {
        self.last_counts.as_ref()
    }
}

impl UnreadSurfaces for TracingSurfaces {
    fn show_message_as_read(&mut self, view: ViewId, message: &Message, options: &ReadOptions) {
        self.stats.repaints += 1;
        debug!(%view, message_id = %message.id, origin = %options.origin, "Repaint as read");
    }

    fn close_notification(&mut self, message: &Message) {
        self.stats.notifications_closed += 1;
        debug!(message_id = %message.id, "Close notification");
    }

    fn update_conversation_counter(&mut self, conversation: &ConversationKey, count: usize) {
        self.stats.counter_updates += 1;
        debug!(%conversation, count, "Conversation counter");
    }

    fn refresh_unread_counts(&mut self, counts: &UnreadCounts) {
        self.stats.count_refreshes += 1;
        debug!(
            total = counts.total,
            private = counts.private_message_count,
            mentioned = counts.mentioned_count,
            "Unread counts"
        );
        self.last_counts = Some(counts.clone());
    }

    fn rerender_views(&mut self) {
        self.stats.rerenders += 1;
        debug!("Rerender views");
    }

    fn notify_messages_remain_unread(&mut self, view: ViewId) {
        self.stats.banners += 1;
        info!(%view, "Messages remain unread");
    }
}

/// Reloader that only counts reload requests
#[derive(Debug, Default)]
pub struct SimReloader {
    reloads: AtomicUsize,
}

impl SimReloader {
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Reloader for SimReloader {
    fn request_reload(&self, options: ReloadOptions) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        info!(
            immediate = options.immediate,
            save_pointer = options.save_pointer,
            save_narrow = options.save_narrow,
            "Client reload requested"
        );
    }
}
