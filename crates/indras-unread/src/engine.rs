//! Read-state reconciliation engine
//!
//! Turns triggers into unread-store mutations plus side effects. Two sources
//! feed it: local user actions (scrolling to the bottom, explicit "mark as
//! read") and flag events pushed by the server, which may echo our own
//! changes, arrive late, repeat, or describe messages we never fetched.
//!
//! Every trigger is processed to completion before the next one. The store is
//! always mutated before the matching server request is queued, so a server
//! echo of a local change finds nothing left to do.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace, warn};

use crate::cache::MessageCache;
use crate::config::EngineConfig;
use crate::error::{UnreadError, UnreadResult};
use crate::event::{FlagEvent, MessageDetails};
use crate::message::{ConversationKey, Message, MessageId, ParticipantKey, ReadOptions, StreamId};
use crate::notifier::{OutboundNotifier, ServerRequest};
use crate::store::{UnreadCounts, UnreadSnapshot, UnreadStore};
use crate::surface::{Reloader, UnreadSurfaces};
use crate::view::{MessageList, ViewId, ViewRegistry};

/// Result of a read transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Ids that went from unread to read, in processing order
    pub newly_read: Vec<MessageId>,
    /// Newly read ids with no cached message, so nothing was repainted
    pub not_cached: Vec<MessageId>,
}

impl ReadOutcome {
    pub fn is_noop(&self) -> bool {
        self.newly_read.is_empty()
    }
}

/// Result of an unread transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadOutcome {
    /// Ids that went from read to unread, in processing order
    pub newly_unread: Vec<MessageId>,
    /// Ids the event named without any usable conversation descriptor
    pub missing_details: Vec<MessageId>,
}

impl UnreadOutcome {
    pub fn is_noop(&self) -> bool {
        self.newly_unread.is_empty()
    }
}

/// Result of handling a server flag event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Read(ReadOutcome),
    Unread(UnreadOutcome),
}

/// What a scroll-to-bottom trigger ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollOutcome {
    /// Nothing to act on: overlay visible, no active view, or viewport not
    /// at the bottom
    Ignored,
    /// The active view was marked read
    MarkedRead(ReadOutcome),
    /// The view cannot auto-read and still has unread messages
    BannerShown(ViewId),
    /// The view cannot auto-read but is already fully read
    NothingUnread,
}

/// Visibility state the UI reports alongside scroll triggers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub visible_and_focused: bool,
    pub bottom_message_visible: bool,
    /// The recent-conversations overlay hides the message views
    pub recent_conversations_visible: bool,
}

impl Viewport {
    /// A focused window scrolled to the bottom of the active view
    pub fn at_bottom() -> Self {
        Self {
            visible_and_focused: true,
            bottom_message_visible: true,
            recent_conversations_visible: false,
        }
    }
}

/// Keeps the unread store, views and server in agreement
pub struct ReadStateEngine<C: MessageCache, S: UnreadSurfaces> {
    config: EngineConfig,
    store: UnreadStore,
    views: ViewRegistry,
    cache: C,
    surfaces: S,
    notifier: OutboundNotifier,
    reloader: Option<Arc<dyn Reloader>>,
    /// Messages were marked read while the filtered view was active
    messages_read_in_narrow: bool,
}

impl<C: MessageCache, S: UnreadSurfaces> ReadStateEngine<C, S> {
    /// Create an engine with an empty store and no views
    pub fn new(config: EngineConfig, cache: C, surfaces: S, notifier: OutboundNotifier) -> Self {
        Self {
            config,
            store: UnreadStore::new(),
            views: ViewRegistry::new(),
            cache,
            surfaces,
            notifier,
            reloader: None,
            messages_read_in_narrow: false,
        }
    }

    /// Set the reloader used after bankruptcy
    pub fn with_reloader(mut self, reloader: Arc<dyn Reloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Populate the store from the startup snapshot
    pub fn with_snapshot(mut self, snapshot: UnreadSnapshot) -> Self {
        self.load_snapshot(snapshot);
        self
    }

    pub fn load_snapshot(&mut self, snapshot: UnreadSnapshot) {
        self.store.load_snapshot(snapshot);
        self.refresh_counts();
    }

    /// Cache freshly fetched messages and index the unread ones
    pub fn process_loaded_messages(&mut self, messages: Vec<Message>) {
        let added = self.store.process_loaded_messages(&messages);
        for message in messages {
            self.cache.insert(message);
        }
        if added > 0 {
            self.refresh_counts();
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &UnreadStore {
        &self.store
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut MessageList> {
        self.views.get_mut(id)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut S {
        &mut self.surfaces
    }

    pub fn unread_counts(&self) -> UnreadCounts {
        self.store.counts()
    }

    /// Whether messages were marked read since the filtered view became active
    pub fn messages_read_in_narrow(&self) -> bool {
        self.messages_read_in_narrow
    }

    // ------------------------------------------------------------------
    // View registry
    // ------------------------------------------------------------------

    /// Register a view; replacing the active view clears the narrow flag
    pub fn register_view(&mut self, view: MessageList) {
        if self.views.register_view(view) {
            self.messages_read_in_narrow = false;
        }
    }

    pub fn unregister_view(&mut self, id: ViewId) -> UnreadResult<()> {
        if self.views.unregister_view(id)? {
            self.messages_read_in_narrow = false;
        }
        Ok(())
    }

    /// Switch the active view
    ///
    /// The narrow-scoped read flag only describes the view that was active
    /// when it was set, so any switch clears it.
    pub fn set_active_view(&mut self, id: ViewId) -> UnreadResult<()> {
        if self.views.set_active_view(id)? {
            trace!(view = %id, "Active view changed");
            self.messages_read_in_narrow = false;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local read transitions
    // ------------------------------------------------------------------

    /// Mark messages read locally and tell the server
    ///
    /// Already-read messages are dropped. If nothing is left, nothing
    /// happens: no store change, no request, no repaint. Otherwise one
    /// batched request carries every newly read id.
    pub fn notify_server_messages_read(
        &mut self,
        messages: &[Message],
        options: ReadOptions,
    ) -> ReadOutcome {
        let _span = debug_span!("local_read", origin = %options.origin).entered();

        let candidates = self.store.filter_unread_messages(messages);
        if candidates.is_empty() {
            trace!(requested = messages.len(), "All messages already read");
            return ReadOutcome::default();
        }

        let mut outcome = ReadOutcome::default();
        for message in &candidates {
            if self.views.active_is_narrowed() && !options.skip_narrow_flag {
                self.messages_read_in_narrow = true;
            }

            // Duplicates in the input only transition once
            let Some(conversation) = self.store.conversation_of(message.id).cloned() else {
                continue;
            };
            self.store.mark_read(message.id);
            outcome.newly_read.push(message.id);
            self.process_newly_read_message(message, &conversation, &options);
        }

        self.notifier.send(ServerRequest::mark_read(outcome.newly_read.clone()));
        self.refresh_counts();

        debug!(count = outcome.newly_read.len(), "Marked messages read");
        outcome
    }

    /// Single-message form of [`notify_server_messages_read`](Self::notify_server_messages_read)
    pub fn notify_server_message_read(
        &mut self,
        message: &Message,
        options: ReadOptions,
    ) -> ReadOutcome {
        self.notify_server_messages_read(std::slice::from_ref(message), options)
    }

    /// Mark every cached member of the active view read
    pub fn mark_current_list_as_read(&mut self, options: ReadOptions) -> ReadOutcome {
        let Some(view) = self.views.active() else {
            return ReadOutcome::default();
        };

        let messages: Vec<Message> = view.ids().filter_map(|id| self.cache.get(id)).collect();
        self.notify_server_messages_read(&messages, options)
    }

    /// React to the user reaching the bottom of the active view
    pub fn process_scrolled_to_bottom(&mut self, viewport: &Viewport) -> ScrollOutcome {
        if viewport.recent_conversations_visible {
            return ScrollOutcome::Ignored;
        }

        let Some(view) = self.views.active() else {
            return ScrollOutcome::Ignored;
        };

        if view.can_mark_messages_read() {
            let outcome = self.mark_current_list_as_read(ReadOptions::from_scroll());
            return ScrollOutcome::MarkedRead(outcome);
        }

        // Views that cannot auto-read get a banner offering to mark
        // them read manually, but only if there is something to mark.
        if view.has_unread_messages(&self.store) {
            let id = view.id();
            self.surfaces.notify_messages_remain_unread(id);
            return ScrollOutcome::BannerShown(id);
        }

        ScrollOutcome::NothingUnread
    }

    /// Scroll trigger that first checks the window is visible and at the bottom
    pub fn process_visible(&mut self, viewport: &Viewport) -> ScrollOutcome {
        if viewport.visible_and_focused && viewport.bottom_message_visible {
            self.process_scrolled_to_bottom(viewport)
        } else {
            ScrollOutcome::Ignored
        }
    }

    // ------------------------------------------------------------------
    // Server events
    // ------------------------------------------------------------------

    /// Dispatch a decoded flag event
    pub fn handle_event(&mut self, event: FlagEvent) -> EventOutcome {
        match event {
            FlagEvent::Read { message_ids } => {
                EventOutcome::Read(self.process_read_messages_event(&message_ids))
            }
            FlagEvent::Unread {
                message_ids,
                message_details,
            } => EventOutcome::Unread(
                self.process_unread_messages_event(&message_ids, &message_details),
            ),
        }
    }

    /// Apply a server report that messages became read
    ///
    /// The server may name messages we already read locally (ignored) or
    /// never fetched (store updated, repaint skipped).
    pub fn process_read_messages_event(&mut self, message_ids: &[MessageId]) -> ReadOutcome {
        let _span = debug_span!("server_read", reported = message_ids.len()).entered();
        let options = ReadOptions::from_server();

        let ids = self.store.filter_unread(message_ids);
        if ids.is_empty() {
            trace!("Server read event already applied");
            return ReadOutcome::default();
        }

        let mut outcome = ReadOutcome::default();
        for id in ids {
            if self.views.active_is_narrowed() && self.config.narrow_flag_on_server_reads {
                self.messages_read_in_narrow = true;
            }

            let Some(conversation) = self.store.conversation_of(id).cloned() else {
                continue;
            };
            self.store.mark_read(id);
            outcome.newly_read.push(id);

            match self.cache.get(id) {
                Some(message) => self.process_newly_read_message(&message, &conversation, &options),
                None => outcome.not_cached.push(id),
            }
        }

        self.refresh_counts();

        debug!(
            count = outcome.newly_read.len(),
            not_cached = outcome.not_cached.len(),
            "Applied server read event"
        );
        outcome
    }

    /// Apply a server report that messages became unread
    ///
    /// The event carries only partial conversation details, so views are
    /// re-rendered wholesale instead of patched per message.
    pub fn process_unread_messages_event(
        &mut self,
        message_ids: &[MessageId],
        message_details: &BTreeMap<MessageId, MessageDetails>,
    ) -> UnreadOutcome {
        let _span = debug_span!("server_unread", reported = message_ids.len()).entered();

        let ids = self.store.filter_read(message_ids);
        if ids.is_empty() {
            trace!("Server unread event already applied");
            return UnreadOutcome::default();
        }

        if self.views.active_is_narrowed() {
            self.messages_read_in_narrow = false;
        }

        let mut outcome = UnreadOutcome::default();
        for id in ids {
            // Fall back to the cached message when the payload is short
            let entry = message_details
                .get(&id)
                .and_then(|details| details.entry(id, self.config.current_user))
                .or_else(|| self.cache.get(id).map(|message| message.entry()));

            let Some(entry) = entry else {
                warn!(message_id = %id, "Unread event without conversation details");
                outcome.missing_details.push(id);
                continue;
            };

            self.cache.set_unread(id, true);

            let conversation = entry.conversation.clone();
            if !self.store.mark_unread(entry) {
                continue;
            }
            outcome.newly_unread.push(id);

            if conversation.is_stream() {
                let count = self.store.count_for_conversation(&conversation);
                self.surfaces.update_conversation_counter(&conversation, count);
            }
        }

        self.surfaces.rerender_views();
        self.refresh_counts();

        debug!(
            count = outcome.newly_unread.len(),
            missing = outcome.missing_details.len(),
            "Applied server unread event"
        );
        outcome
    }

    // ------------------------------------------------------------------
    // Retroactive unread
    // ------------------------------------------------------------------

    /// Whether "mark as unread from here" can be offered for the active view
    pub fn can_mark_unread_from_here(&self) -> bool {
        self.views.active().is_some_and(MessageList::is_complete)
    }

    /// Ask the server to mark everything from `message_id` onward in the
    /// active view as unread
    ///
    /// Scroll-to-bottom reading is suspended on the view until
    /// [`resume_reading`](Self::resume_reading), otherwise the view would
    /// immediately read the messages again. The range is computed from the
    /// view's members, which is only correct when the view holds a
    /// contiguous slice of history; incomplete views are refused.
    pub fn mark_as_unread_from_here(
        &mut self,
        message_id: MessageId,
    ) -> UnreadResult<Vec<MessageId>> {
        let view = self.views.active_mut().ok_or(UnreadError::NoActiveView)?;

        if !view.is_complete() {
            warn!(view = %view.id(), "Refusing mark-unread-from-here on incomplete view");
            return Err(UnreadError::IncompleteView(view.id()));
        }

        let ids = view.ids_greater_or_equal(message_id);
        view.prevent_reading();

        if !ids.is_empty() {
            self.notifier.send(ServerRequest::mark_unread(ids.clone()));
        }

        debug!(from = %message_id, count = ids.len(), "Requested mark unread from here");
        Ok(ids)
    }

    /// Re-enable scroll-to-bottom reading on the active view
    pub fn resume_reading(&mut self) -> UnreadResult<()> {
        let view = self.views.active_mut().ok_or(UnreadError::NoActiveView)?;
        view.resume_reading();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bulk and conversation-level requests
    // ------------------------------------------------------------------

    /// Declare bankruptcy: forget all unread state and reload once the
    /// server confirms
    pub fn mark_all_as_read(&mut self) {
        self.store.bankruptcy();
        self.refresh_counts();

        let reloader = self.reloader.clone();
        let options = self.config.reload_after_bankruptcy;
        self.notifier.send_with(ServerRequest::MarkAllRead, move || match reloader {
            Some(reloader) => reloader.request_reload(options),
            None => debug!("No reloader configured after bankruptcy"),
        });
    }

    /// Ask the server to mark a whole stream read
    ///
    /// The store is left alone; the server's read event reports the change.
    pub fn mark_stream_as_read(
        &self,
        stream_id: StreamId,
        on_success: impl FnOnce() + Send + 'static,
    ) {
        self.notifier.send_with(ServerRequest::MarkStreamRead { stream_id }, on_success);
    }

    /// Ask the server to mark a topic read
    pub fn mark_topic_as_read(
        &self,
        stream_id: StreamId,
        topic: impl Into<String>,
        on_success: impl FnOnce() + Send + 'static,
    ) {
        self.notifier.send_with(
            ServerRequest::MarkTopicRead {
                stream_id,
                topic: topic.into(),
            },
            on_success,
        );
    }

    /// Ask the server to mark a direct-message conversation read
    ///
    /// Sends the conversation's currently unread ids. Returns false, and
    /// sends nothing, when there are none.
    pub fn mark_pm_as_read(
        &self,
        participants: &ParticipantKey,
        on_success: impl FnOnce() + Send + 'static,
    ) -> bool {
        let conversation = ConversationKey::private(participants.clone());
        let ids = self.store.ids_for_conversation(&conversation);
        if ids.is_empty() {
            return false;
        }

        self.notifier.send_with(ServerRequest::mark_read(ids), on_success);
        true
    }

    // ------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------

    /// Per-message effects of a read transition
    ///
    /// `conversation` is the key the store held the id under, which wins over
    /// a stale descriptor on the cached message.
    fn process_newly_read_message(
        &mut self,
        message: &Message,
        conversation: &ConversationKey,
        options: &ReadOptions,
    ) {
        self.cache.set_unread(message.id, false);

        let read = Message {
            unread: false,
            ..message.clone()
        };

        for view in self.views.views_containing(read.id) {
            self.surfaces.show_message_as_read(view.id(), &read, options);
        }
        self.surfaces.close_notification(&read);

        let count = self.store.count_for_conversation(conversation);
        self.surfaces.update_conversation_counter(conversation, count);
    }

    fn refresh_counts(&mut self) {
        let counts = self.store.counts();
        self.surfaces.refresh_unread_counts(&counts);
    }
}
