//! Rendered message views and the registry that tracks them
//!
//! A view is a projection of some subset of the message history (a
//! "narrow"). Views never own read state; they mirror the unread store and
//! are told to repaint when it changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{UnreadError, UnreadResult};
use crate::message::MessageId;
use crate::store::UnreadStore;

/// Identifier of a registered view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub u32);

impl Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Whether a view is the primary feed or a filtered projection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// The primary, unfiltered feed
    #[default]
    Home,
    /// A filtered or search view
    Narrowed,
}

/// A rendered list of messages
#[derive(Debug, Clone)]
pub struct MessageList {
    id: ViewId,
    kind: ViewKind,
    members: BTreeSet<MessageId>,
    /// Backing data is a contiguous slice of history
    complete: bool,
    /// The view's filter lets scrolling to the bottom mark messages read
    auto_mark_read: bool,
    /// Scroll-to-bottom reading suspended by the user
    reading_prevented: bool,
}

impl MessageList {
    /// Create an empty view
    ///
    /// New views are complete and allow scroll-to-bottom reading.
    pub fn new(id: ViewId, kind: ViewKind) -> Self {
        Self {
            id,
            kind,
            members: BTreeSet::new(),
            complete: true,
            auto_mark_read: true,
            reading_prevented: false,
        }
    }

    pub fn with_members(mut self, ids: impl IntoIterator<Item = MessageId>) -> Self {
        self.members.extend(ids);
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn with_auto_mark_read(mut self, enabled: bool) -> Self {
        self.auto_mark_read = enabled;
        self
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn is_narrowed(&self) -> bool {
        self.kind == ViewKind::Narrowed
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member ids, ascending
    pub fn ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.members.iter().copied()
    }

    pub fn add_messages(&mut self, ids: impl IntoIterator<Item = MessageId>) {
        self.members.extend(ids);
    }

    pub fn remove_message(&mut self, id: MessageId) -> bool {
        self.members.remove(&id)
    }

    /// Member ids greater than or equal to `id`, ascending
    pub fn ids_greater_or_equal(&self, id: MessageId) -> Vec<MessageId> {
        self.members.range(id..).copied().collect()
    }

    /// Whether reaching the bottom of this view marks its messages read
    pub fn can_mark_messages_read(&self) -> bool {
        self.auto_mark_read && !self.reading_prevented
    }

    pub fn is_reading_prevented(&self) -> bool {
        self.reading_prevented
    }

    /// Stop treating scroll-to-bottom as read until [`resume_reading`](Self::resume_reading)
    pub fn prevent_reading(&mut self) {
        self.reading_prevented = true;
    }

    pub fn resume_reading(&mut self) {
        self.reading_prevented = false;
    }

    /// Whether any member is unread in the store
    pub fn has_unread_messages(&self, store: &UnreadStore) -> bool {
        self.members.iter().any(|id| store.is_unread(*id))
    }
}

/// All currently rendered views plus the active-view pointer
#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: BTreeMap<ViewId, MessageList>,
    active: Option<ViewId>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view, replacing any view with the same id
    ///
    /// Returns whether the active view was replaced.
    pub fn register_view(&mut self, view: MessageList) -> bool {
        debug!(view = %view.id(), kind = ?view.kind(), "Registering view");
        let id = view.id();
        let replaced = self.views.insert(id, view).is_some();
        replaced && self.active == Some(id)
    }

    /// Remove a view
    ///
    /// Returns whether the active view changed as a result.
    pub fn unregister_view(&mut self, id: ViewId) -> UnreadResult<bool> {
        self.views.remove(&id).ok_or(UnreadError::ViewNotFound(id))?;

        if self.active == Some(id) {
            self.active = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Make a registered view the active one
    ///
    /// Returns whether the active view changed.
    pub fn set_active_view(&mut self, id: ViewId) -> UnreadResult<bool> {
        if !self.views.contains_key(&id) {
            return Err(UnreadError::ViewNotFound(id));
        }

        let changed = self.active != Some(id);
        self.active = Some(id);
        Ok(changed)
    }

    pub fn active_id(&self) -> Option<ViewId> {
        self.active
    }

    pub fn active(&self) -> Option<&MessageList> {
        self.active.and_then(|id| self.views.get(&id))
    }

    pub fn active_mut(&mut self) -> Option<&mut MessageList> {
        self.active.and_then(|id| self.views.get_mut(&id))
    }

    /// Whether the active view is a filtered view
    pub fn active_is_narrowed(&self) -> bool {
        self.active().is_some_and(MessageList::is_narrowed)
    }

    pub fn get(&self, id: ViewId) -> Option<&MessageList> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut MessageList> {
        self.views.get_mut(&id)
    }

    /// All registered views, ordered by id
    pub fn views(&self) -> impl Iterator<Item = &MessageList> {
        self.views.values()
    }

    /// Views that render the given message
    pub fn views_containing(&self, id: MessageId) -> impl Iterator<Item = &MessageList> {
        self.views.values().filter(move |view| view.contains(id))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Member ids of a view from `from` onward
    pub fn ids_greater_or_equal(
        &self,
        view: ViewId,
        from: MessageId,
    ) -> UnreadResult<Vec<MessageId>> {
        self.views
            .get(&view)
            .map(|v| v.ids_greater_or_equal(from))
            .ok_or(UnreadError::ViewNotFound(view))
    }

    pub fn can_mark_messages_read(&self, view: ViewId) -> UnreadResult<bool> {
        self.views
            .get(&view)
            .map(MessageList::can_mark_messages_read)
            .ok_or(UnreadError::ViewNotFound(view))
    }

    pub fn has_unread(&self, view: ViewId, store: &UnreadStore) -> UnreadResult<bool> {
        self.views
            .get(&view)
            .map(|v| v.has_unread_messages(store))
            .ok_or(UnreadError::ViewNotFound(view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ConversationKey, StreamId, UnreadEntry};

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId).collect()
    }

    #[test]
    fn test_ids_greater_or_equal() {
        let view = MessageList::new(ViewId(1), ViewKind::Home).with_members(ids(&[1, 4, 9, 12]));

        assert_eq!(view.ids_greater_or_equal(MessageId(4)), ids(&[4, 9, 12]));
        assert_eq!(view.ids_greater_or_equal(MessageId(5)), ids(&[9, 12]));
        assert!(view.ids_greater_or_equal(MessageId(13)).is_empty());
    }

    #[test]
    fn test_prevent_and_resume_reading() {
        let mut view = MessageList::new(ViewId(1), ViewKind::Home);
        assert!(view.can_mark_messages_read());

        view.prevent_reading();
        assert!(!view.can_mark_messages_read());

        view.resume_reading();
        assert!(view.can_mark_messages_read());
    }

    #[test]
    fn test_search_view_never_auto_reads() {
        let view = MessageList::new(ViewId(2), ViewKind::Narrowed).with_auto_mark_read(false);
        assert!(!view.can_mark_messages_read());
    }

    #[test]
    fn test_set_active_view_reports_change() {
        let mut registry = ViewRegistry::new();
        registry.register_view(MessageList::new(ViewId(1), ViewKind::Home));
        registry.register_view(MessageList::new(ViewId(2), ViewKind::Narrowed));

        assert_eq!(registry.set_active_view(ViewId(1)), Ok(true));
        assert_eq!(registry.set_active_view(ViewId(1)), Ok(false));
        assert!(!registry.active_is_narrowed());

        assert_eq!(registry.set_active_view(ViewId(2)), Ok(true));
        assert!(registry.active_is_narrowed());

        assert_eq!(
            registry.set_active_view(ViewId(9)),
            Err(UnreadError::ViewNotFound(ViewId(9)))
        );
    }

    #[test]
    fn test_unregister_active_view_clears_pointer() {
        let mut registry = ViewRegistry::new();
        registry.register_view(MessageList::new(ViewId(1), ViewKind::Narrowed));
        registry.set_active_view(ViewId(1)).unwrap();

        assert_eq!(registry.unregister_view(ViewId(1)), Ok(true));
        assert!(registry.active().is_none());
        assert!(!registry.active_is_narrowed());
    }

    #[test]
    fn test_register_reports_active_replacement() {
        let mut registry = ViewRegistry::new();
        assert!(!registry.register_view(MessageList::new(ViewId(1), ViewKind::Narrowed)));
        assert!(!registry.register_view(MessageList::new(ViewId(2), ViewKind::Home)));
        registry.set_active_view(ViewId(1)).unwrap();

        assert!(!registry.register_view(MessageList::new(ViewId(2), ViewKind::Home)));
        assert!(registry.register_view(MessageList::new(ViewId(1), ViewKind::Home)));
        assert!(!registry.active_is_narrowed());
    }

    #[test]
    fn test_has_unread() {
        let mut store = UnreadStore::new();
        store.mark_unread(UnreadEntry {
            id: MessageId(4),
            conversation: ConversationKey::stream(StreamId(1), "a"),
            mentioned: false,
        });

        let mut registry = ViewRegistry::new();
        registry
            .register_view(MessageList::new(ViewId(1), ViewKind::Home).with_members(ids(&[3, 4])));
        registry.register_view(MessageList::new(ViewId(2), ViewKind::Home).with_members(ids(&[5])));

        assert_eq!(registry.has_unread(ViewId(1), &store), Ok(true));
        assert_eq!(registry.has_unread(ViewId(2), &store), Ok(false));
        assert_eq!(registry.views_containing(MessageId(4)).count(), 1);
    }
}
