//! End-to-end reconciliation tests for indras-unread
//!
//! Drive the engine through local triggers and server events and check the
//! store, the queued server requests and the side effects that fired.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indras_unread::{
    ConversationKey, EngineConfig, EventOutcome, FlagEvent, InMemoryMessageCache, Message,
    MessageCache, MessageDetails, MessageId, MessageList, OutboundDispatcher, OutboundNotifier,
    OutboundQueue, ParticipantKey, ReadOptions, ReadStateEngine, ReloadOptions, Reloader,
    ScrollOutcome, ServerRequest, ServerTransport, StreamId, TransportError, UnreadCounts,
    UnreadError, UnreadSurfaces, UserId, ViewId, ViewKind, Viewport,
};

const HOME: ViewId = ViewId(1);
const NARROW: ViewId = ViewId(2);

/// Side effects observed by the UI surfaces
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    Repaint(ViewId, MessageId),
    CloseNotification(MessageId),
    Counter(ConversationKey, usize),
    Refresh(usize),
    Rerender,
    Banner(ViewId),
}

#[derive(Debug, Default)]
struct RecordingSurfaces {
    effects: Vec<Effect>,
}

impl RecordingSurfaces {
    fn take(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }
}

impl UnreadSurfaces for RecordingSurfaces {
    fn show_message_as_read(&mut self, view: ViewId, message: &Message, _options: &ReadOptions) {
        assert!(!message.unread, "repainted message must be read");
        self.effects.push(Effect::Repaint(view, message.id));
    }

    fn close_notification(&mut self, message: &Message) {
        self.effects.push(Effect::CloseNotification(message.id));
    }

    fn update_conversation_counter(&mut self, conversation: &ConversationKey, count: usize) {
        self.effects.push(Effect::Counter(conversation.clone(), count));
    }

    fn refresh_unread_counts(&mut self, counts: &UnreadCounts) {
        self.effects.push(Effect::Refresh(counts.total));
    }

    fn rerender_views(&mut self) {
        self.effects.push(Effect::Rerender);
    }

    fn notify_messages_remain_unread(&mut self, view: ViewId) {
        self.effects.push(Effect::Banner(view));
    }
}

type Engine = ReadStateEngine<InMemoryMessageCache, RecordingSurfaces>;

fn conversation_c() -> ConversationKey {
    ConversationKey::stream(StreamId(10), "x")
}

fn ids(raw: &[u64]) -> Vec<MessageId> {
    raw.iter().copied().map(MessageId).collect()
}

/// Engine with `unread` cached as unread messages in conversation C, all
/// rendered in an active home view
fn setup(unread: &[u64]) -> (Engine, OutboundQueue) {
    let (notifier, queue) = OutboundNotifier::channel();
    let mut engine = ReadStateEngine::new(
        EngineConfig::for_user(UserId(100)),
        InMemoryMessageCache::new(),
        RecordingSurfaces::default(),
        notifier,
    );

    let messages: Vec<Message> = unread
        .iter()
        .map(|id| Message::unread(*id, conversation_c()))
        .collect();
    engine.process_loaded_messages(messages);

    engine.register_view(MessageList::new(HOME, ViewKind::Home).with_members(ids(unread)));
    engine.set_active_view(HOME).unwrap();
    engine.surfaces_mut().take();

    (engine, queue)
}

fn messages(engine: &Engine, raw: &[u64]) -> Vec<Message> {
    raw.iter()
        .map(|id| engine.cache().get(MessageId(*id)).unwrap())
        .collect()
}

fn requests(queue: &mut OutboundQueue) -> Vec<ServerRequest> {
    queue.try_drain().into_iter().map(|call| call.request).collect()
}

fn repaints(effects: &[Effect]) -> Vec<MessageId> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Repaint(_, id) => Some(*id),
            _ => None,
        })
        .collect()
}

#[test]
fn test_local_read_marks_subset() {
    let (mut engine, mut queue) = setup(&[1, 2, 3]);
    let batch = messages(&engine, &[1, 2]);

    let outcome = engine.notify_server_messages_read(&batch, ReadOptions::default());

    assert_eq!(outcome.newly_read, ids(&[1, 2]));
    assert_eq!(engine.store().ids_for_conversation(&conversation_c()), ids(&[3]));
    assert_eq!(requests(&mut queue), vec![ServerRequest::mark_read(ids(&[1, 2]))]);

    let effects = engine.surfaces_mut().take();
    assert_eq!(repaints(&effects), ids(&[1, 2]));
    assert_eq!(effects.iter().filter(|e| matches!(e, Effect::Refresh(_))).count(), 1);
    assert_eq!(effects.last(), Some(&Effect::Refresh(1)));
    assert!(effects.contains(&Effect::Counter(conversation_c(), 1)));
    assert!(!engine.cache().get(MessageId(1)).unwrap().unread);
}

#[test]
fn test_local_read_is_idempotent() {
    let (mut engine, mut queue) = setup(&[1, 2, 3]);
    let batch = messages(&engine, &[1, 2]);

    engine.notify_server_messages_read(&batch, ReadOptions::default());
    engine.surfaces_mut().take();
    requests(&mut queue);

    let second = engine.notify_server_messages_read(&batch, ReadOptions::default());

    assert!(second.is_noop());
    assert!(requests(&mut queue).is_empty());
    assert!(engine.surfaces_mut().take().is_empty());
    assert_eq!(engine.store().total(), 1);
}

#[test]
fn test_server_read_skips_uncached_repaint() {
    let (mut engine, _queue) = setup(&[2]);
    // Message 3 is unread on the server but was never fetched here
    engine.load_snapshot(indras_unread::UnreadSnapshot {
        streams: vec![indras_unread::StreamUnread {
            stream_id: StreamId(10),
            topic: "x".into(),
            unread_message_ids: ids(&[3]),
        }],
        ..Default::default()
    });
    engine.surfaces_mut().take();

    let outcome = engine.process_read_messages_event(&ids(&[2, 3]));

    assert_eq!(outcome.newly_read, ids(&[2, 3]));
    assert_eq!(outcome.not_cached, ids(&[3]));
    assert_eq!(engine.store().count_for_conversation(&conversation_c()), 0);

    let effects = engine.surfaces_mut().take();
    assert_eq!(repaints(&effects), ids(&[2]));
    assert!(!effects.contains(&Effect::CloseNotification(MessageId(3))));
    assert_eq!(effects.last(), Some(&Effect::Refresh(0)));
}

#[test]
fn test_server_echo_of_local_read_is_absorbed() {
    let (mut engine, mut queue) = setup(&[1, 2]);
    let batch = messages(&engine, &[1, 2]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());
    engine.surfaces_mut().take();
    requests(&mut queue);

    let echo = engine.handle_event(FlagEvent::Read {
        message_ids: ids(&[1, 2]),
    });

    assert_eq!(echo, EventOutcome::Read(Default::default()));
    assert!(engine.surfaces_mut().take().is_empty());
    assert!(requests(&mut queue).is_empty());
}

#[test]
fn test_server_unread_restores_cached_message() {
    let (mut engine, mut queue) = setup(&[]);
    engine.process_loaded_messages(vec![Message::read(5, conversation_c())]);
    engine.surfaces_mut().take();

    let details = BTreeMap::from([(MessageId(5), MessageDetails::stream(StreamId(10), "x"))]);
    let outcome = engine.process_unread_messages_event(&ids(&[5]), &details);

    assert_eq!(outcome.newly_unread, ids(&[5]));
    assert!(engine.cache().get(MessageId(5)).unwrap().unread);
    assert_eq!(engine.store().ids_for_conversation(&conversation_c()), ids(&[5]));

    let effects = engine.surfaces_mut().take();
    assert_eq!(
        effects,
        vec![
            Effect::Counter(conversation_c(), 1),
            Effect::Rerender,
            Effect::Refresh(1),
        ]
    );
    assert!(requests(&mut queue).is_empty());
}

#[test]
fn test_server_unread_private_conversation() {
    let (mut engine, _queue) = setup(&[]);

    let event: FlagEvent = serde_json::from_str(
        r#"{"op":"remove","message_ids":[8],
            "message_details":{"8":{"type":"private","user_ids":[100,42],"mentioned":true}}}"#,
    )
    .unwrap();
    engine.handle_event(event);

    let key = ConversationKey::private(ParticipantKey::from_canonical("42"));
    assert_eq!(engine.store().count_for_conversation(&key), 1);
    assert!(engine.store().is_mentioned(MessageId(8)));

    // Direct messages get no per-conversation counter update
    let effects = engine.surfaces_mut().take();
    assert_eq!(effects, vec![Effect::Rerender, Effect::Refresh(1)]);
}

#[test]
fn test_server_unread_without_details_is_skipped() {
    let (mut engine, _queue) = setup(&[]);

    let outcome = engine.process_unread_messages_event(&ids(&[9]), &BTreeMap::new());

    assert!(outcome.newly_unread.is_empty());
    assert_eq!(outcome.missing_details, ids(&[9]));
    assert_eq!(engine.store().total(), 0);
}

#[test]
fn test_server_unread_already_unread_is_noop() {
    let (mut engine, _queue) = setup(&[5]);

    let details = BTreeMap::from([(MessageId(5), MessageDetails::stream(StreamId(10), "x"))]);
    let outcome = engine.process_unread_messages_event(&ids(&[5]), &details);

    assert!(outcome.is_noop());
    assert!(engine.surfaces_mut().take().is_empty());
}

#[test]
fn test_mark_unread_from_here_refused_on_incomplete_view() {
    let (mut engine, mut queue) = setup(&[1, 2, 3]);
    engine.view_mut(HOME).unwrap().set_complete(false);

    assert!(!engine.can_mark_unread_from_here());
    let result = engine.mark_as_unread_from_here(MessageId(2));

    assert_eq!(result, Err(UnreadError::IncompleteView(HOME)));
    assert_eq!(engine.store().total(), 3);
    assert!(requests(&mut queue).is_empty());
    assert!(!engine.views().get(HOME).unwrap().is_reading_prevented());
}

#[test]
fn test_mark_unread_from_here_suspends_reading() {
    let (mut engine, mut queue) = setup(&[]);
    let read: Vec<Message> = (1..=5).map(|id| Message::read(id, conversation_c())).collect();
    engine.process_loaded_messages(read);
    engine.view_mut(HOME).unwrap().add_messages(ids(&[1, 2, 3, 4, 5]));

    let range = engine.mark_as_unread_from_here(MessageId(3)).unwrap();

    assert_eq!(range, ids(&[3, 4, 5]));
    assert_eq!(requests(&mut queue), vec![ServerRequest::mark_unread(ids(&[3, 4, 5]))]);

    // The server confirms; reaching the bottom must not read them again
    let details: BTreeMap<_, _> = range
        .iter()
        .map(|id| (*id, MessageDetails::stream(StreamId(10), "x")))
        .collect();
    engine.process_unread_messages_event(&range, &details);
    engine.surfaces_mut().take();

    let scrolled = engine.process_visible(&Viewport::at_bottom());
    assert_eq!(scrolled, ScrollOutcome::BannerShown(HOME));
    assert_eq!(engine.store().total(), 3);

    engine.resume_reading().unwrap();
    let scrolled = engine.process_visible(&Viewport::at_bottom());
    let ScrollOutcome::MarkedRead(outcome) = scrolled else {
        panic!("expected the view to be marked read, got {scrolled:?}");
    };
    assert_eq!(outcome.newly_read, ids(&[3, 4, 5]));
    assert_eq!(engine.store().total(), 0);
}

#[test]
fn test_mark_unread_from_here_needs_active_view() {
    let (notifier, _queue) = OutboundNotifier::channel();
    let mut engine = ReadStateEngine::new(
        EngineConfig::default(),
        InMemoryMessageCache::new(),
        RecordingSurfaces::default(),
        notifier,
    );

    assert_eq!(engine.mark_as_unread_from_here(MessageId(1)), Err(UnreadError::NoActiveView));
}

#[test]
fn test_narrow_flag_scoping() {
    let (mut engine, _queue) = setup(&[1, 2, 3]);
    engine
        .register_view(MessageList::new(NARROW, ViewKind::Narrowed).with_members(ids(&[1, 2, 3])));

    // Reads in the home view never set the flag
    let first = messages(&engine, &[1]);
    engine.notify_server_messages_read(&first, ReadOptions::default());
    assert!(!engine.messages_read_in_narrow());

    engine.set_active_view(NARROW).unwrap();
    assert!(!engine.messages_read_in_narrow());

    let second = messages(&engine, &[2]);
    engine.notify_server_messages_read(&second, ReadOptions::default());
    assert!(engine.messages_read_in_narrow());

    // Re-selecting the same view is not a switch
    engine.set_active_view(NARROW).unwrap();
    assert!(engine.messages_read_in_narrow());

    // Away and back without a new read leaves it cleared
    engine.set_active_view(HOME).unwrap();
    assert!(!engine.messages_read_in_narrow());
    engine.set_active_view(NARROW).unwrap();
    assert!(!engine.messages_read_in_narrow());

    // Server reads set it, server unreads clear it
    engine.process_read_messages_event(&ids(&[3]));
    assert!(engine.messages_read_in_narrow());

    let details = BTreeMap::from([(MessageId(3), MessageDetails::stream(StreamId(10), "x"))]);
    engine.process_unread_messages_event(&ids(&[3]), &details);
    assert!(!engine.messages_read_in_narrow());
}

#[test]
fn test_narrow_flag_cleared_when_active_view_unregistered() {
    let (mut engine, _queue) = setup(&[1]);
    engine.register_view(MessageList::new(NARROW, ViewKind::Narrowed).with_members(ids(&[1])));
    engine.set_active_view(NARROW).unwrap();

    let batch = messages(&engine, &[1]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());
    assert!(engine.messages_read_in_narrow());

    engine.unregister_view(NARROW).unwrap();
    assert!(!engine.messages_read_in_narrow());
}

#[test]
fn test_narrow_flag_cleared_when_active_view_replaced() {
    let (mut engine, _queue) = setup(&[1, 2]);
    engine.register_view(MessageList::new(NARROW, ViewKind::Narrowed).with_members(ids(&[1, 2])));
    engine.set_active_view(NARROW).unwrap();

    let batch = messages(&engine, &[1]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());
    assert!(engine.messages_read_in_narrow());

    // Same id, no longer a filtered view
    engine.register_view(MessageList::new(NARROW, ViewKind::Home).with_members(ids(&[1, 2])));
    assert!(!engine.views().active_is_narrowed());
    assert!(!engine.messages_read_in_narrow());
}

#[test]
fn test_registering_inactive_view_keeps_narrow_flag() {
    let (mut engine, _queue) = setup(&[1]);
    engine.register_view(MessageList::new(NARROW, ViewKind::Narrowed).with_members(ids(&[1])));
    engine.set_active_view(NARROW).unwrap();

    let batch = messages(&engine, &[1]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());

    engine.register_view(MessageList::new(HOME, ViewKind::Home));
    assert!(engine.messages_read_in_narrow());
}

#[test]
fn test_counter_follows_indexed_conversation_not_stale_copy() {
    let (mut engine, _queue) = setup(&[1, 2, 3]);
    let moved = ConversationKey::stream(StreamId(10), "y");

    // A cached copy whose topic disagrees with what the store indexed
    let stale = Message::unread(1, moved.clone());
    engine.notify_server_messages_read(&[stale], ReadOptions::default());

    let effects = engine.surfaces_mut().take();
    assert!(effects.contains(&Effect::Counter(conversation_c(), 2)));
    assert!(!effects.iter().any(|e| matches!(e, Effect::Counter(key, _) if *key == moved)));

    // Same on the server path, with the stale copy sitting in the cache
    engine.cache_mut().insert(Message::unread(2, moved.clone()));
    engine.process_read_messages_event(&ids(&[2]));

    let effects = engine.surfaces_mut().take();
    assert!(effects.contains(&Effect::Counter(conversation_c(), 1)));
    assert_eq!(engine.store().count_for_conversation(&conversation_c()), 1);
    assert_eq!(engine.store().count_for_conversation(&moved), 0);
}

#[test]
fn test_repaint_fans_out_to_views_containing_message() {
    let (mut engine, _queue) = setup(&[1, 2]);
    engine.register_view(MessageList::new(NARROW, ViewKind::Narrowed).with_members(ids(&[2])));

    let batch = messages(&engine, &[1, 2]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());

    let effects = engine.surfaces_mut().take();
    let repainted: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::Repaint(..)))
        .cloned()
        .collect();
    assert_eq!(
        repainted,
        vec![
            Effect::Repaint(HOME, MessageId(1)),
            Effect::Repaint(HOME, MessageId(2)),
            Effect::Repaint(NARROW, MessageId(2)),
        ]
    );
}

#[test]
fn test_scroll_to_bottom_rules() {
    let (mut engine, _queue) = setup(&[1, 2]);
    engine.register_view(
        MessageList::new(NARROW, ViewKind::Narrowed)
            .with_members(ids(&[1, 2]))
            .with_auto_mark_read(false),
    );

    let overlay = Viewport {
        recent_conversations_visible: true,
        ..Viewport::at_bottom()
    };
    assert_eq!(engine.process_visible(&overlay), ScrollOutcome::Ignored);

    let unfocused = Viewport {
        visible_and_focused: false,
        ..Viewport::at_bottom()
    };
    assert_eq!(engine.process_visible(&unfocused), ScrollOutcome::Ignored);
    assert_eq!(engine.store().total(), 2);

    engine.set_active_view(NARROW).unwrap();
    assert_eq!(engine.process_visible(&Viewport::at_bottom()), ScrollOutcome::BannerShown(NARROW));
    assert!(engine.surfaces_mut().take().contains(&Effect::Banner(NARROW)));

    engine.set_active_view(HOME).unwrap();
    let ScrollOutcome::MarkedRead(outcome) = engine.process_visible(&Viewport::at_bottom()) else {
        panic!("home view should auto-read");
    };
    assert_eq!(outcome.newly_read, ids(&[1, 2]));

    engine.set_active_view(NARROW).unwrap();
    assert_eq!(engine.process_visible(&Viewport::at_bottom()), ScrollOutcome::NothingUnread);
}

#[test]
fn test_mark_pm_as_read_sends_conversation_ids() {
    let (mut engine, mut queue) = setup(&[]);
    let key = ParticipantKey::from_user_ids(&[UserId(42), UserId(100)], Some(UserId(100)));
    let conversation = ConversationKey::private(key.clone());
    engine.process_loaded_messages(vec![
        Message::unread(20, conversation.clone()),
        Message::unread(21, conversation),
    ]);

    assert!(engine.mark_pm_as_read(&key, || {}));

    assert_eq!(requests(&mut queue), vec![ServerRequest::mark_read(ids(&[20, 21]))]);
    // The server event reports the change; nothing is applied locally
    assert_eq!(engine.store().total(), 2);
}

// ---------------------------------------------------------------------
// Dispatching through a transport
// ---------------------------------------------------------------------

#[derive(Default)]
struct FakeServer {
    posted: Mutex<Vec<ServerRequest>>,
    down: bool,
}

#[async_trait]
impl ServerTransport for FakeServer {
    async fn post(&self, request: &ServerRequest) -> Result<(), TransportError> {
        self.posted.lock().unwrap().push(request.clone());
        if self.down {
            return Err(TransportError::Rejected {
                status: 502,
                reason: "bad gateway".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReloader {
    requested: Mutex<Vec<ReloadOptions>>,
}

impl Reloader for RecordingReloader {
    fn request_reload(&self, options: ReloadOptions) {
        self.requested.lock().unwrap().push(options);
    }
}

#[tokio::test]
async fn test_bankruptcy_reloads_after_server_confirms() {
    let (engine, queue) = setup(&[1, 2, 3]);
    let reloader = Arc::new(RecordingReloader::default());
    let mut engine = engine.with_reloader(reloader.clone());
    let server = Arc::new(FakeServer::default());
    let mut dispatcher = OutboundDispatcher::new(queue, server.clone());

    engine.mark_all_as_read();

    // Cleared immediately, before the server answers
    assert_eq!(engine.store().total(), 0);
    assert_eq!(engine.surfaces_mut().take(), vec![Effect::Refresh(0)]);
    assert!(reloader.requested.lock().unwrap().is_empty());

    assert_eq!(dispatcher.flush().await, 1);

    assert_eq!(*server.posted.lock().unwrap(), vec![ServerRequest::MarkAllRead]);
    assert_eq!(*reloader.requested.lock().unwrap(), vec![ReloadOptions::default()]);
}

#[tokio::test]
async fn test_failed_request_keeps_optimistic_state() {
    let (mut engine, queue) = setup(&[1, 2]);
    let server = Arc::new(FakeServer {
        down: true,
        ..Default::default()
    });
    let mut dispatcher = OutboundDispatcher::new(queue, server.clone());

    let batch = messages(&engine, &[1, 2]);
    engine.notify_server_messages_read(&batch, ReadOptions::default());
    dispatcher.flush().await;

    assert_eq!(dispatcher.stats().failed, 1);
    assert_eq!(server.posted.lock().unwrap().len(), 1);
    assert_eq!(engine.store().total(), 0);

    // Nothing retried on the next flush
    assert_eq!(dispatcher.flush().await, 0);
    assert_eq!(server.posted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_topic_continuation_only_on_success() {
    let (engine, queue) = setup(&[1]);
    let server = Arc::new(FakeServer::default());
    let done = Arc::new(AtomicUsize::new(0));

    let hits = done.clone();
    engine.mark_topic_as_read(StreamId(10), "x", move || {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    let hits = done.clone();
    engine.mark_stream_as_read(StreamId(10), move || {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    drop(engine);

    let stats = OutboundDispatcher::new(queue, server.clone()).spawn().await.unwrap();

    assert_eq!(stats.sent, 2);
    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(
        *server.posted.lock().unwrap(),
        vec![
            ServerRequest::MarkTopicRead {
                stream_id: StreamId(10),
                topic: "x".into()
            },
            ServerRequest::MarkStreamRead { stream_id: StreamId(10) },
        ]
    );
}
