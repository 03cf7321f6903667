//! Built-in scenarios
//!
//! Each one ends in expectations, so replaying it doubles as a check that
//! the engine still behaves.

use indras_unread::{
    ConversationKey, EngineConfig, FlagEvent, Message, MessageDetails, MessageId, ReadOptions,
    StreamId, StreamUnread, UnreadSnapshot, UserId, ViewId, ViewKind,
};

use crate::scenario::{Expectation, Scenario, ServerConfig, Step, ViewSetup};

const HOME: ViewId = ViewId(1);
const NARROW: ViewId = ViewId(2);

/// Names accepted by [`builtin`]
pub const BUILTINS: &[&str] = &[
    "local-read",
    "foreign-read",
    "foreign-unread",
    "unread-from-here",
    "narrow",
    "bankruptcy",
    "flaky-server",
    "topic",
];

/// Look up a built-in scenario by name
pub fn builtin(name: &str) -> Option<Scenario> {
    let scenario = match name {
        "local-read" => local_read(),
        "foreign-read" => foreign_read(),
        "foreign-unread" => foreign_unread(),
        "unread-from-here" => unread_from_here(),
        "narrow" => narrow(),
        "bankruptcy" => bankruptcy(),
        "flaky-server" => flaky_server(),
        "topic" => topic(),
        _ => return None,
    };
    Some(scenario)
}

fn general() -> ConversationKey {
    ConversationKey::stream(StreamId(10), "general")
}

fn ids(raw: impl IntoIterator<Item = u64>) -> Vec<MessageId> {
    raw.into_iter().map(MessageId).collect()
}

/// Messages 1..=n unread in one topic, all in the active home view
fn feed(name: &str, n: u64) -> Scenario {
    Scenario::new(name)
        .with_config(EngineConfig::for_user(UserId(7)))
        .with_messages((1..=n).map(|id| Message::unread(id, general())))
        .with_view(ViewSetup::new(HOME, ViewKind::Home, ids(1..=n)))
        .with_active_view(HOME)
}

fn expect_unread(unread: Vec<MessageId>, read: Vec<MessageId>) -> Step {
    Step::Expect(Expectation {
        total: Some(unread.len()),
        unread: Some(unread),
        read: Some(read),
        ..Expectation::default()
    })
}

/// The user reads part of the feed; the server's echo changes nothing
pub fn local_read() -> Scenario {
    feed("local-read", 3)
        .step(Step::Read {
            ids: ids([1, 2]),
            options: ReadOptions::default(),
        })
        .step(expect_unread(ids([3]), ids([1, 2])))
        .step(Step::Expect(Expectation {
            requests_sent: Some(1),
            ..Expectation::default()
        }))
}

/// Another device reads messages, one of which was never fetched here
pub fn foreign_read() -> Scenario {
    let mut scenario = feed("foreign-read", 2);
    scenario.snapshot = UnreadSnapshot {
        streams: vec![StreamUnread {
            stream_id: StreamId(10),
            topic: "general".to_string(),
            unread_message_ids: ids([3]),
        }],
        ..UnreadSnapshot::default()
    };

    scenario
        .step(Step::ServerEvent(FlagEvent::Read {
            message_ids: ids([2, 3]),
        }))
        .step(expect_unread(ids([1]), ids([2, 3])))
}

/// Another device marks a read message unread
pub fn foreign_unread() -> Scenario {
    let mut scenario = feed("foreign-unread", 0);
    scenario.messages.push(Message::read(5, general()));

    scenario
        .step(Step::ServerEvent(FlagEvent::Unread {
            message_ids: ids([5]),
            message_details: [(MessageId(5), MessageDetails::stream(StreamId(10), "general"))]
                .into_iter()
                .collect(),
        }))
        .step(expect_unread(ids([5]), vec![]))
}

/// Mark unread from the middle of the feed; scrolling must not undo it
/// until reading resumes
pub fn unread_from_here() -> Scenario {
    let mut scenario = feed("unread-from-here", 5);
    for message in &mut scenario.messages {
        message.unread = false;
    }

    scenario
        .step(Step::MarkUnreadFromHere { from: MessageId(3) })
        .step(expect_unread(ids([3, 4, 5]), ids([1, 2])))
        .step(Step::Scroll { viewport: None })
        .step(Step::Expect(Expectation::total(3)))
        .step(Step::ResumeReading)
        .step(Step::Scroll { viewport: None })
        .step(Step::Expect(Expectation::total(0)))
}

/// The narrow-scoped read flag follows the active view
pub fn narrow() -> Scenario {
    feed("narrow", 3)
        .with_view(ViewSetup::new(NARROW, ViewKind::Narrowed, ids([2, 3])))
        .step(Step::SetActiveView { view: NARROW })
        .step(Step::Read {
            ids: ids([2]),
            options: ReadOptions::default(),
        })
        .step(Step::Expect(Expectation {
            messages_read_in_narrow: Some(true),
            ..Expectation::default()
        }))
        .step(Step::SetActiveView { view: HOME })
        .step(Step::Expect(Expectation {
            messages_read_in_narrow: Some(false),
            total: Some(2),
            ..Expectation::default()
        }))
}

/// Mark everything read; the client reloads once the server confirms
pub fn bankruptcy() -> Scenario {
    feed("bankruptcy", 4)
        .step(Step::MarkAllRead)
        .step(Step::Expect(Expectation {
            total: Some(0),
            reloads: Some(1),
            ..Expectation::default()
        }))
}

/// The server rejects flag changes; local state stays optimistic
pub fn flaky_server() -> Scenario {
    feed("flaky-server", 2)
        .with_server(ServerConfig {
            reject_paths: vec!["/json/messages/flags".to_string()],
            ..ServerConfig::default()
        })
        .step(Step::Read {
            ids: ids([1]),
            options: ReadOptions::default(),
        })
        .step(Step::Expect(Expectation {
            read: Some(ids([1])),
            requests_sent: Some(0),
            ..Expectation::default()
        }))
}

/// Marking a topic read arrives through the server's read event
pub fn topic() -> Scenario {
    let mut scenario = feed("topic", 2);
    scenario
        .messages
        .push(Message::unread(3, ConversationKey::stream(StreamId(10), "other")));

    scenario
        .step(Step::MarkTopicRead {
            stream_id: StreamId(10),
            topic: "general".to_string(),
        })
        .step(expect_unread(ids([3]), ids([1, 2])))
}
