//! Scenario files
//!
//! A scenario is a startup state (config, unread snapshot, fetched messages,
//! open views) plus a list of steps: local triggers, server events and
//! expectations about the resulting state. Scenarios are plain JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use indras_unread::{
    EngineConfig, FlagEvent, Message, MessageId, MessageList, ReadOptions, StreamId, UnreadError,
    UnreadSnapshot, UserId, ViewId, ViewKind, Viewport,
};

/// Errors from loading or replaying a scenario
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Engine rejected step: {0}")]
    Engine(#[from] UnreadError),

    #[error("Step {step} reads message {id}, which was never loaded")]
    UnknownMessage { step: usize, id: MessageId },

    #[error("Step {step} expectation failed: {detail}")]
    Expectation { step: usize, detail: String },
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// A replayable scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,

    /// Client id stamped on log lines
    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default)]
    pub config: EngineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub snapshot: UnreadSnapshot,

    /// Messages already fetched into the cache
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub views: Vec<ViewSetup>,

    #[serde(default)]
    pub active_view: Option<ViewId>,

    pub steps: Vec<Step>,
}

fn default_client() -> String {
    "sim".to_string()
}

fn yes() -> bool {
    true
}

impl Scenario {
    /// An empty scenario to build on
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: default_client(),
            config: EngineConfig::default(),
            server: ServerConfig::default(),
            snapshot: UnreadSnapshot::default(),
            messages: Vec::new(),
            views: Vec::new(),
            active_view: None,
            steps: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> ScenarioResult<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ScenarioResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_view(mut self, view: ViewSetup) -> Self {
        self.views.push(view);
        self
    }

    pub fn with_active_view(mut self, view: ViewId) -> Self {
        self.active_view = Some(view);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// How the in-process server behaves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Push a flag event back for every accepted request, like the real
    /// server does for the client that made the change
    pub echo: bool,

    /// Request paths the server answers with an error
    pub reject_paths: Vec<String>,

    /// Only post queued requests on explicit `flush` steps
    pub manual_flush: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            echo: true,
            reject_paths: Vec::new(),
            manual_flush: false,
        }
    }
}

/// A view open at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewSetup {
    pub id: ViewId,
    #[serde(default)]
    pub kind: ViewKind,
    #[serde(default)]
    pub members: Vec<MessageId>,
    #[serde(default = "yes")]
    pub complete: bool,
    #[serde(default = "yes")]
    pub auto_mark_read: bool,
}

impl ViewSetup {
    pub fn new(id: ViewId, kind: ViewKind, members: impl IntoIterator<Item = MessageId>) -> Self {
        Self {
            id,
            kind,
            members: members.into_iter().collect(),
            complete: true,
            auto_mark_read: true,
        }
    }

    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }

    pub fn without_auto_read(mut self) -> Self {
        self.auto_mark_read = false;
        self
    }

    pub fn to_list(&self) -> MessageList {
        MessageList::new(self.id, self.kind)
            .with_members(self.members.iter().copied())
            .with_complete(self.complete)
            .with_auto_mark_read(self.auto_mark_read)
    }
}

/// One replay step
///
/// Externally tagged: `{"read": {"ids": [1, 2]}}`, `"mark_all_read"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// The user read these cached messages
    Read {
        ids: Vec<MessageId>,
        #[serde(default)]
        options: ReadOptions,
    },

    /// Mark every cached member of the active view read
    MarkCurrentListRead,

    /// The active view was scrolled; omitted viewport means "at the bottom"
    Scroll {
        #[serde(default)]
        viewport: Option<Viewport>,
    },

    /// A flag event pushed by the server
    ServerEvent(FlagEvent),

    MarkUnreadFromHere { from: MessageId },

    ResumeReading,

    SetActiveView { view: ViewId },

    MarkAllRead,

    MarkStreamRead { stream_id: StreamId },

    MarkTopicRead { stream_id: StreamId, topic: String },

    MarkPmRead { user_ids: Vec<UserId> },

    /// Post everything queued and apply the server's echoes
    Flush,

    Expect(Expectation),
}

/// State checks; unset fields are not checked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Expectation {
    pub total: Option<usize>,
    pub unread: Option<Vec<MessageId>>,
    pub read: Option<Vec<MessageId>>,
    pub messages_read_in_narrow: Option<bool>,
    pub requests_sent: Option<usize>,
    pub reloads: Option<usize>,
}

impl Expectation {
    pub fn total(total: usize) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }
}
