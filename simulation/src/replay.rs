//! Scenario replay
//!
//! Builds an engine from a scenario's startup state and applies its steps in
//! order. Outbound requests go through an [`OutboundDispatcher`] to the
//! in-process [`SimServer`], whose echoes are fed back as server events.

use std::sync::Arc;

use serde::Serialize;
use tracing::field::display;
use tracing::{Instrument, debug, info, info_span, warn};

use indras_unread::{
    InMemoryMessageCache, MessageCache, MessageId, OutboundDispatcher, OutboundNotifier,
    ParticipantKey, ReadStateEngine, ServerRequest, UnreadCounts, Viewport,
};
use indras_logging::ClientContextGuard;

use crate::scenario::{Expectation, Scenario, ScenarioError, ScenarioResult, Step};
use crate::server::SimServer;
use crate::surfaces::{SimReloader, SurfaceStats, TracingSurfaces};

type SimEngine = ReadStateEngine<InMemoryMessageCache, TracingSurfaces>;

/// Summary of a finished replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub name: String,
    pub steps: usize,
    pub counts: UnreadCounts,
    pub requests: Vec<ServerRequest>,
    pub requests_sent: usize,
    pub requests_failed: usize,
    pub reloads: usize,
    pub surfaces: SurfaceStats,
}

/// A scenario being replayed
pub struct Replay {
    name: String,
    manual_flush: bool,
    engine: SimEngine,
    dispatcher: OutboundDispatcher<SimServer>,
    server: Arc<SimServer>,
    reloader: Arc<SimReloader>,
    steps_applied: usize,
}

impl Replay {
    /// Build the startup state
    pub fn new(scenario: &Scenario) -> ScenarioResult<Self> {
        scenario.config.validate()?;

        let server = Arc::new(
            SimServer::new(scenario.server.clone())
                .with_messages(&scenario.messages)
                .with_snapshot(&scenario.snapshot),
        );
        let reloader = Arc::new(SimReloader::default());
        let (notifier, queue) = OutboundNotifier::channel();

        let mut engine = ReadStateEngine::new(
            scenario.config.clone(),
            InMemoryMessageCache::new(),
            TracingSurfaces::new(),
            notifier,
        )
        .with_reloader(reloader.clone())
        .with_snapshot(scenario.snapshot.clone());

        engine.process_loaded_messages(scenario.messages.clone());
        for view in &scenario.views {
            engine.register_view(view.to_list());
        }
        if let Some(active) = scenario.active_view {
            engine.set_active_view(active)?;
        }

        Ok(Self {
            name: scenario.name.clone(),
            manual_flush: scenario.server.manual_flush,
            engine,
            dispatcher: OutboundDispatcher::new(queue, server.clone()),
            server,
            reloader,
            steps_applied: 0,
        })
    }

    /// Replay every step of `scenario` and report the final state
    pub async fn run(scenario: &Scenario) -> ScenarioResult<ReplayReport> {
        // Spans opened under the guard carry the scenario's client id. The
        // ids are also recorded as fields so formatters print them.
        let span = {
            let _client = ClientContextGuard::new(scenario.client.clone());
            info_span!(
                "replay",
                scenario = %scenario.name,
                client_id = %scenario.client,
                instance_id = ClientContextGuard::current_instance_id().map(display),
            )
        };

        async {
            let mut replay = Self::new(scenario)?;
            for step in &scenario.steps {
                replay.apply(step).await?;
            }
            replay.flush().await;

            let report = replay.report();
            info!(
                total = report.counts.total,
                sent = report.requests_sent,
                failed = report.requests_failed,
                "Replay finished"
            );
            Ok::<_, ScenarioError>(report)
        }
        .instrument(span)
        .await
    }

    pub fn engine(&self) -> &SimEngine {
        &self.engine
    }

    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Apply one step, then deliver requests unless flushing is manual
    pub async fn apply(&mut self, step: &Step) -> ScenarioResult<()> {
        self.steps_applied += 1;
        let index = self.steps_applied;
        debug!(step = index, ?step, "Applying step");

        match step {
            Step::Read { ids, options } => {
                let messages = ids
                    .iter()
                    .map(|id| {
                        self.engine
                            .cache()
                            .get(*id)
                            .ok_or(ScenarioError::UnknownMessage { step: index, id: *id })
                    })
                    .collect::<ScenarioResult<Vec<_>>>()?;
                self.engine.notify_server_messages_read(&messages, *options);
            }
            Step::MarkCurrentListRead => {
                self.engine.mark_current_list_as_read(Default::default());
            }
            Step::Scroll { viewport } => {
                let viewport = viewport.unwrap_or_else(Viewport::at_bottom);
                let outcome = self.engine.process_visible(&viewport);
                debug!(?outcome, "Scroll handled");
            }
            Step::ServerEvent(event) => {
                self.engine.handle_event(event.clone());
            }
            Step::MarkUnreadFromHere { from } => {
                self.engine.mark_as_unread_from_here(*from)?;
            }
            Step::ResumeReading => self.engine.resume_reading()?,
            Step::SetActiveView { view } => self.engine.set_active_view(*view)?,
            Step::MarkAllRead => self.engine.mark_all_as_read(),
            Step::MarkStreamRead { stream_id } => {
                let stream_id = *stream_id;
                self.engine.mark_stream_as_read(stream_id, move || {
                    debug!(%stream_id, "Stream marked read on server");
                });
            }
            Step::MarkTopicRead { stream_id, topic } => {
                self.engine.mark_topic_as_read(*stream_id, topic.clone(), || {
                    debug!("Topic marked read on server");
                });
            }
            Step::MarkPmRead { user_ids } => {
                let current_user = self.engine.config().current_user;
                let key = ParticipantKey::from_user_ids(user_ids, current_user);
                if !self.engine.mark_pm_as_read(&key, || {}) {
                    debug!(participants = %key, "No unread direct messages to mark");
                }
            }
            Step::Flush => {
                self.flush().await;
                return Ok(());
            }
            Step::Expect(expectation) => return self.check(index, expectation),
        }

        if !self.manual_flush {
            self.flush().await;
        }
        Ok(())
    }

    /// Post queued requests and apply echoes until nothing is left
    pub async fn flush(&mut self) {
        loop {
            let posted = self.dispatcher.flush().await;
            let echoes = self.server.take_echoes();
            if posted == 0 && echoes.is_empty() {
                break;
            }
            for event in echoes {
                self.engine.handle_event(event);
            }
        }
    }

    fn check(&self, step: usize, expected: &Expectation) -> ScenarioResult<()> {
        let fail = |detail: String| {
            warn!(step, %detail, "Expectation failed");
            Err(ScenarioError::Expectation { step, detail })
        };

        let store = self.engine.store();

        if let Some(total) = expected.total
            && store.total() != total
        {
            return fail(format!("expected {} unread, found {}", total, store.total()));
        }

        if let Some(ids) = &expected.unread
            && let Some(id) = ids.iter().find(|id| !store.is_unread(**id))
        {
            return fail(format!("message {} should be unread", id));
        }

        if let Some(ids) = &expected.read
            && let Some(id) = ids.iter().find(|id| store.is_unread(**id))
        {
            return fail(format!("message {} should be read", id));
        }

        if let Some(flag) = expected.messages_read_in_narrow
            && self.engine.messages_read_in_narrow() != flag
        {
            return fail(format!("narrow read flag should be {}", flag));
        }

        if let Some(count) = expected.requests_sent
            && self.dispatcher.stats().sent != count
        {
            return fail(format!(
                "expected {} requests sent, found {}",
                count,
                self.dispatcher.stats().sent
            ));
        }

        if let Some(count) = expected.reloads
            && self.reloader.reloads() != count
        {
            return fail(format!("expected {} reloads, found {}", count, self.reloader.reloads()));
        }

        Ok(())
    }

    pub fn report(&self) -> ReplayReport {
        let stats = self.dispatcher.stats();
        ReplayReport {
            name: self.name.clone(),
            steps: self.steps_applied,
            counts: self.engine.unread_counts(),
            requests: self.server.posted(),
            requests_sent: stats.sent,
            requests_failed: stats.failed,
            reloads: self.reloader.reloads(),
            surfaces: self.engine.surfaces().stats.clone(),
        }
    }

    /// Whether `id` is currently unread
    pub fn is_unread(&self, id: MessageId) -> bool {
        self.engine.store().is_unread(id)
    }
}
