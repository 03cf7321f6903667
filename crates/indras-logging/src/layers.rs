//! Custom tracing layers
//!
//! [`ClientContextLayer`] tags spans with the client that opened them;
//! [`jsonl_layer`] is the JSON formatter shared by console and file output.

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::{ClientContextData, ClientContextGuard};

/// Layer that attaches client context to spans
///
/// A span opened while a [`ClientContextGuard`] is active gets that context.
/// Otherwise it inherits its parent's, so work spawned from a tagged span
/// stays attributed to the same client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientContextLayer;

impl ClientContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct ClientContextExtension {
    pub data: ClientContextData,
}

impl<S> Layer<S> for ClientContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let data = ClientContextGuard::current().or_else(|| {
            span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<ClientContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });

        if let Some(data) = data {
            span.extensions_mut().insert(ClientContextExtension { data });
        }
    }
}

/// JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(
    writer: W,
    config: &JsonlConfig,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
}
