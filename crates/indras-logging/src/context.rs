//! Client context injection for multi-client logging
//!
//! A process may drive several read-state clients at once (the scenario
//! replayer does). Thread-local client context lets every log line in a
//! scope carry the client it belongs to.

use std::cell::RefCell;

use uuid::Uuid;

/// Client context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContextData {
    /// Human-readable client name, e.g. the signed-in user
    pub client_id: String,
    /// Unique id for this client session
    pub instance_id: Uuid,
}

thread_local! {
    static CLIENT_CONTEXT: RefCell<Option<ClientContextData>> = const { RefCell::new(None) };
}

/// RAII guard for client context
///
/// Sets the client context for the current thread and restores the previous
/// one on drop, so guards nest.
///
/// # Example
///
/// ```ignore
/// use indras_logging::ClientContextGuard;
///
/// let _guard = ClientContextGuard::new("user-7");
///
/// // Spans opened in this scope carry client_id = "user-7"
/// tracing::info_span!("replay").in_scope(|| tracing::info!("Applying event"));
/// ```
pub struct ClientContextGuard {
    previous: Option<ClientContextData>,
}

impl ClientContextGuard {
    /// Set the client context with a fresh instance id
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_instance_id(client_id, Uuid::new_v4())
    }

    /// Set the client context with a known instance id
    ///
    /// Useful for keeping one id across reconnects of the same session.
    pub fn with_instance_id(client_id: impl Into<String>, instance_id: Uuid) -> Self {
        let data = ClientContextData {
            client_id: client_id.into(),
            instance_id,
        };
        let previous = CLIENT_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current client context (if any)
    pub fn current() -> Option<ClientContextData> {
        CLIENT_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_client_id() -> Option<String> {
        Self::current().map(|ctx| ctx.client_id)
    }

    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for ClientContextGuard {
    fn drop(&mut self) {
        CLIENT_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with client context set
///
/// # Example
///
/// ```ignore
/// with_client_context!("user-7", {
///     tracing::info!("Applying event");
/// });
/// ```
#[macro_export]
macro_rules! with_client_context {
    ($client_id:expr, $body:block) => {{
        let _guard = $crate::context::ClientContextGuard::new($client_id);
        $body
    }};
}
