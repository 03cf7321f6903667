//! Error types for indras-unread

use thiserror::Error;

use crate::view::ViewId;

/// Errors returned by view management and retroactive-unread operations
///
/// The reconciliation protocols themselves are total and never return these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnreadError {
    /// No view with this id is registered
    #[error("view not found: {0}")]
    ViewNotFound(ViewId),

    /// An operation needed an active view but none is set
    #[error("no active view")]
    NoActiveView,

    /// The view does not hold a contiguous slice of history, so an id range
    /// computed from it would be wrong
    #[error("view {0} has incomplete history")]
    IncompleteView(ViewId),

    /// Configuration rejected during load
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Errors reported by a [`ServerTransport`](crate::notifier::ServerTransport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request never reached the server
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a failure status
    #[error("request rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// Transport has been shut down
    #[error("transport closed")]
    Closed,
}

/// Result type for unread operations
pub type UnreadResult<T> = Result<T, UnreadError>;
