use thiserror::Error;

/// Failure reported by an external collaborator (order store or partner directory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Errors surfaced by the order tracker to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The order id did not resolve; the view must not enter tracking.
    #[error("order {order_id} could not be loaded: {source}")]
    SnapshotFetch {
        order_id: String,
        source: FetchError,
    },
    /// Non-fatal; the partner stays absent.
    #[error("partner {partner_id} could not be loaded: {source}")]
    PartnerFetch {
        partner_id: String,
        source: FetchError,
    },
    /// Non-fatal; the caller decides when to resubscribe.
    #[error("event stream for order {0} disconnected")]
    StreamDisconnected(String),
    #[error("order id must not be empty")]
    InvalidOrderId,
    #[error("invalid verification code '{0}'")]
    InvalidVerificationCode(String),
    /// The session was disposed or replaced before this operation finished.
    #[error("tracking session for order {0} was superseded")]
    SessionSuperseded(String),
    #[error("no order is being tracked")]
    NotTracking,
}

impl TrackerError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TrackerError::SnapshotFetch { .. } | TrackerError::InvalidOrderId
        )
    }
}
