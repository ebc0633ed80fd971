use actix::{Message, Recipient};
use common::errors::TrackerError;
use common::messages::tracking_messages::ProjectionChanged;
use common::types::dtos::ProjectionDTO;
use common::types::verification_code::VerificationCode;

/// Starts tracking an order: subscribes to its feed and seeds state from a snapshot.
/// Replaces any session the tracker already holds.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<ProjectionDTO, TrackerError>")]
pub struct StartTracking {
    pub order_id: String,
    /// Code displayed while the order waits for verification.
    pub verification_code: Option<VerificationCode>,
}

/// Tears the current session down. Safe to send any number of times.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Dispose;

/// Reads the current projection, `None` before the first snapshot resolves.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Option<ProjectionDTO>")]
pub struct GetProjection;

/// Reattaches the feed after a disconnect and reconciles with a fresh snapshot.
/// Fails with `NotTracking` when no live session exists.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), TrackerError>")]
pub struct Resubscribe;

/// Retries a partner lookup that previously failed.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), TrackerError>")]
pub struct RetryPartner;

/// Registers a presentation-layer reader of projections.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Observe {
    pub observer: Recipient<ProjectionChanged>,
}
