use actix::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::dtos::{OrderEventDTO, ProjectionDTO};

/// Opaque id of one live subscription, issued by the feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What the feed source reports for a subscribed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedNotice {
    /// The order's fields changed.
    Changed(OrderEventDTO),
    /// The subscription dropped; no further events arrive on this handle.
    Disconnected,
}

/// Notification delivered to a subscriber, stamped with the handle it was issued under.
#[derive(Message, Debug, Clone, Serialize, Deserialize)]
#[rtype(result = "()")]
pub struct OrderFeed {
    pub subscription: SubscriptionHandle,
    pub notice: FeedNotice,
}

/// Pushed to the presentation layer after every state change of a tracked order.
#[derive(Message, Debug, Clone, Serialize, Deserialize)]
#[rtype(result = "()")]
pub struct ProjectionChanged {
    pub projection: ProjectionDTO,
}
