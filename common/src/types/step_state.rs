use serde::{Deserialize, Serialize};

use crate::types::order_status::OrderStatus;

/// How a lifecycle stage is drawn relative to the order's current stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// The order already went past this stage.
    Completed,
    /// The order is at this stage.
    Current,
    /// The order has not reached this stage yet.
    Upcoming,
}

/// Classifies `stage` against `current` using only their lifecycle indices.
pub fn classify(stage: OrderStatus, current: OrderStatus) -> StepState {
    match stage.index().cmp(&current.index()) {
        std::cmp::Ordering::Less => StepState::Completed,
        std::cmp::Ordering::Equal => StepState::Current,
        std::cmp::Ordering::Greater => StepState::Upcoming,
    }
}
