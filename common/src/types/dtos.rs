use serde::{Deserialize, Serialize};

use crate::types::order_status::OrderStatus;
use crate::types::step_state::StepState;

/// Point-in-time read of an order, used to seed tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshotDTO {
    /// Order id.
    pub order_id: String,
    /// Current stage of the order.
    pub status: OrderStatus,
    /// Assigned partner id, once there is one.
    #[serde(default)]
    pub partner_id: Option<String>,
    /// Whether the verification code was already confirmed.
    #[serde(default)]
    pub otp_verified: bool,
}

/// Change notification for an order already being tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEventDTO {
    pub status: OrderStatus,
    #[serde(default)]
    pub otp_verified: bool,
    #[serde(default)]
    pub partner_id: Option<String>,
    /// Marks a deliberate correction that may move the order back to an earlier stage.
    #[serde(default)]
    pub correction: bool,
}

impl OrderEventDTO {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            otp_verified: false,
            partner_id: None,
            correction: false,
        }
    }

    pub fn with_partner(mut self, partner_id: impl Into<String>) -> Self {
        self.partner_id = Some(partner_id.into());
        self
    }

    pub fn with_otp_verified(mut self, otp_verified: bool) -> Self {
        self.otp_verified = otp_verified;
        self
    }

    pub fn as_correction(mut self) -> Self {
        self.correction = true;
        self
    }
}

/// Field partner (scrap dealer) contact details. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDTO {
    pub name: String,
    pub phone: String,
}

/// State of the live event subscription as shown to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Events are flowing.
    Live,
    /// The feed dropped; the view shows a "reconnecting" affordance.
    Reconnecting,
    /// Tracking was torn down.
    Closed,
}

/// One row of the step indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageViewDTO {
    pub stage: OrderStatus,
    pub state: StepState,
    pub title: String,
    pub description: String,
    /// Partner name shown next to the assigned step once known.
    pub annotation: Option<String>,
}

/// Render-ready view of one tracked order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionDTO {
    pub order_id: String,
    pub stages: Vec<StageViewDTO>,
    pub partner: Option<PartnerDTO>,
    pub can_show_otp: bool,
    pub can_show_partner_contact: bool,
    pub is_complete: bool,
    /// Digits of the verification code, present only while `can_show_otp` holds.
    pub otp_digits: Option<Vec<u8>>,
    pub connection: ConnectionState,
}

impl ProjectionDTO {
    pub fn current_stage(&self) -> Option<OrderStatus> {
        self.stages
            .iter()
            .find(|view| view.state == StepState::Current)
            .map(|view| view.stage)
    }

    pub fn state_of(&self, stage: OrderStatus) -> Option<StepState> {
        self.stages
            .iter()
            .find(|view| view.stage == stage)
            .map(|view| view.state)
    }
}
