use common::types::dtos::{OrderEventDTO, OrderSnapshotDTO, PartnerDTO};
use common::types::order_status::OrderStatus;
use common::types::step_state::{StepState, classify};

use crate::config::RegressionPolicy;

/// View-state of one tracked order. Only [`TrackerState::apply`] and
/// [`TrackerState::set_partner`] mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerState {
    pub order_id: String,
    pub current_stage: OrderStatus,
    pub partner: Option<PartnerDTO>,
    pub otp_verified: bool,
}

/// Result of folding one event into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldOutcome {
    pub previous: OrderStatus,
    pub current: OrderStatus,
    /// The event asked for an earlier stage and the policy refused it.
    pub regression_rejected: bool,
    /// `otp_verified` flipped to true with this event.
    pub otp_confirmed: bool,
}

impl FoldOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.current || self.otp_confirmed
    }

    pub fn regressed(&self) -> bool {
        self.current.index() < self.previous.index()
    }
}

impl TrackerState {
    /// Seeds the state for `order_id` from its first snapshot. The partner is filled in later.
    pub fn seed(order_id: impl Into<String>, snapshot: &OrderSnapshotDTO) -> Self {
        Self {
            order_id: order_id.into(),
            current_stage: snapshot.status,
            partner: None,
            otp_verified: snapshot.otp_verified,
        }
    }

    /// Folds `event` into the state.
    ///
    /// The status overwrites the current stage (subject to `policy` for regressions).
    /// `otp_verified` can only go from false to true within a session.
    pub fn apply(&mut self, event: &OrderEventDTO, policy: RegressionPolicy) -> FoldOutcome {
        let previous = self.current_stage;
        let is_regression = event.status.index() < previous.index();
        let regression_rejected = is_regression
            && policy == RegressionPolicy::RejectUnlessCorrection
            && !event.correction;

        if !regression_rejected {
            self.current_stage = event.status;
        }

        let otp_confirmed = event.otp_verified && !self.otp_verified;
        self.otp_verified |= event.otp_verified;

        FoldOutcome {
            previous,
            current: self.current_stage,
            regression_rejected,
            otp_confirmed,
        }
    }

    /// Returns the partner id to look up when the state has no partner yet.
    pub fn missing_partner(&self, partner_id: Option<&str>) -> Option<String> {
        match (&self.partner, partner_id) {
            (None, Some(id)) if !id.is_empty() => Some(id.to_string()),
            _ => None,
        }
    }

    /// Stores the partner unless one is already known. Returns whether it was stored.
    pub fn set_partner(&mut self, partner: PartnerDTO) -> bool {
        if self.partner.is_some() {
            return false;
        }
        self.partner = Some(partner);
        true
    }

    pub fn classify(&self, stage: OrderStatus) -> StepState {
        classify(stage, self.current_stage)
    }

    pub fn is_complete(&self) -> bool {
        self.current_stage == OrderStatus::Completed
    }

    pub fn can_show_otp(&self) -> bool {
        self.current_stage == OrderStatus::Verifying && !self.otp_verified
    }

    pub fn can_show_partner_contact(&self) -> bool {
        self.current_stage == OrderStatus::Arrived && self.partner.is_some()
    }
}
