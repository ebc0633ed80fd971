use common::types::dtos::{ConnectionState, ProjectionDTO, StageViewDTO};
use common::types::order_status::OrderStatus;
use common::types::verification_code::VerificationCode;

use crate::tracker::state::TrackerState;

/// Derives the render-ready view from `state`. Every stage is classified afresh.
pub fn project(
    state: &TrackerState,
    connection: ConnectionState,
    verification_code: Option<&VerificationCode>,
) -> ProjectionDTO {
    let stages = OrderStatus::ALL
        .iter()
        .map(|stage| StageViewDTO {
            stage: *stage,
            state: state.classify(*stage),
            title: stage.title().to_string(),
            description: stage.description().to_string(),
            annotation: match (stage, &state.partner) {
                (OrderStatus::Assigned, Some(partner)) => Some(partner.name.clone()),
                _ => None,
            },
        })
        .collect();

    let can_show_otp = state.can_show_otp();
    ProjectionDTO {
        order_id: state.order_id.clone(),
        stages,
        partner: state.partner.clone(),
        can_show_otp,
        can_show_partner_contact: state.can_show_partner_contact(),
        is_complete: state.is_complete(),
        otp_digits: verification_code
            .filter(|_| can_show_otp)
            .map(VerificationCode::digits),
        connection,
    }
}
