use actix::prelude::*;
use common::constants::{DISCONNECT_PROBABILITY, DUPLICATE_EVENT_PROBABILITY};
use common::logger::Logger;
use common::types::dtos::OrderEventDTO;
use common::types::order_status::OrderStatus;
use common::utils::{jittered_delay_millis, random_bool_by_given_probability};
use std::collections::VecDeque;
use std::time::Duration;

use crate::services::in_memory::InMemoryOrderBackend;

/// Plays the dealer side of a pickup against the in-memory backend: walks the order
/// through its lifecycle, occasionally re-sending an event or dropping the feed.
pub struct PickupSimulator {
    backend: InMemoryOrderBackend,
    order_id: String,
    /// Events not published yet.
    script: VecDeque<OrderEventDTO>,
    last_event: Option<OrderEventDTO>,
    step_delay_millis: u64,
    duplicate_probability: f32,
    disconnect_probability: f32,
    logger: Logger,
}

impl PickupSimulator {
    pub fn new(
        backend: InMemoryOrderBackend,
        order_id: impl Into<String>,
        partner_id: &str,
        step_delay_millis: u64,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            order_id: order_id.into(),
            script: Self::lifecycle_script(partner_id),
            last_event: None,
            step_delay_millis,
            duplicate_probability: DUPLICATE_EVENT_PROBABILITY,
            disconnect_probability: DISCONNECT_PROBABILITY,
            logger,
        }
    }

    /// Disables duplicate deliveries and disconnects.
    pub fn reliable(mut self) -> Self {
        self.duplicate_probability = 0.0;
        self.disconnect_probability = 0.0;
        self
    }

    /// Events a dealer produces for one pickup, in order.
    pub fn lifecycle_script(partner_id: &str) -> VecDeque<OrderEventDTO> {
        VecDeque::from(vec![
            OrderEventDTO::new(OrderStatus::Assigned).with_partner(partner_id),
            OrderEventDTO::new(OrderStatus::OnTheWay).with_partner(partner_id),
            OrderEventDTO::new(OrderStatus::Arrived).with_partner(partner_id),
            OrderEventDTO::new(OrderStatus::Verifying).with_partner(partner_id),
            OrderEventDTO::new(OrderStatus::Verifying)
                .with_partner(partner_id)
                .with_otp_verified(true),
            OrderEventDTO::new(OrderStatus::Completed)
                .with_partner(partner_id)
                .with_otp_verified(true),
        ])
    }

    fn schedule_next(&self, ctx: &mut Context<Self>) {
        let delay = Duration::from_millis(jittered_delay_millis(self.step_delay_millis));
        ctx.run_later(delay, |act, ctx| act.step(ctx));
    }

    fn step(&mut self, ctx: &mut Context<Self>) {
        if let Some(previous) = &self.last_event {
            if random_bool_by_given_probability(self.duplicate_probability) {
                self.logger
                    .info(format!("Re-sending {} event", previous.status));
                self.backend.replay(&self.order_id, previous.clone());
            }
        }
        if random_bool_by_given_probability(self.disconnect_probability) {
            self.logger.warn("Dropping the order feed");
            self.backend.disconnect(&self.order_id);
        }

        match self.script.pop_front() {
            Some(event) => {
                self.logger.info(format!(
                    "Dealer update: {} (otp verified: {})",
                    event.status, event.otp_verified
                ));
                self.backend.publish(&self.order_id, event.clone());
                self.last_event = Some(event);
                self.schedule_next(ctx);
            }
            None => {
                self.logger.info("Pickup lifecycle finished");
                ctx.stop();
            }
        }
    }
}

impl Actor for PickupSimulator {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.logger
            .info(format!("Simulating pickup of order {}", self.order_id));
        self.schedule_next(ctx);
    }
}
