use crate::client_actors::order_tracker::OrderTracker;
use crate::messages::internal_messages::{Dispose, Resubscribe};
use actix::prelude::*;
use colored::*;
use common::constants::RESUBSCRIBE_DELAY;
use common::logger::Logger;
use common::messages::tracking_messages::ProjectionChanged;
use common::types::dtos::{ConnectionState, ProjectionDTO};
use common::types::step_state::StepState;
use tokio::sync::oneshot;

/// Actor UIHandler: human-facing side of the tracker.
///
/// Reads projections pushed by the tracker and draws them on the terminal. It never
/// touches tracker state; it only asks the tracker to resubscribe or dispose.
pub struct UIHandler {
    /// Address of the `OrderTracker` being rendered.
    pub tracker: Addr<OrderTracker>,
    last_rendered: Option<ProjectionDTO>,
    /// Fired once the order is complete.
    on_complete: Option<oneshot::Sender<()>>,
    pub logger: Logger,
}

impl UIHandler {
    pub fn new(
        tracker: Addr<OrderTracker>,
        on_complete: Option<oneshot::Sender<()>>,
        logger: Logger,
    ) -> Self {
        UIHandler {
            tracker,
            last_rendered: None,
            on_complete,
            logger,
        }
    }

    fn render(&self, projection: &ProjectionDTO) {
        println!();
        println!("{}", format!("Order {}", projection.order_id).bold());
        for view in &projection.stages {
            let title = match &view.annotation {
                Some(name) => format!("{} ({})", view.title, name),
                None => view.title.clone(),
            };
            match view.state {
                StepState::Completed => println!("  {} {}", "✔".green(), title.dimmed()),
                StepState::Current => {
                    println!("  {} {}", "●".bright_green().bold(), title.bold());
                    println!("      {}", view.description.dimmed());
                }
                StepState::Upcoming => println!("  {} {}", "○".dimmed(), title.dimmed()),
            }
        }

        if let (true, Some(partner)) = (projection.can_show_partner_contact, &projection.partner) {
            println!(
                "  {}",
                format!("Call {}: {}", partner.name, partner.phone).cyan()
            );
        }
        if let Some(digits) = &projection.otp_digits {
            let boxes: Vec<String> = digits.iter().map(|d| format!("[{}]", d)).collect();
            println!("  Share this OTP with the scrapper: {}", boxes.join(" ").bold());
        }

        match projection.connection {
            ConnectionState::Reconnecting => self.logger.warn("Connection lost, reconnecting..."),
            ConnectionState::Closed => self.logger.info("Tracking closed"),
            ConnectionState::Live if projection.is_complete => self
                .logger
                .info("Thank you! You've helped make the planet a little greener today."),
            ConnectionState::Live => {
                self.logger
                    .info("This page updates automatically. Please stay on this screen.")
            }
        }
    }

    fn schedule_resubscribe(&self, ctx: &mut Context<Self>) {
        ctx.run_later(RESUBSCRIBE_DELAY, |act, ctx| {
            ctx.spawn(act.tracker.send(Resubscribe).into_actor(act).map(
                |result, act, _ctx| match result {
                    Ok(Ok(())) => act.logger.info("Order feed reattached"),
                    Ok(Err(e)) => act.logger.warn(format!("Resubscribe failed: {}", e)),
                    Err(e) => act.logger.error(format!("Tracker unreachable: {}", e)),
                },
            ));
        });
    }
}

impl Actor for UIHandler {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.logger.info("UIHandler iniciado!");
    }
}

impl Handler<ProjectionChanged> for UIHandler {
    type Result = ();

    fn handle(&mut self, msg: ProjectionChanged, ctx: &mut Self::Context) {
        let projection = msg.projection;
        if self.last_rendered.as_ref() == Some(&projection) {
            return;
        }
        self.render(&projection);

        let was_reconnecting = self
            .last_rendered
            .as_ref()
            .is_some_and(|p| p.connection == ConnectionState::Reconnecting);
        if projection.connection == ConnectionState::Reconnecting && !was_reconnecting {
            self.schedule_resubscribe(ctx);
        }
        if projection.is_complete {
            if projection.connection != ConnectionState::Closed {
                self.tracker.do_send(Dispose);
            }
            if let Some(done) = self.on_complete.take() {
                let _ = done.send(());
            }
        }
        self.last_rendered = Some(projection);
    }
}
