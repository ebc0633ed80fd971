use actix::Actor;
use client::client_actors::order_tracker::OrderTracker;
use client::client_actors::pickup_simulator::PickupSimulator;
use client::client_actors::ui_handler::UIHandler;
use client::config::TrackerConfig;
use client::messages::internal_messages::{Observe, StartTracking};
use client::services::in_memory::InMemoryOrderBackend;
use colored::Color;
use common::logger::Logger;
use common::types::dtos::PartnerDTO;
use common::types::verification_code::VerificationCode;
use common::utils::print_welcome_message;
use std::env;
use tokio::signal::ctrl_c;
use tokio::sync::oneshot;

const DEMO_PARTNER_ID: &str = "partner-1";

#[actix::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = match TrackerConfig::from_args(&args[1..]) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Uso: {} [--policy overwrite|reject-regressions] [--log-level debug|info|warn|error] [--step-delay-ms <n>]",
                args[0]
            );
            std::process::exit(1);
        }
    };

    print_welcome_message();

    let backend = InMemoryOrderBackend::new()
        .with_logger(Logger::new("Backend", Color::Magenta).with_level(config.log_level));
    backend.insert_partner(
        DEMO_PARTNER_ID,
        PartnerDTO {
            name: "Ravi Kumar".to_string(),
            phone: "+91 98765 43210".to_string(),
        },
    );
    let order = backend.book_pickup();
    let code = VerificationCode::generate();

    let tracker = OrderTracker::with_backend(backend.clone(), config.clone()).start();
    let (done_tx, done_rx) = oneshot::channel();
    let ui = UIHandler::new(
        tracker.clone(),
        Some(done_tx),
        Logger::new("UI", Color::Green).with_level(config.log_level),
    )
    .start();
    tracker.do_send(Observe {
        observer: ui.recipient(),
    });

    let started = tracker
        .send(StartTracking {
            order_id: order.order_id.clone(),
            verification_code: Some(code),
        })
        .await;
    match started {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            eprintln!("Order not found: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Tracker unavailable: {}", e);
            std::process::exit(1);
        }
    }

    let _simulator = PickupSimulator::new(
        backend,
        order.order_id,
        DEMO_PARTNER_ID,
        config.step_delay_millis,
        Logger::new("Dealer", Color::Yellow).with_level(config.log_level),
    )
    .start();

    tokio::select! {
        _ = ctrl_c() => {
            println!("Ctrl-C recibido, apagando...");
        }
        _ = done_rx => {
            println!("Pickup completed, closing tracker.");
        }
    }
    actix::System::current().stop();
    Ok(())
}
