pub mod order_tracker;
pub mod pickup_simulator;
pub mod ui_handler;
