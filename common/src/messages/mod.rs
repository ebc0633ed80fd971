pub mod tracking_messages;

pub use tracking_messages::*;
