pub mod projection;
pub mod state;
