pub mod client_actors;
pub mod config;
pub mod messages;
pub mod services;
pub mod tracker;
