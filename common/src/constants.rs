use std::time::Duration;

pub const VERIFICATION_CODE_LENGTH: usize = 6;

/// Delay between lifecycle steps in the pickup simulation.
const DELAY_SECONDS: u64 = 2;
pub const BASE_DELAY_MILLIS: u64 = 1000 * DELAY_SECONDS;

/// Probability that the simulated feed re-sends the previous event.
pub const DUPLICATE_EVENT_PROBABILITY: f32 = 0.25;
/// Probability that the simulated feed drops and reports a disconnect.
pub const DISCONNECT_PROBABILITY: f32 = 0.1;

/// Wait before the demo resubscribes after a disconnect.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(500);
