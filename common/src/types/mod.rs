pub mod dtos;
pub mod order_status;
pub mod step_state;
pub mod verification_code;
