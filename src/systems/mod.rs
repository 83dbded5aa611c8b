pub mod decay_system;
pub mod display_ticker_system;
pub mod heartbeat_system;
pub mod session_state_system;
