//! The two byte pumps between the real terminal and the PTY.

pub mod input;
pub mod output;

pub use input::spawn_input_relay;
pub use output::OutputRelay;
