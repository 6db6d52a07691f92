pub mod bus;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod plan;
pub mod scheduler;
pub mod score;
pub mod time;
pub mod transport;
