pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod operation;
pub mod types;
