pub mod noop;
pub mod provider;
