pub mod local;
pub mod provider;
