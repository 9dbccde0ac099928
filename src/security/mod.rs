//! Identity stamping for agents, tasks, and crews.

pub mod constants;
pub mod fingerprint;
pub mod security_config;

pub use fingerprint::Fingerprint;
pub use security_config::SecurityConfig;
