pub mod config;
pub mod events;
pub mod profiles;
pub mod runs;
