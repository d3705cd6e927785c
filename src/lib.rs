pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod security;
pub mod server;
pub mod session;
