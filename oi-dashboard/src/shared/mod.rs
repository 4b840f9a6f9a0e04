/// Shared modules for the OI dashboard binaries
pub mod client;
pub mod config;
pub mod export;
pub mod logging;
pub mod poller;
pub mod state;
pub mod widget;
