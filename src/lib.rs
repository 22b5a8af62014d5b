pub mod ability;
pub mod catalog;
pub mod config;
pub mod council_config;
pub mod errors;
pub mod init;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod session;
pub mod ui;
