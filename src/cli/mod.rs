//! CLI module for the trade-escrow demo binary

pub mod app;
pub mod commands;

pub use app::DemoApp;
pub use commands::{Cli, Commands, Scenario};
