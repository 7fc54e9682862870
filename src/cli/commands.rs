//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trade-escrow")]
#[command(about = "Trade Escrow - bilateral negotiation with atomic settlement", long_about = None)]
pub struct Cli {
    /// JSON engine config (defaults apply to missing fields)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a trade scenario against in-memory backends
    Demo {
        #[command(subcommand)]
        scenario: Scenario,
    },

    /// Print the effective engine configuration
    Config,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Scenario {
    /// Alice trades a sword for 50 of Bob's gold
    Swap,

    /// Alice's balance drops before she confirms
    InsufficientFunds,

    /// Bob changes his offer after Alice confirmed
    BaitAndSwitch,

    /// A backend call fails in the middle of settlement
    Fault {
        /// Index of the mutating call that fails
        #[arg(short, long, default_value = "2")]
        fail_at: usize,

        /// Keep failing during compensation as well
        #[arg(long)]
        break_compensation: bool,
    },

    /// Leave a session idle until the sweeper reclaims it
    Expire {
        /// Negotiation window used for this run, in seconds
        #[arg(short, long, default_value = "2")]
        window_secs: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault_scenario() {
        let cli = Cli::parse_from(["trade-escrow", "demo", "fault", "--fail-at", "5"]);
        match cli.command {
            Commands::Demo { scenario } => assert_eq!(
                scenario,
                Scenario::Fault {
                    fail_at: 5,
                    break_compensation: false
                }
            ),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["trade-escrow", "config", "--config", "engine.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("engine.json")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
