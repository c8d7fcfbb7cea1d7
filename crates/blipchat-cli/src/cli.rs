//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Service UUID to advertise and scan for
    #[arg(long)]
    pub service_uuid: Option<String>,

    /// Characteristic UUID carrying payloads
    #[arg(long)]
    pub characteristic_uuid: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join the session and chat line by line
    Chat {
        /// Name to advertise
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List peers that are ready to exchange messages
    Peers {
        /// Keep printing the peer set as it changes
        #[arg(short, long)]
        watch: bool,
    },
    /// Serve the host method channel as JSON lines on stdin/stdout
    Host,
}

impl Commands {
    pub fn device_name(&self) -> Option<&str> {
        match self {
            Commands::Chat { name } => name.as_deref(),
            _ => None,
        }
    }
}
