//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_PORT;

/// Crawlvisor - supervise long-running crawl jobs
#[derive(Parser, Debug)]
#[command(name = "crawlvisor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the crawlvisor server
    #[arg(long, global = true, env = "CRAWLVISOR_URL", default_value_t = default_server_url())]
    pub server: String,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor and its HTTP control API
    Serve,

    /// List the jobs the supervisor knows about
    Jobs,

    /// Launch a job
    Launch {
        /// Job name
        name: String,

        /// Launch even if the job has failed too often in a row
        #[arg(short, long)]
        force: bool,
    },

    /// Stop a running job
    Stop {
        /// Job name
        name: String,
    },

    /// Stop every running job
    StopAll,

    /// Show the state of every job
    Status,

    /// Show recent log lines of a job
    Logs {
        /// Job name
        name: String,

        /// Maximum number of lines to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Reset a job's consecutive failure count
    Reset {
        /// Job name
        name: String,
    },

    /// Show aggregate supervisor health
    Health,
}

fn default_server_url() -> String {
    format!("http://127.0.0.1:{DEFAULT_PORT}")
}
