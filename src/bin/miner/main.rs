//! Miner CLI
//!
//! Command-line interface for the Mining Rewards server.

mod client;
mod commands;
mod style;

use clap::{Parser, Subcommand};
use style::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "miner")]
#[command(author = "CortexLM")]
#[command(version)]
#[command(about = "Mining Rewards - Mine, track and claim your rewards", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Mining Rewards server URL
    #[arg(
        short,
        long,
        env = "MINING_SERVER_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    server: String,

    /// Your user id
    #[arg(short, long, env = "MINER_USER_ID", global = true)]
    user: Option<i64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a mining session
    Start {
        /// Use the extended session length
        #[arg(long)]
        extended: bool,
    },

    /// Show the running session
    #[command(visible_alias = "st")]
    Status,

    /// Show accumulating, claimable and claimed balances
    #[command(visible_alias = "bal")]
    Balance,

    /// Withdraw claimable currency
    Claim {
        /// Amount to claim
        #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
        amount: Option<String>,

        /// Claim everything, including the running session
        #[arg(long)]
        all: bool,

        /// Destination wallet address
        #[arg(short, long, env = "MINER_WALLET")]
        wallet: String,

        /// Destination network
        #[arg(short, long, default_value = "TON")]
        network: String,
    },

    /// Track a claim by its tracking id
    Track { tracking_id: String },

    /// List your recent claims
    #[command(visible_alias = "h")]
    History {
        /// Number of claims to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let result = match cli.command {
        Commands::Track { tracking_id } => commands::track::run(&cli.server, &tracking_id).await,
        command => match cli.user {
            Some(user_id) => run_for_user(&cli.server, user_id, command).await,
            None => Err(anyhow::anyhow!(
                "a user id is required (--user or MINER_USER_ID)"
            )),
        },
    };

    if let Err(e) = result {
        print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

async fn run_for_user(server: &str, user_id: i64, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Start { extended } => commands::start::run(server, user_id, extended).await,
        Commands::Status => commands::status::run(server, user_id).await,
        Commands::Balance => commands::balance::run(server, user_id).await,
        Commands::Claim {
            amount,
            all,
            wallet,
            network,
        } => commands::claim::run(server, user_id, amount, all, wallet, network).await,
        Commands::History { limit } => commands::history::run(server, user_id, limit).await,
        Commands::Track { tracking_id } => commands::track::run(server, &tracking_id).await,
    }
}

pub fn print_version_line() {
    println!(
        "  {} {}",
        style_dim("Mining Rewards"),
        style_dim(&format!("v{}", VERSION))
    );
}
