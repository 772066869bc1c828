pub mod ops;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "time_ledger")]
#[command(about = "Time-denominated balance ledger", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file (created with defaults if missing)
    #[arg(long, default_value = "time_ledger.toml")]
    pub config: String,

    /// Override the database path from the config file
    #[arg(long)]
    pub db: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// The store is opened exclusively, so ticks only happen inside a process
/// that hosts them: `run-worker`, `interactive`, or a foreground `stake`.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the tick worker until Ctrl-C
    RunWorker {
        /// Tick interval in milliseconds (defaults to the config value)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Run the tick worker and read commands from stdin until `quit`
    Interactive,
    /// Stake seconds and count down in the foreground, ticking meanwhile; Ctrl-C forfeits
    Stake(StakeArgs),
    #[command(flatten)]
    Client(ClientCommand),
}

/// One-shot operations that need no ticks of their own.
#[derive(Subcommand)]
pub enum ClientCommand {
    /// Create a new account
    CreateAccount {
        #[arg(long)]
        name: String,
        /// Initial balance in seconds (defaults to the config value)
        #[arg(long)]
        initial_seconds: Option<u64>,
        #[arg(long)]
        admin: bool,
    },
    /// Move seconds between two accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Show one account
    Balance {
        name: String,
    },
    /// List every account
    List,
    /// Top accounts by balance
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Aggregate statistics
    Stats,
    /// Show the reserve total
    Reserve,
    /// Admin: move seconds from the reserve to one account
    ReserveTransfer {
        #[arg(long)]
        admin: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Admin: split the reserve evenly
    Distribute {
        #[arg(long)]
        admin: String,
        /// Seconds to hand out; omit to use the full reserve
        #[arg(long)]
        amount: Option<u64>,
        /// Recipient names; omit to use every active account
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
    },
}

#[derive(Args)]
pub struct StakeArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub amount: u64,
}

/// One line typed at the `interactive` prompt.
#[derive(Parser)]
#[command(name = "ledger", no_binary_name = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand)]
pub enum ShellCommand {
    /// Stake seconds and count down; Ctrl-C forfeits
    Stake(StakeArgs),
    /// Stop ticking and exit
    #[command(alias = "exit")]
    Quit,
    #[command(flatten)]
    Client(ClientCommand),
}
