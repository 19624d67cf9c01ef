//! chatbridge CLI, the main entry point.
//!
//! Commands:
//! - `gateway`  Start the HTTP chat endpoint
//! - `ask`      Send one message through the same pipeline and print the reply
//! - `config`   Show the effective configuration or a default config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chatbridge",
    about = "chatbridge: session-aware chat gateway for the GigaChat API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Send a single message and print the reply
    Ask {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Continue an existing session (UUID)
        #[arg(short, long)]
        session: Option<String>,

        /// Print the full JSON response instead of just the text
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        /// Print a default config file instead of the effective settings
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Gateway { port, host } => commands::gateway::run(port, host).await?,
        Commands::Ask {
            message,
            session,
            json,
        } => commands::ask::run(message, session, json).await?,
        Commands::Config { default } => commands::config_cmd::run(default)?,
    }

    Ok(())
}
