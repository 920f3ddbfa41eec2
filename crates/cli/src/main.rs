//! Swarmline CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Initialize config & workspace
//! - `agent`    — Interactive session or single-message mode
//! - `agents`   — List the configured agent population
//! - `gateway`  — Start the HTTP/WebSocket gateway
//! - `status`   — Show configuration status

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "swarmline",
    about = "Swarmline — multi-agent session runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Talk to the active agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Start with this agent active
        #[arg(short, long)]
        agent: Option<String>,

        /// Use the detailed line budget for answers
        #[arg(short, long)]
        detail: bool,
    },

    /// List configured agents
    Agents,

    /// Start the HTTP/WebSocket gateway
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent {
            message,
            agent,
            detail,
        } => {
            let options = commands::agent::AgentOptions {
                agent,
                verbose: cli.verbose,
                detail,
            };
            commands::agent::run(message, options).await?
        }
        Commands::Agents => commands::agents::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
