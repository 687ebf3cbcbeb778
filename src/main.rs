use clap::{Parser, Subcommand};
use rag_engine::commands::{
    check_provider, init_settings, list_limited_users, load_settings, run_sweep, serve, show_assignment,
    show_settings, show_usage,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-engine")]
#[command(about = "Retrieval-augmented generation policy engine with an HTTP API")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve,
    /// Show or initialize process settings
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "init")]
        show: bool,
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
    /// Run one vector cleanup and rate limit pruning pass
    Sweep,
    /// Show the A/B group a user is assigned to
    Assign {
        /// User ID to look up
        user: String,
        /// Content type being generated
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Show a user's embedding rate limit usage
    Usage {
        /// User ID to look up
        user: String,
    },
    /// List users with a rate limit override
    LimitedUsers,
    /// Check the embedding provider connection and model
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config_dir)?;

    match cli.command {
        Commands::Serve => {
            serve(settings).await?;
        }
        Commands::Config { show: _, init: true } => {
            init_settings(&settings)?;
        }
        Commands::Config { .. } => {
            show_settings(&settings);
        }
        Commands::Sweep => {
            run_sweep(settings).await?;
        }
        Commands::Assign { user, content_type } => {
            show_assignment(settings, &user, content_type.as_deref()).await?;
        }
        Commands::Usage { user } => {
            show_usage(settings, &user).await?;
        }
        Commands::LimitedUsers => {
            list_limited_users(settings).await?;
        }
        Commands::Check => {
            check_provider(settings).await?;
        }
    }

    Ok(())
}
