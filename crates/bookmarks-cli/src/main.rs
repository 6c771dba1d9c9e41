//! Bookmarks CLI
//!
//! Command-line interface for a personal, live-updating bookmark list.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookmarks_core::{Config, LocalAuth, SqliteBackend};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "bookmarks")]
#[command(about = "Bookmarks - a personal bookmark list that stays in sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a different config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        #[command(subcommand)]
        command: LoginCommands,
    },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List bookmarks, newest first
    #[command(alias = "ls")]
    List,
    /// Add a bookmark
    Add {
        /// Bookmark title
        title: String,
        /// Bookmark URL
        url: String,
    },
    /// Delete a bookmark
    #[command(alias = "rm")]
    Delete {
        /// Bookmark ID (full or prefix)
        id: String,
    },
    /// Follow the bookmark list live
    Watch,
    /// Show account, storage and live-update status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum LoginCommands {
    /// Issue a one-time login code for an e-mail address
    Code {
        /// E-mail address to sign in with
        email: String,
        /// Full name for a new account
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Complete sign-in with a login code
    Callback {
        /// The login code
        #[arg(long)]
        code: Option<String>,
        /// Path to continue to after sign-in
        #[arg(long)]
        next: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, site_origin, realtime_url, api_key,
        /// realtime_enabled, heartbeat_secs, log_file)
        key: String,
        /// Configuration value ("none" clears optional keys)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work without opening the database
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
                Some(ConfigCommands::Set { key, value }) => {
                    commands::config::set(key, value, config_path, &output)
                }
            };
        }
        command => command,
    };

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let backend = Arc::new(SqliteBackend::open(&config).context("Failed to open database")?);
    let auth = LocalAuth::from_config(backend.clone(), &config);

    match command {
        Commands::Login { command } => match command {
            LoginCommands::Code { email, name } => {
                commands::auth::login_code(&auth, &email, name.as_deref(), &output)
            }
            LoginCommands::Callback { code, next } => commands::auth::login_callback(
                &auth,
                &config,
                code.as_deref(),
                next.as_deref(),
                &output,
            ),
        },
        Commands::Logout => commands::auth::logout(&auth, &output),
        Commands::Whoami => commands::auth::whoami(&auth, &output),
        Commands::List => commands::bookmark::list(&auth, backend, &output),
        Commands::Add { title, url } => {
            commands::bookmark::add(&auth, backend, &title, &url, &output)
        }
        Commands::Delete { id } => commands::bookmark::delete(&auth, backend, &id, &output),
        Commands::Watch => commands::watch::run(&auth, backend, &config, &output).await,
        Commands::Status => commands::status::show(&auth, &backend, &config, &output),
        Commands::Config { .. } => Ok(()),
    }
}

/// Log to a file when BOOKMARKS_LOG is set
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("BOOKMARKS_LOG") else {
        return;
    };

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "bookmarks_core={},bookmarks={}",
        log_level, log_level
    ));

    // Ignore the error if a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
