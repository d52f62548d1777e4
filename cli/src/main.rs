mod bot;
mod commands;
mod config;
mod dispatch;
mod server;
mod telegram;
mod telemetry;
mod yandexgpt;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{cmd_estimate, cmd_history, cmd_run, cmd_serve};
use crate::config::Config;
use calofit_core::db::Database;

#[derive(Parser)]
#[command(
    name = "calofit",
    version,
    about = "A chat bot that logs what you eat and estimates the calories",
    long_about = "A Telegram bot that logs what you eat and estimates the calories.\n\
                  Send it a meal, get a calorie count; ask it for a report."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot with long polling
    Run,
    /// Receive updates through a webhook
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 behind a proxy on another host)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Public HTTPS base URL; when set, the webhook is registered with Telegram on startup
        #[arg(long, value_name = "URL")]
        public_url: Option<String>,
    },
    /// Ask the estimation service about one food, bypassing the caches
    Estimate {
        /// Food description, e.g. "2 boiled eggs"
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily calorie totals for a user
    History {
        /// Telegram user id
        #[arg(short, long)]
        user: i64,
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Run => cmd_run(&config).await,
        Commands::Serve {
            port,
            bind,
            public_url,
        } => cmd_serve(&config, port, &bind, public_url.as_deref()).await,
        Commands::Estimate { text, json } => cmd_estimate(&config, &text, json).await,
        Commands::History { user, days, json } => {
            let db = Database::open(&config.db_path)?;
            cmd_history(&db, user, days, json)
        }
    }
}
