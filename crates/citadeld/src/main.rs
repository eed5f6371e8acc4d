//! Citadeld - Citadel scan daemon.
//!
//! Runs in three modes:
//! - `serve`: HTTP scan API (`/health`, `/scan`, `/mcp`)
//! - `proxy`: MCP stdio proxy wrapping a downstream server command
//! - `scan`: one-shot CLI scan for debugging

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citadeld::api;
use citadeld::proxy;
use citadeld::setup::build_engine;
use citadeld::state::AppState;

#[derive(Parser)]
#[command(name = "citadeld")]
#[command(about = "Citadel prompt-injection scan daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Seed/config directory (defaults to auto-discovery)
    #[arg(long, global = true)]
    seed_dir: Option<PathBuf>,

    /// Detection profile: strict, balanced, permissive, code_assistant,
    /// ai_safety
    #[arg(long, global = true, default_value = "balanced")]
    profile: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP scan API
    Serve {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:7107")]
        listen: String,
    },
    /// Proxy a downstream MCP server over stdio, scanning every frame
    Proxy {
        /// Downstream command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Scan one input and print the verdict as JSON
    Scan {
        /// Text to scan
        text: String,
        /// Data sensitivity: strict, standard, tolerant
        #[arg(long, default_value = "standard")]
        data_sensitivity: String,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("citadel={level},citadeld={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let engine = build_engine(cli.seed_dir.clone(), &cli.profile).await;

    match cli.command {
        Command::Serve { listen } => {
            let state = AppState::new(engine);
            let router = api::router(state);

            let listener = TcpListener::bind(&listen).await?;
            tracing::info!(%listen, "citadeld listening");
            axum::serve(listener, router).await?;
            Ok(())
        }
        Command::Proxy { command } => {
            let code = proxy::run(Arc::new(engine), &command).await?;
            std::process::exit(code);
        }
        Command::Scan {
            text,
            data_sensitivity,
        } => {
            let options = citadel_core::DetectionOptions {
                data_sensitivity: citadel_core::DataSensitivity::parse(&data_sensitivity),
                profile: cli.profile.clone(),
                ..Default::default()
            };
            let result = engine.scan_with_options(&text, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
