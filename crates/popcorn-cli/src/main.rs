//! 🚀 popcorn-cli: the front door, the bouncer, the maitre d' of popcorn.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads `.env`, sets up logging, loads config, hands everything to
//! `popcorn::run`, and prints what happened. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🍿 Consume series names from a queue and enrich them into stored records.
#[derive(Debug, Parser)]
#[command(name = "popcorn-cli", version, about)]
struct Cli {
    /// 🔧 TOML config file, layered over the environment. Env only when omitted.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. `.env` (if there is one) into the process environment
/// 2. Init tracing, `info` unless `RUST_LOG` says otherwise
/// 3. Load config (the moment of truth)
/// 4. Run until the source closes or Ctrl-C
/// 5. Print the tally, or the error chain and a hint (cry)
#[tokio::main]
async fn main() -> Result<()> {
    // 🌱 a missing .env is normal in containers, only a broken one is worth a word
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = &dotenv_result {
        if !err.not_found() {
            error!("⚠️ .env exists but could not be read: {}", err);
        }
    }

    let cli = Cli::parse();

    // 🔒 A config path that doesn't exist is a typo, not a request for env-only mode
    if let Some(path) = &cli.config {
        let exists = path.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
                path.display()
            )
        })?;
        if !exists {
            error!(
                "💀 Config file '{}' does not exist. Check pwd/cwd and relative paths, or use an absolute path.",
                path.display()
            );
            std::process::exit(1);
        }
    }

    let result = async {
        let app_config = popcorn::app_config::load_config(cli.config.as_deref())
            .context("💀 In popcorn-cli, main, we couldn't load the config. Check the TOML and the POPCORN_* / *_CONN_STRING variables.")?;
        popcorn::run(app_config).await
    }
    .await;

    match result {
        Ok(report) => {
            info!("🏁 done");
            println!("{}", report.render());
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("Server selection timeout")
                    || cause_str.contains("pool timed out")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like a service isn't reachable. \
                    Double-check that RabbitMQ, MongoDB and PostgreSQL are actually running \
                    and that the connection strings point at them. If you're using Docker, try \
                    `docker ps` to see what's up, or `docker compose up -d` to resurrect them. ☕"
                );
            }

            std::process::exit(1);
        }
    }
}
