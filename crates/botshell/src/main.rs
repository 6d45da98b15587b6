use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use botshell::{Bot, BorgConfig, BotConfig, BotSection};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// A chat bot shell: one connection per configured room, each running a
/// supervised set of services, restarted on crash up to a limited number of
/// tries.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a single-room bot config.
    #[arg(short, long, default_value = "bot.yml")]
    config: PathBuf,

    /// Path to a multi-room borg config; overrides --config when given.
    #[arg(long)]
    borg: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct LoggingConfig {
    filter: String,
}

/// Resolves a filter directive from (in order): `RUST_LOG`, a `logging.yml`
/// file's `filter:` field, or `"info"`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            let contents = std::fs::read_to_string("logging.yml").ok()?;
            let config: LoggingConfig = serde_yaml::from_str(&contents).ok()?;
            Some(EnvFilter::new(config.filter))
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let exhausted = if let Some(borg_path) = &cli.borg {
        let borg = BorgConfig::load_from(borg_path)
            .with_context(|| format!("failed to load borg config {}", borg_path.display()))?;
        run_borg(borg).await?
    } else {
        let config = BotConfig::load_from(&cli.config)
            .with_context(|| format!("failed to load bot config {}", cli.config.display()))?;
        run_bot_supervised("bot".to_string(), config.0).await?
    };

    if exhausted {
        std::process::exit(1);
    }
    Ok(())
}

/// Runs every configured room concurrently, each under its own restart
/// loop, until ctrl-c or every room exhausts its retries.
async fn run_borg(borg: BorgConfig) -> Result<bool> {
    let mut set = tokio::task::JoinSet::new();
    for (name, section) in borg.0 {
        set.spawn(run_bot_supervised(name, section));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            Ok(false)
        }
        exhausted = async {
            let mut any_exhausted = false;
            while let Some(result) = set.join_next().await {
                match result {
                    Ok(Ok(true)) => any_exhausted = true,
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => error!("bot task failed: {e}"),
                    Err(e) => error!("bot task panicked: {e}"),
                }
            }
            any_exhausted
        } => Ok(exhausted),
    }
}

/// Runs one named bot, reconnecting on crash up to `max_tries` within one
/// intensity window, reusing the per-bot `services_max_restarts`/
/// `services_max_restarts_period` settings as the outer reconnect budget.
async fn run_bot_supervised(name: String, section: BotSection) -> Result<bool> {
    let max_tries = section.services_max_restarts;
    let period = Duration::from_secs_f64(section.services_max_restarts_period.max(0.0));

    let mut tries = 0u32;
    let mut window_start = Instant::now();

    loop {
        if window_start.elapsed() > period {
            tries = 0;
            window_start = Instant::now();
        }

        match run_one(&name, &section).await {
            Ok(()) => {
                info!(bot = %name, "bot exited cleanly");
                return Ok(false);
            }
            Err(e) => {
                tries += 1;
                error!(bot = %name, attempt = tries, "bot crashed: {e}");
                if tries > max_tries {
                    warn!(bot = %name, "exhausted restart budget, giving up");
                    return Ok(true);
                }
            }
        }
    }
}

/// Connects once and runs until the bot exits or ctrl-c arrives.
async fn run_one(name: &str, section: &BotSection) -> Result<()> {
    let bot = Bot::connect(section).await?;
    info!(bot = %name, room = %section.room, "connected");

    tokio::select! {
        cause = bot.wait_until_exit() => {
            match cause {
                None => Ok(()),
                Some(cause) => Err(anyhow::anyhow!("{cause}")),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            bot.exit(None);
            Ok(())
        }
    }
}
