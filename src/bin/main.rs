use std::{env, num::NonZeroU32, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gradewatch::{
    config::Config,
    health,
    job::{
        Jobs,
        fetch::SearchPage,
        monitor::{Initialized, Monitor, TargetMonitor},
        notify::Telegram,
        state::{FileStore, MemoryStore, StateStore},
        subprocess::SubprocessJob,
        util::Client,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CHILD_TIMEOUT: Duration = Duration::from_secs(60);
const TICK: Duration = Duration::from_secs(1);
const DEFAULT_PORT: u16 = 5000;

#[derive(Parser)]
#[command(
    name = "gradewatch",
    version,
    about = "Watches the ratings board for new classification records"
)]
struct Cli {
    /// Serve the health endpoint (also enabled whenever PORT is set; ignored by `once`)
    #[arg(long, global = true)]
    serve: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll forever, keeping the baseline in memory
    Watch,
    /// Run a single cycle against the baseline in STATE_FILE
    Once,
    /// Run `once` in a child process every SCHEDULE_INTERVAL_SECS
    Schedule,
    /// Poll until TARGET_COUNT is reached, notify once, then idle
    Target,
}

fn build_monitor<S: StateStore>(
    config: &Config,
    store: S,
) -> Result<Monitor<SearchPage, Telegram, S>> {
    let client = Client::new(REQUEST_TIMEOUT)?.with_limit(NonZeroU32::MIN);
    let page = SearchPage::new(client.clone(), &config.search_url, &config.search_keyword);
    tracing::debug!(url = %page.url(), "search page configured");
    let telegram = Telegram::new(
        client,
        &config.telegram_api_url,
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
    );
    Ok(Monitor::new(
        page,
        telegram,
        store,
        config.search_keyword.clone(),
        config.search_url.clone(),
    )
    .with_decrease_notice(config.notify_on_decrease))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gradewatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        keyword = %config.search_keyword,
        "gradewatch v{}",
        env!("CARGO_PKG_VERSION")
    );

    // `once` is short-lived and may run as a child of `schedule`, which
    // already holds the port.
    let long_lived = !matches!(cli.command, Command::Once);
    if long_lived && (cli.serve || config.port.is_some()) {
        let port = config.port.unwrap_or(DEFAULT_PORT);
        tokio::spawn(async move {
            if let Err(e) = health::serve(port).await {
                tracing::error!("health endpoint stopped: {e:#}");
            }
        });
    }

    match cli.command {
        Command::Watch => {
            let mut monitor = build_monitor(&config, MemoryStore::default())?;
            monitor
                .initialize(config.initialization())
                .await
                .context("Could not establish a baseline")?;
            Jobs::new()
                .add(monitor, config.poll_interval)
                .run_forever(TICK)
                .await;
        }
        Command::Once => {
            let store = FileStore::new(&config.state_file);
            let mut monitor = build_monitor(&config, store)?;
            let init = monitor
                .initialize(config.initialization())
                .await
                .context("Could not establish a baseline")?;
            if let Initialized::Restored(_) = init {
                let outcome = monitor.cycle().await?;
                tracing::info!(
                    ?outcome,
                    state_file = %monitor.store().path().display(),
                    "cycle finished"
                );
            }
        }
        Command::Schedule => {
            let exe = env::current_exe().context("Could not locate own executable")?;
            let job =
                SubprocessJob::new(exe, vec!["once".to_string()]).with_timeout(CHILD_TIMEOUT);
            tracing::info!(every = ?config.schedule_interval, "scheduler started");
            Jobs::new()
                .add(job, config.schedule_interval)
                .run_forever(TICK)
                .await;
        }
        Command::Target => {
            let monitor = build_monitor(&config, MemoryStore::default())?;
            tracing::info!(
                target_count = config.target_count,
                "watching until target is reached"
            );
            let target =
                TargetMonitor::new(monitor, config.target_count, config.idle_log_interval);
            Jobs::new()
                .add(target, config.poll_interval)
                .run_forever(TICK)
                .await;
        }
    }

    Ok(())
}
