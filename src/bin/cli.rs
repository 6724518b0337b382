//! Kijiji bot CLI
//!
//! Runs the scrape scheduler, single ticks, and admin commands against the
//! local database.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kijiji_bot::{
    commands::{CommandContext, CommandHandler},
    error::{AppError, Result},
    models::{ChannelId, Config, ServerId, State, UserId},
    pipeline::{self, Pipeline, Scheduler, TickReport},
    publisher::{ChatDirectory, ConsolePublisher, DiscordClient, OfflineDirectory, Publisher},
    services::{ListingExtractor, ListingFetcher},
    storage::{ListingStore, SqliteStore},
};
use tokio::sync::Mutex;

/// Kijiji ad watcher for Discord
#[derive(Parser, Debug)]
#[command(
    name = "kijiji-bot",
    version,
    about = "Posts new Kijiji ads into Discord channels"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "kijiji-bot.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape on the configured interval until interrupted
    Run {
        /// Log ads instead of posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single tick now
    Tick {
        /// Log ads instead of posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute a chat command as a given user, e.g. `exec -s 1 -u 2 -c 3 "?listurls"`
    Exec {
        #[arg(short, long)]
        server: String,

        #[arg(short, long)]
        user: String,

        /// Channel the command is issued from
        #[arg(short, long)]
        channel: String,

        /// Command text including the prefix
        text: String,
    },

    /// Validate configuration and selectors
    Validate,

    /// Delete seen-ad records older than the retention window
    Prune {
        /// Age in days (default: scheduler.seen_retention_days)
        #[arg(long)]
        days: Option<u64>,
    },
}

/// Initialize logging; `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Shared pieces every subcommand needs.
struct Components {
    store: Arc<SqliteStore>,
    state: Arc<Mutex<State>>,
    fetcher: Arc<ListingFetcher>,
}

async fn bootstrap(config: &Config) -> Result<Components> {
    let store = Arc::new(SqliteStore::open(&config.storage.db_path)?);
    let state = pipeline::load_state(store.as_ref()).await?;
    let fetcher = ListingFetcher::from_config(config)?;

    Ok(Components {
        store,
        state: Arc::new(Mutex::new(state)),
        fetcher: Arc::new(fetcher),
    })
}

/// Connect to Discord unless this is a dry run.
fn discord_client(config: &Config, dry_run: bool) -> Result<Option<Arc<DiscordClient>>> {
    if dry_run {
        log::info!("Dry run: ads are logged, not posted");
        return Ok(None);
    }
    config.require_token()?;
    Ok(Some(Arc::new(DiscordClient::new(
        &config.bot,
        &config.crawler,
    )?)))
}

fn build_pipeline(
    config: &Config,
    components: &Components,
    discord: Option<&Arc<DiscordClient>>,
) -> Arc<Pipeline> {
    let publisher: Arc<dyn Publisher> = match discord {
        Some(client) => Arc::clone(client) as Arc<dyn Publisher>,
        None => Arc::new(ConsolePublisher),
    };
    Arc::new(Pipeline::new(
        components.store.clone(),
        Arc::clone(&components.state),
        Arc::clone(&components.fetcher),
        publisher,
        config,
    ))
}

/// Warn about bindings whose channel no longer resolves.
async fn check_channels(pipeline: &Pipeline, directory: &dyn ChatDirectory) {
    for (server, channel) in pipeline.bound_channels().await {
        match directory.resolve_channel(&server, channel.as_str()).await {
            Ok(Some(_)) => {}
            Ok(None) => log::warn!(
                "Channel {} bound to server {} cannot be found; ads will fail to post",
                channel,
                server
            ),
            Err(e) => log::warn!(
                "Could not verify channel {} of server {}: {}",
                channel,
                server,
                e
            ),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn log_report(report: &TickReport) {
    if report.fetch_failures > 0 || report.publish_errors > 0 || report.store_errors > 0 {
        log::warn!("Tick completed with errors: {:?}", report);
    } else {
        log::info!("Tick completed: {:?}", report);
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logging depends on the config, so report load failures afterwards.
    let (mut config, load_error) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_env();
    init_logging(&config, cli.verbose);

    log::info!("Kijiji bot starting...");
    match load_error {
        None => log::info!("Loaded configuration from {}", cli.config.display()),
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        ),
    }
    config.validate()?;

    match cli.command {
        Command::Run { dry_run } => {
            let discord = discord_client(&config, dry_run)?;
            let components = bootstrap(&config).await?;
            let pipeline = build_pipeline(&config, &components, discord.as_ref());

            if let Some(client) = &discord {
                check_channels(&pipeline, client.as_ref()).await;
            }

            Scheduler::from_config(pipeline, &config.scheduler)
                .run(shutdown_signal())
                .await;
        }

        Command::Tick { dry_run } => {
            let discord = discord_client(&config, dry_run)?;
            let components = bootstrap(&config).await?;
            let pipeline = build_pipeline(&config, &components, discord.as_ref());

            let report = pipeline.run().await;
            log_report(&report);
        }

        Command::Exec {
            server,
            user,
            channel,
            text,
        } => {
            let components = bootstrap(&config).await?;
            let directory: Arc<dyn ChatDirectory> = if config.require_token().is_ok() {
                Arc::new(DiscordClient::new(&config.bot, &config.crawler)?)
            } else {
                log::warn!("No bot token; channel names cannot be resolved");
                Arc::new(OfflineDirectory)
            };

            let handler = CommandHandler::new(
                components.store.clone(),
                components.state,
                components.fetcher,
                directory,
                &config,
            );
            let ctx = CommandContext {
                server: ServerId::from(server),
                user: UserId::from(user),
                channel: ChannelId::from(channel),
            };

            match handler.handle_message(&ctx, &text).await {
                Some(reply) => println!("{reply}"),
                None => {
                    return Err(AppError::validation(format!(
                        "'{text}' is not a command (prefix is '{}')",
                        config.bot.prefix
                    )));
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            ListingExtractor::new(&config.selectors, &config.crawler.site_url)?;
            log::info!("✓ Config OK (selectors compile)");

            match config.require_token() {
                Ok(_) => log::info!("✓ Bot token present"),
                Err(e) => log::warn!("{}", e),
            }

            log::info!("All validations passed!");
        }

        Command::Prune { days } => {
            let days = days.unwrap_or(config.scheduler.seen_retention_days);
            if days == 0 {
                return Err(AppError::config(
                    "No retention window; pass --days or set scheduler.seen_retention_days",
                ));
            }

            let store = SqliteStore::open(&config.storage.db_path)?;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);
            let removed = store.prune_seen(cutoff).await?;
            log::info!("Removed {} seen-ad record(s) older than {} day(s)", removed, days);
        }
    }

    log::info!("Done!");

    Ok(())
}
