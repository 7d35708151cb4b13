use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vwatch_adapters::VintedClient;
use vwatch_bot::{run_bot, AdminAllowList, CommandHandler, TelegramNotifier};
use vwatch_storage::{MemorySubscriptionStore, SqliteSubscriptionStore, SubscriptionStore};
use vwatch_sync::{
    AppConfig, ListingNotice, LogFormat, Notifier, NotifyError, PollScheduler, Synchronizer,
    TickResult,
};

#[derive(Debug, Parser)]
#[command(name = "vwatch")]
#[command(about = "Vinted search watcher for Telegram")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the bot: poll subscriptions and answer admin commands.
    Run,
    /// Apply database migrations and exit.
    Migrate,
    /// Run a single poll cycle in cold-start mode.
    SyncOnce {
        /// Print notices to stdout and leave watermarks untouched.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the active subscriptions.
    List,
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).init(),
    }
}

/// Writes notices to stdout instead of a chat.
struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send_listing(&self, channel_id: i64, notice: &ListingNotice) -> Result<(), NotifyError> {
        println!("[chat {channel_id}] {} ({})", notice.title, notice.url);
        for field in &notice.fields {
            println!("    {}: {}", field.name, field.value);
        }
        for action in &notice.actions {
            println!("    {} {}: {}", action.emoji, action.label, action.url);
        }
        println!("    {}", notice.footer);
        Ok(())
    }
}

async fn open_store(config: &AppConfig) -> Result<SqliteSubscriptionStore> {
    let store = SqliteSubscriptionStore::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    store.migrate().await.context("running migrations")?;
    Ok(store)
}

fn build_scheduler(
    config: &AppConfig,
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<PollScheduler> {
    let marketplace = VintedClient::new(config.http_client_config())
        .context("building marketplace client")?;
    let synchronizer = Synchronizer::new(Arc::new(marketplace), store, notifier)
        .with_page_size(config.page_size)
        .with_merchant_domain(config.merchant_domain.clone());
    Ok(PollScheduler::new(Arc::new(synchronizer))
        .with_timings(config.poll_interval, config.poll_fallback))
}

async fn run(config: AppConfig) -> Result<()> {
    let token = config.require_bot_token()?;
    let store: Arc<dyn SubscriptionStore> = Arc::new(open_store(&config).await?);
    let bot = Bot::new(token);

    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let scheduler = Arc::new(build_scheduler(&config, Arc::clone(&store), notifier)?);
    let handler = Arc::new(CommandHandler::new(
        store,
        AdminAllowList::new(config.admin_ids.iter().copied()),
    ));

    run_bot(bot, scheduler, handler).await
}

async fn sync_once(config: AppConfig, dry_run: bool) -> Result<()> {
    let sqlite = open_store(&config).await?;

    let store: Arc<dyn SubscriptionStore>;
    let notifier: Arc<dyn Notifier>;
    if dry_run {
        let active = sqlite.find_active().await?;
        store = Arc::new(MemorySubscriptionStore::with_subscriptions(active));
        notifier = Arc::new(StdoutNotifier);
    } else {
        let bot = Bot::new(config.require_bot_token()?);
        store = Arc::new(sqlite);
        notifier = Arc::new(TelegramNotifier::new(bot));
    }

    let scheduler = build_scheduler(&config, store, notifier)?;
    match scheduler.tick().await {
        TickResult::Completed(report) => {
            println!(
                "sync complete: subscriptions={} announced={} failed_searches={} empty_responses={} unpersisted_watermarks={}",
                report.subscriptions,
                report.announced,
                report.failed_searches,
                report.empty_responses,
                report.unpersisted_watermarks
            );
            Ok(())
        }
        TickResult::StoreUnavailable => anyhow::bail!("could not load active subscriptions"),
        TickResult::Skipped => anyhow::bail!("a poll cycle was already in flight"),
    }
}

async fn list(config: AppConfig) -> Result<()> {
    let store = open_store(&config).await?;
    let subscriptions = store.find_active().await?;
    if subscriptions.is_empty() {
        println!("no active subscriptions");
    }
    for subscription in subscriptions {
        let watermark = subscription
            .latest_item_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\tchat={}\tlatest={}\t{}",
            subscription.id, subscription.channel_id, watermark, subscription.url
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Migrate => {
            open_store(&config).await?;
            info!(database_url = %config.database_url, "migrations applied");
            println!("migrations applied to {}", config.database_url);
        }
        Commands::SyncOnce { dry_run } => sync_once(config, dry_run).await?,
        Commands::List => list(config).await?,
    }

    Ok(())
}
