use std::sync::Arc;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    courier_engine::{Monitor, RelayConfig, RelayMode, Transport},
    courier_store::{RelayStore, SqliteStore},
    courier_telegram::{TelegramConfig, TelegramTransport},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier — channel document relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Source channels to poll, comma separated.
    #[arg(long, env = "SOURCE_CHANNELS", value_delimiter = ',')]
    source_channels: Vec<String>,

    /// Destination channel.
    #[arg(long, env = "DESTINATION_CHANNEL", default_value = "")]
    destination: String,

    /// Target file extension, including the leading dot.
    #[arg(long, env = "TARGET_EXTENSION", default_value = ".npvt")]
    target_extension: String,

    /// Messages fetched per channel per cycle.
    #[arg(long, env = "MESSAGES_TO_CHECK", default_value_t = 5)]
    messages_to_check: usize,

    /// Seconds between monitoring cycles.
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 300)]
    check_interval: u64,

    /// Prefix for generated filenames.
    #[arg(long, env = "FILE_PREFIX", default_value = "Relay_")]
    file_prefix: String,

    /// Embed the sequence number in generated filenames.
    #[arg(
        long,
        env = "SHOW_SEQUENCE_NUMBER",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    show_sequence: bool,

    /// Relay mode: reupload or forward.
    #[arg(long, env = "RELAY_MODE", default_value = "reupload")]
    mode: String,

    /// Rename files in reupload mode. When off, files keep their sanitized
    /// original name.
    #[arg(
        long,
        env = "RENAME_FILES",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    rename: bool,

    /// Bot token.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:courier.db?mode=rwc")]
    database_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay monitor (default when no subcommand is provided).
    Run,
    /// Print ledger statistics and exit.
    Stats,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn parse_mode(mode: &str) -> anyhow::Result<RelayMode> {
    match mode.trim().to_lowercase().as_str() {
        "reupload" => Ok(RelayMode::Reupload),
        "forward" => Ok(RelayMode::Forward),
        other => anyhow::bail!("unknown relay mode: {other} (expected reupload or forward)"),
    }
}

fn relay_config(cli: &Cli) -> anyhow::Result<RelayConfig> {
    Ok(RelayConfig {
        source_channels: cli
            .source_channels
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
        destination: cli.destination.clone(),
        target_extension: cli.target_extension.clone(),
        messages_to_check: cli.messages_to_check,
        check_interval_secs: cli.check_interval,
        file_prefix: cli.file_prefix.clone(),
        show_sequence: cli.show_sequence,
        mode: parse_mode(&cli.mode)?,
        rename: cli.rename,
        ..Default::default()
    })
}

async fn run_monitor(cli: &Cli) -> anyhow::Result<()> {
    let config = relay_config(cli)?;
    if cli.token.trim().is_empty() {
        anyhow::bail!("TELEGRAM_BOT_TOKEN is required");
    }

    let store = Arc::new(
        SqliteStore::new(&cli.database_url)
            .await
            .context("failed to open relay database")?,
    );
    let transport = Arc::new(TelegramTransport::new(&TelegramConfig::new(
        cli.token.clone(),
    ))?);

    let session = transport.connect().await?;
    info!(
        user = %session.display_name,
        username = ?session.username,
        "authenticated"
    );
    if let Err(e) = store.log_activity("AUTH_SUCCESS", &session.display_name).await {
        warn!(error = %e, "failed to append activity record");
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, finishing in-flight work");
            signal_cancel.cancel();
        }
    });

    let monitor = Monitor::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&store) as Arc<dyn RelayStore>,
        config,
        cancel,
    )?;
    let result = monitor.run().await;

    transport.disconnect().await;
    store.close().await;
    result?;
    Ok(())
}

async fn print_stats(cli: &Cli) -> anyhow::Result<()> {
    let store = SqliteStore::new(&cli.database_url)
        .await
        .context("failed to open relay database")?;
    let stats = store.file_statistics().await?;

    println!("Total relayed files: {}", stats.total_files);
    println!("Current sequence:    {}", stats.current_sequence);
    if !stats.by_channel.is_empty() {
        println!("\nBy channel:");
        for entry in &stats.by_channel {
            println!("  {:<30} {}", entry.channel, entry.count);
        }
    }
    if !stats.recent.is_empty() {
        println!("\nRecent files:");
        for file in &stats.recent {
            println!(
                "  #{:04} {} ({})",
                file.sequence, file.new_filename, file.processed_at
            );
        }
    }

    store.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    match cli.command {
        None | Some(Commands::Run) => run_monitor(&cli).await,
        Some(Commands::Stats) => print_stats(&cli).await,
    }
}
