//! stagefeed CLI - streams normalized chat and live events as JSON lines.
//!
//! This is the main binary entry point. See the `stagefeed` library for the
//! protocol clients and the event bus.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use stagefeed::chat::{ChatClient, MemoryChatHistory};
use stagefeed::live::LiveEventsClient;
use stagefeed::transport::WsConnector;
use stagefeed::{ClientContext, Config, EventBus, HelixProvider};
use tokio::io::AsyncBufReadExt;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Version of this binary.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI
#[derive(Parser)]
#[command(name = "stagefeed")]
#[command(version = VERSION)]
#[command(about = "Ingests stream chat and live events into one JSON event stream")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print every event as one JSON line on stdout
    Watch {
        /// Chat channel to join (overrides config)
        #[arg(long)]
        channel: Option<String>,
        /// Broadcaster id for live events (overrides config)
        #[arg(long)]
        broadcaster_id: Option<String>,
        /// Do not read chat messages to send from stdin
        #[arg(long)]
        no_input: bool,
    },
    /// Show the config, one key, or set a key
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

fn main() -> Result<()> {
    // stdout carries events; logs go to stderr or STAGEFEED_LOG_FILE
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    logger.format_timestamp_secs();
    if let Ok(path) = std::env::var("STAGEFEED_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        logger.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    logger.init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            channel,
            broadcaster_id,
            no_input,
        } => {
            let mut config = Config::load()?;
            if let Some(channel) = channel {
                config.channel = channel;
            }
            if let Some(broadcaster_id) = broadcaster_id {
                config.broadcaster_id = broadcaster_id;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?;
            runtime.block_on(run_watch(config, !no_input))?;
        }
        Commands::Config { key, value } => {
            let mut config = Config::load()?;
            match (key, value) {
                (None, None) => println!("{}", serde_json::to_string_pretty(&config)?),
                (Some(k), None) => {
                    let json = serde_json::to_value(&config)?;
                    match json.get(&k) {
                        Some(v) => println!("{v}"),
                        None => bail!("Unknown config key '{k}'"),
                    }
                }
                (Some(k), Some(v)) => {
                    set_config_key(&mut config, &k, v)?;
                    config.save()?;
                    println!("Saved {k}");
                }
                (None, Some(_)) => bail!("A key is required to set a value"),
            }
        }
    }

    Ok(())
}

fn set_config_key(config: &mut Config, key: &str, value: String) -> Result<()> {
    let field = match key {
        "channel" => &mut config.channel,
        "broadcaster_id" => &mut config.broadcaster_id,
        "client_id" => &mut config.client_id,
        "username" => &mut config.username,
        "chat_url" => &mut config.chat_url,
        "eventsub_url" => &mut config.eventsub_url,
        "helix_url" => &mut config.helix_url,
        "token" => bail!("The token is read from STAGEFEED_TOKEN and never saved"),
        other => bail!("Config key '{other}' cannot be set from the command line"),
    };
    *field = value;
    Ok(())
}

async fn run_watch(config: Config, read_input: bool) -> Result<()> {
    log::info!("Starting stagefeed v{}", VERSION);

    let bus = EventBus::new();
    let printer = bus.subscribe(|event| match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("Failed to encode {} event: {}", event.kind, e),
    });

    let rpc = HelixProvider::new(
        &config.helix_url,
        &config.client_id,
        &config.token,
        &config.username,
    )?;
    let ctx = ClientContext::new(Arc::new(WsConnector), Arc::new(rpc), bus.clone());

    let chat = ChatClient::spawn(
        ctx.clone(),
        config.chat_settings(),
        Arc::new(|connected: bool| log::info!("[Chat] connected={}", connected)),
        Arc::new(MemoryChatHistory::default()),
    );
    if config.channel.is_empty() {
        log::warn!("No channel configured, chat stays offline");
    } else {
        chat.connect(&config.channel).await?;
    }

    let live = LiveEventsClient::spawn(
        ctx,
        config.live_settings(),
        Arc::new(|connected: bool| log::info!("[EventSub] connected={}", connected)),
    );
    if config.broadcaster_id.is_empty() || !config.has_token() {
        log::warn!("Live events need a broadcaster id and STAGEFEED_TOKEN, skipping");
    } else {
        live.connect(&config.broadcaster_id).await?;
    }

    let mut input = read_input.then(|| tokio::io::BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                log::info!("Shutting down...");
                break;
            }
            line = next_input(&mut input) => match line {
                Ok(Some(line)) => {
                    if !chat.send_chat_message(&line).await? {
                        log::warn!("[Chat] Not connected, message not sent");
                    }
                }
                Ok(None) => {
                    log::debug!("stdin closed");
                    input = None;
                }
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    input = None;
                }
            },
        }
    }

    chat.shutdown().await;
    live.shutdown().await;
    printer.unsubscribe();
    Ok(())
}

async fn next_input(
    input: &mut Option<tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>>,
) -> std::io::Result<Option<String>> {
    match input.as_mut() {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
