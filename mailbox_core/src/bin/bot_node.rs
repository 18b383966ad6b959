use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::runtime::Handle;
use tracing::info;

use mailbox_core::{
    load_bus_config_from_env, shutdown_on, BotBehavior, Poller, Publisher, TargetFilter,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one bot against the shared command mailbox")]
struct Args {
    /// Identity used to filter targeted commands.
    #[arg(long)]
    bot_id: String,
    /// Mailbox file; overrides the config and COMMAND_BUS_PATH.
    #[arg(long)]
    mailbox: Option<PathBuf>,
    /// Poll period in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Poll a single time and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let (mut config, _) = load_bus_config_from_env();
    if let Some(path) = args.mailbox {
        config = config.with_mailbox_path(path);
    }
    if let Some(interval_ms) = args.interval_ms {
        config = config.with_poll_interval_ms(interval_ms);
    }

    let mailbox = config.open_mailbox();
    let behavior = BotBehavior::new(
        args.bot_id.clone(),
        Publisher::new(mailbox.clone()),
        Handle::current(),
    );
    let mut poller = Poller::new(mailbox, TargetFilter::new(args.bot_id.clone(), behavior));

    info!(
        target: "command_bus::bot_node",
        bot = %args.bot_id,
        mailbox = %config.mailbox_path().display(),
        interval_ms = config.poll_interval().as_millis() as u64,
        "bot_node ready"
    );

    if args.once {
        let outcome = poller
            .poll()
            .with_context(|| format!("clearing mailbox {}", config.mailbox_path().display()))?;
        info!(target: "command_bus::bot_node", ?outcome, "bot_node.polled_once");
        return Ok(());
    }

    let shutdown = shutdown_on(tokio::signal::ctrl_c());
    let stats = poller.run(config.poll_interval(), shutdown).await;
    info!(
        target: "command_bus::bot_node",
        delivered = stats.delivered,
        skipped = stats.skipped,
        handler_failures = stats.handler_failures,
        clear_failures = stats.clear_failures,
        "bot_node.exited"
    );
    Ok(())
}
