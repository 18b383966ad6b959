use std::{fs, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use bus_runtime::{parse_command_line, Params};
use clap::{Parser, Subcommand};
use mailbox_core::{
    load_bus_config_from_env, shutdown_on, BusConfig, Command, FileMailbox, HandlerError,
    MailboxSlot, MailboxStore, Poller, Publisher,
};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[command(author, version, about = "Operator tool for the shared command mailbox", long_about = None)]
struct Args {
    /// Mailbox file; overrides the config and COMMAND_BUS_PATH.
    #[arg(long, global = true)]
    mailbox: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Publish a command built from a verb, target and params.
    Publish {
        #[arg(long)]
        action: String,
        #[arg(long)]
        target: Option<String>,
        /// Params object: inline JSON, or @path to a JSON file.
        #[arg(long)]
        params: Option<String>,
    },
    /// Publish a command written as a text line, e.g. `build_wall wall_builder_01 height=7`.
    Send {
        #[arg(required = true, trailing_var_arg = true)]
        line: Vec<String>,
    },
    /// Print the pending command without consuming it.
    Read,
    /// Reset the mailbox to empty.
    Clear,
    /// Consume and print commands until Ctrl-C.
    Watch {
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (mut config, _) = load_bus_config_from_env();
    if let Some(path) = args.mailbox {
        config = config.with_mailbox_path(path);
    }
    let mailbox = config.open_mailbox();

    match args.command {
        Action::Publish {
            action,
            target,
            params,
        } => {
            let params = match params {
                Some(raw) => parse_params(&raw)?,
                None => Params::new(),
            };
            let command = Publisher::new(mailbox.clone())
                .send(&action, target.as_deref(), params)
                .with_context(|| format!("Failed to publish {action}"))?;
            print_command(&command)?;
        }
        Action::Send { line } => {
            let line = line.join(" ");
            let command = parse_command_line(&line)
                .with_context(|| format!("Unable to parse command line '{line}'"))?;
            mailbox
                .publish(&command)
                .with_context(|| format!("Failed to publish {}", command.action()))?;
            print_command(&command)?;
        }
        Action::Read => match mailbox.read_slot() {
            Ok(MailboxSlot::Pending(command)) => print_command(&command)?,
            Ok(MailboxSlot::Empty) => println!("(empty)"),
            Err(err) => {
                eprintln!("warning: {err}");
                println!("(empty)");
            }
        },
        Action::Clear => {
            mailbox.clear().context("Failed to clear mailbox")?;
        }
        Action::Watch { interval_ms } => {
            let config = match interval_ms {
                Some(interval_ms) => config.with_poll_interval_ms(interval_ms),
                None => config,
            };
            watch_mailbox(mailbox, &config)?;
        }
    }

    Ok(())
}

fn parse_params(raw: &str) -> Result<Params> {
    let json = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file {path}"))?,
        None => raw.to_string(),
    };
    match serde_json::from_str::<JsonValue>(&json).context("Params must be valid JSON")? {
        JsonValue::Object(params) => Ok(params),
        other => bail!("Params must be a JSON object, got {other}"),
    }
}

fn print_command(command: &Command) -> Result<()> {
    println!("{}", command.to_json_pretty()?);
    Ok(())
}

fn watch_mailbox(mailbox: FileMailbox, config: &BusConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let interval: Duration = config.poll_interval();
    runtime.block_on(async move {
        let shutdown = shutdown_on(tokio::signal::ctrl_c());

        let mut poller = Poller::new(mailbox, |command: &Command| -> Result<(), HandlerError> {
            let json = command
                .to_json_compact()
                .map_err(|err| HandlerError::failed(err.to_string()))?;
            println!("{json}");
            Ok(())
        });
        let stats = poller.run(interval, shutdown).await;
        if stats.clear_failures > 0 {
            return Err(anyhow!(
                "{} command(s) could not be cleared",
                stats.clear_failures
            ));
        }
        Ok(())
    })
}
