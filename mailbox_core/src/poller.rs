//! Fixed-interval delivery loop.
//!
//! A [`Poller`] owns one store handle, exactly one handler, and the signature
//! of the last command it delivered. Each tick reads the slot; content that
//! differs from the last-seen signature is handed to the handler once, then
//! the slot is cleared.

use std::any::Any;
use std::future::{self, Future};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use bus_runtime::{Command, CommandSignature};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::publisher::Publisher;
use crate::store::{MailboxError, MailboxSlot, MailboxStore};

/// Error reported by a command handler. It never stops the poll loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// The single inbox callback of a poller.
///
/// Handlers that start long-running work should spawn it and return, so the
/// next tick is not delayed. Invocations may therefore overlap with work from
/// earlier commands.
pub trait CommandHandler: Send {
    fn handle(&mut self, command: &Command) -> Result<(), HandlerError>;

    /// Whether this handler acts on `command` at all. The poller consumes
    /// commands a handler declines without calling [`CommandHandler::handle`].
    fn accepts(&self, _command: &Command) -> bool {
        true
    }
}

impl<F> CommandHandler for F
where
    F: FnMut(&Command) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, command: &Command) -> Result<(), HandlerError> {
        self(command)
    }
}

/// Handler adapter that only forwards commands addressed to one bot.
///
/// Commands for other bots are declined and reported as
/// [`PollOutcome::Skipped`]. The poller still clears them: whoever polls first
/// consumes the slot.
#[derive(Debug)]
pub struct TargetFilter<H> {
    bot_id: String,
    inner: H,
}

impl<H> TargetFilter<H> {
    pub fn new(bot_id: impl Into<String>, inner: H) -> Self {
        Self {
            bot_id: bot_id.into(),
            inner,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }
}

impl<H: CommandHandler> CommandHandler for TargetFilter<H> {
    fn accepts(&self, command: &Command) -> bool {
        command.is_addressed_to(&self.bot_id) && self.inner.accepts(command)
    }

    fn handle(&mut self, command: &Command) -> Result<(), HandlerError> {
        if !command.is_addressed_to(&self.bot_id) {
            trace!(
                target: "command_bus::poller",
                bot = %self.bot_id,
                action = command.action(),
                addressed_to = command.target.as_deref().unwrap_or("-"),
                "command.ignored=other_target"
            );
            return Ok(());
        }
        self.inner.handle(command)
    }
}

/// Result of one poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing pending (or the slot could not be read).
    Empty,
    /// Pending content matches what this poller already delivered.
    Unchanged,
    /// The handler declined the command (e.g. addressed to another bot). The
    /// slot was still cleared.
    Skipped { action: String },
    Delivered { action: String },
    HandlerFailed { action: String, error: String },
}

impl PollOutcome {
    /// True when the handler was invoked on this tick.
    pub fn dispatched(&self) -> bool {
        matches!(
            self,
            PollOutcome::Delivered { .. } | PollOutcome::HandlerFailed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub ticks: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub handler_failures: u64,
    pub clear_failures: u64,
}

pub struct Poller<S, H> {
    store: S,
    handler: H,
    last_seen: Option<CommandSignature>,
    stats: PollStats,
}

impl<S, H> Poller<S, H>
where
    S: MailboxStore,
    H: CommandHandler,
{
    pub fn new(store: S, handler: H) -> Self {
        Self {
            store,
            handler,
            last_seen: None,
            stats: PollStats::default(),
        }
    }

    /// Start from a known last-seen signature instead of none.
    pub fn with_last_seen(mut self, signature: Option<CommandSignature>) -> Self {
        self.last_seen = signature;
        self
    }

    pub fn last_seen(&self) -> Option<CommandSignature> {
        self.last_seen
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Publisher over the same store, for handlers that reply with commands.
    pub fn publisher(&self) -> Publisher<S>
    where
        S: Clone,
    {
        Publisher::new(self.store.clone())
    }

    /// Run one tick.
    ///
    /// Returns `Err` only when clearing the slot after a delivery failed. The
    /// delivered command is still recorded as seen, so this poller will not
    /// deliver it a second time.
    pub fn poll(&mut self) -> Result<PollOutcome, MailboxError> {
        self.stats.ticks += 1;

        let MailboxSlot::Pending(command) = self.store.read() else {
            return Ok(PollOutcome::Empty);
        };
        let signature = command
            .signature()
            .map_err(|source| MailboxError::Encode {
                location: self.store.location(),
                action: command.action().to_string(),
                source,
            })?;
        if self.last_seen == Some(signature) {
            return Ok(PollOutcome::Unchanged);
        }
        self.last_seen = Some(signature);

        let action = command.action().to_string();
        let outcome = if !self.handler.accepts(&command) {
            self.stats.skipped += 1;
            debug!(
                target: "command_bus::poller",
                action = %action,
                addressed_to = command.target.as_deref().unwrap_or("-"),
                %signature,
                "mailbox.skipped=not_accepted"
            );
            PollOutcome::Skipped { action }
        } else {
            self.dispatch_logged(&command, action, signature)
        };

        if let Err(err) = self.store.clear() {
            self.stats.clear_failures += 1;
            return Err(err);
        }
        Ok(outcome)
    }

    fn dispatch_logged(
        &mut self,
        command: &Command,
        action: String,
        signature: CommandSignature,
    ) -> PollOutcome {
        match self.dispatch(command) {
            Ok(()) => {
                self.stats.delivered += 1;
                info!(
                    target: "command_bus::poller",
                    action = %action,
                    addressed_to = command.target.as_deref().unwrap_or("-"),
                    %signature,
                    "mailbox.delivered"
                );
                PollOutcome::Delivered { action }
            }
            Err(err) => {
                self.stats.handler_failures += 1;
                warn!(
                    target: "command_bus::poller",
                    action = %action,
                    error = %err,
                    "mailbox.handler_failed"
                );
                PollOutcome::HandlerFailed {
                    action,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Poll on a fixed interval until `shutdown` becomes `true` or its sender
    /// is dropped. Missed ticks are skipped rather than bunched up.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> PollStats {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target: "command_bus::poller",
            location = %self.store.location(),
            interval_ms = interval.as_millis() as u64,
            "poller.started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll() {
                        Ok(outcome) => trace!(
                            target: "command_bus::poller",
                            ?outcome,
                            "poller.tick"
                        ),
                        Err(err) => warn!(
                            target: "command_bus::poller",
                            error = %err,
                            "mailbox.clear_failed"
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!(target: "command_bus::poller", "poller.shutdown_sender_dropped");
                        break;
                    }
                }
            }
        }

        info!(
            target: "command_bus::poller",
            ticks = self.stats.ticks,
            delivered = self.stats.delivered,
            skipped = self.stats.skipped,
            handler_failures = self.stats.handler_failures,
            "poller.stopped"
        );
        self.stats
    }

    fn dispatch(&mut self, command: &Command) -> Result<(), HandlerError> {
        let handler = &mut self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(command))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

/// Shutdown channel for [`Poller::run`] that flips to `true` once `signal`
/// resolves.
///
/// If the signal cannot be installed the sender is held forever, so the loop
/// keeps running instead of stopping at once. Must be called inside a tokio
/// runtime.
pub fn shutdown_on<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!(target: "command_bus::poller", "poller.shutdown_requested");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                warn!(
                    target: "command_bus::poller",
                    error = %err,
                    "poller.shutdown_signal_unavailable"
                );
                future::pending::<()>().await;
            }
        }
    });
    shutdown_rx
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
