//! Stock bot behaviour used by `bot_node`.

use std::time::Duration;

use bus_runtime::{BuildWallParams, Command, CommandKind, TaskReport};
use serde_json::json;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::poller::{CommandHandler, HandlerError};
use crate::publisher::Publisher;
use crate::store::MailboxStore;

/// Recipient of build completion reports.
pub const ORCHESTRATOR_ID: &str = "grand_orchestrator";

const DEFAULT_LAYER_DELAY: Duration = Duration::from_millis(500);

/// Handler for one bot process.
///
/// Work commands spawn tasks on the given runtime and return immediately, so
/// a long build never holds up the next poll.
pub struct BotBehavior<S> {
    bot_id: String,
    publisher: Publisher<S>,
    runtime: Handle,
    paused: bool,
    builds: Vec<JoinHandle<()>>,
    layer_delay: Duration,
}

impl<S> BotBehavior<S>
where
    S: MailboxStore + Clone + 'static,
{
    pub fn new(bot_id: impl Into<String>, publisher: Publisher<S>, runtime: Handle) -> Self {
        Self {
            bot_id: bot_id.into(),
            publisher,
            runtime,
            paused: false,
            builds: Vec::new(),
            layer_delay: DEFAULT_LAYER_DELAY,
        }
    }

    pub fn with_layer_delay(mut self, delay: Duration) -> Self {
        self.layer_delay = delay;
        self
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Builds spawned and not yet finished.
    pub fn active_builds(&mut self) -> usize {
        self.builds.retain(|build| !build.is_finished());
        self.builds.len()
    }

    fn is_work(kind: &CommandKind) -> bool {
        matches!(
            kind,
            CommandKind::Start(_)
                | CommandKind::BuildWall(_)
                | CommandKind::StartWork(_)
                | CommandKind::StartRecording(_)
                | CommandKind::ExecuteShot(_)
        )
    }

    fn stop_all(&mut self, reason: Option<&str>) {
        let aborted = self.builds.len();
        for build in self.builds.drain(..) {
            build.abort();
        }
        self.paused = false;
        info!(
            target: "command_bus::bot",
            bot = %self.bot_id,
            reason = reason.unwrap_or("-"),
            aborted,
            "bot.stopped_all"
        );
    }

    fn spawn_build(&mut self, params: &BuildWallParams) {
        self.builds.retain(|build| !build.is_finished());

        let bot_id = self.bot_id.clone();
        let publisher = self.publisher.clone();
        let delay = self.layer_delay;
        let params = params.clone();
        info!(
            target: "command_bus::bot",
            bot = %bot_id,
            x = params.x,
            y = params.y,
            z = params.z,
            height = params.height,
            material = %params.material,
            "bot.build_started"
        );

        let build = self.runtime.spawn(async move {
            for layer in 1..=params.height {
                tokio::time::sleep(delay).await;
                let y = i64::from(params.y) + i64::from(layer) - 1;
                debug!(
                    target: "command_bus::bot",
                    bot = %bot_id,
                    layer,
                    y,
                    "bot.layer_placed"
                );
            }

            let report = Command::targeted(
                ORCHESTRATOR_ID,
                CommandKind::TaskComplete(TaskReport {
                    bot_name: bot_id.clone(),
                    task_id: "build_wall".to_string(),
                    success: true,
                    result: json!({
                        "blocksPlaced": params.height,
                        "material": params.material,
                    }),
                    ..TaskReport::default()
                }),
            );
            match publisher.publish(&report) {
                Ok(()) => info!(
                    target: "command_bus::bot",
                    bot = %bot_id,
                    blocks = params.height,
                    "bot.build_completed"
                ),
                Err(err) => warn!(
                    target: "command_bus::bot",
                    bot = %bot_id,
                    error = %err,
                    "bot.report_failed"
                ),
            }
        });
        self.builds.push(build);
    }
}

impl<S> CommandHandler for BotBehavior<S>
where
    S: MailboxStore + Clone + 'static,
{
    fn handle(&mut self, command: &Command) -> Result<(), HandlerError> {
        if self.paused && Self::is_work(&command.kind) {
            info!(
                target: "command_bus::bot",
                bot = %self.bot_id,
                action = command.action(),
                "bot.skipped=paused"
            );
            return Ok(());
        }

        match &command.kind {
            CommandKind::Ping => {
                info!(target: "command_bus::bot", bot = %self.bot_id, "pong");
            }
            CommandKind::Pause => {
                self.paused = true;
                info!(target: "command_bus::bot", bot = %self.bot_id, "bot.paused");
            }
            CommandKind::Resume => {
                self.paused = false;
                info!(target: "command_bus::bot", bot = %self.bot_id, "bot.resumed");
            }
            CommandKind::StopAll { reason } => self.stop_all(reason.as_deref()),
            CommandKind::BuildWall(params) => self.spawn_build(params),
            CommandKind::StartWork(assignment) => {
                info!(
                    target: "command_bus::bot",
                    bot = %self.bot_id,
                    zone = %assignment.zone,
                    quota = assignment.quota,
                    "bot.work_assigned"
                );
            }
            CommandKind::Chat { message } => {
                info!(
                    target: "command_bus::bot",
                    bot = %self.bot_id,
                    message = %message,
                    "bot.chat"
                );
            }
            other => {
                debug!(
                    target: "command_bus::bot",
                    bot = %self.bot_id,
                    action = other.action(),
                    "bot.no_op"
                );
            }
        }
        Ok(())
    }
}
