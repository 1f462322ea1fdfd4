//! Tokio driver for a console view model.
//!
//! One task owns the view model and multiplexes user commands, store diffs and the
//! criteria coalescing deadline with `tokio::select!`, so no two refreshes ever
//! interleave.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pulse_core::config::ConsoleConfig;
use pulse_core::{Filters, GroupOptions, Mode, RecordId, SortOptions};
use pulse_store::{LiveChange, RecordStore};

use crate::error::ConsoleError;
use crate::view_model::{ConsoleListViewModel, ConsoleSnapshot, RefreshEvent};

#[derive(Debug)]
pub enum ConsoleCommand {
    SetMode(Mode),
    SetVisible(bool),
    SetSort(SortOptions),
    SetGroup(Option<GroupOptions>),
    UpdateFilters(Filters),
    SetOnlyErrors(bool),
    SetFilterTerm(String),
    Appear(RecordId),
    Disappear(RecordId),
    Refresh,
    Snapshot(oneshot::Sender<ConsoleSnapshot>),
}

/// Client side of a spawned console.
#[derive(Debug)]
pub struct ConsoleHandle {
    commands: mpsc::UnboundedSender<ConsoleCommand>,
    events: broadcast::Sender<RefreshEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsoleHandle {
    pub fn send(&self, command: ConsoleCommand) -> Result<(), ConsoleError> {
        self.commands.send(command).map_err(|_| ConsoleError::Closed)
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), ConsoleError> {
        self.send(ConsoleCommand::SetMode(mode))
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), ConsoleError> {
        self.send(ConsoleCommand::SetVisible(visible))
    }

    pub fn set_filter_term(&self, term: &str) -> Result<(), ConsoleError> {
        self.send(ConsoleCommand::SetFilterTerm(term.to_owned()))
    }

    pub fn set_only_errors(&self, only_errors: bool) -> Result<(), ConsoleError> {
        self.send(ConsoleCommand::SetOnlyErrors(only_errors))
    }

    pub fn update_filters(&self, filters: Filters) -> Result<(), ConsoleError> {
        self.send(ConsoleCommand::UpdateFilters(filters))
    }

    /// Current state, observed after every previously sent command.
    pub async fn snapshot(&self) -> Result<ConsoleSnapshot, ConsoleError> {
        let (tx, rx) = oneshot::channel();
        self.send(ConsoleCommand::Snapshot(tx))?;
        rx.await.map_err(|_| ConsoleError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the console task and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), ConsoleError> {
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }
}

enum Step {
    Shutdown,
    Command(ConsoleCommand),
    Change(LiveChange),
    Deadline,
}

/// Spawn a view model over `store` on the current tokio runtime.
pub fn spawn_console(store: Arc<dyn RecordStore>, config: &ConsoleConfig) -> ConsoleHandle {
    let model = ConsoleListViewModel::new(store, config);
    let events = model.event_sender();
    let (commands, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_console(model, receiver, cancel.clone()));
    ConsoleHandle {
        commands,
        events,
        cancel,
        task,
    }
}

async fn run_console(
    mut model: ConsoleListViewModel,
    mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
    cancel: CancellationToken,
) {
    tracing::debug!("console task started");
    loop {
        let deadline = model.next_deadline();
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Shutdown,
            command = commands.recv() => match command {
                Some(command) => Step::Command(command),
                None => Step::Shutdown,
            },
            _ = wait_until(deadline) => Step::Deadline,
            change = model.next_change() => match change {
                Some(change) => Step::Change(change),
                None => Step::Shutdown,
            },
        };

        // Events reach subscribers through the model's own channel.
        let event = match step {
            Step::Shutdown => break,
            Step::Command(command) => apply_command(&mut model, command),
            Step::Change(change) => model.handle_store_change(change),
            Step::Deadline => model.tick(Instant::now()),
        };
        if let Some(event) = event {
            tracing::trace!(generation = event.generation, kind = ?event.kind, "published");
        }
    }
    tracing::debug!("console task stopped");
}

fn apply_command(
    model: &mut ConsoleListViewModel,
    command: ConsoleCommand,
) -> Option<RefreshEvent> {
    let now = Instant::now();
    match command {
        ConsoleCommand::SetMode(mode) => model.set_mode(mode),
        ConsoleCommand::SetVisible(visible) => model.set_visible(visible),
        ConsoleCommand::SetSort(sort) => model.set_sort(sort),
        ConsoleCommand::SetGroup(group) => model.set_group(group),
        ConsoleCommand::UpdateFilters(filters) => {
            model.update_filters(filters, now);
            model.tick(now)
        }
        ConsoleCommand::SetOnlyErrors(only_errors) => {
            model.set_only_errors(only_errors, now);
            model.tick(now)
        }
        ConsoleCommand::SetFilterTerm(term) => {
            model.set_filter_term(&term, now);
            model.tick(now)
        }
        ConsoleCommand::Appear(id) => model.on_appear(id),
        ConsoleCommand::Disappear(id) => model.on_disappear(id),
        ConsoleCommand::Refresh => model.refresh(),
        ConsoleCommand::Snapshot(reply) => {
            if reply.send(model.snapshot()).is_err() {
                tracing::trace!("snapshot requester went away");
            }
            None
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
