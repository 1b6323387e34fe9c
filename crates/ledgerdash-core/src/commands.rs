use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::chat::{ChatClient, ChatHistory};
use crate::cli::{
    ChatCommand, Command, ReminderAddArgs, ReminderCommand, TodoAddArgs, TodoCommand, join_words,
};
use crate::config::Config;
use crate::datastore::Storage;
use crate::datetime::Clock;
use crate::notify::{CHECK_PERIOD, ReminderWatcher, TerminalNotifier};
use crate::render::{Renderer, short_id};
use crate::store::{MutationOutcome, ReminderDraft, Reminders, TodoDraft, TodoList};

/// Everything a command needs from the outside world.
pub struct CommandEnv {
    pub storage: Arc<dyn Storage>,
    pub cfg: Config,
    pub renderer: Renderer,
    pub clock: Arc<dyn Clock>,
}

#[instrument(skip_all)]
pub async fn dispatch(ctx: &CommandEnv, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Todo(cmd) => run_todo(ctx, cmd),
        Command::Reminder(cmd) => run_reminder(ctx, cmd).await,
        Command::Chat(cmd) => run_chat(ctx, cmd).await,
    }
}

fn run_todo(ctx: &CommandEnv, cmd: TodoCommand) -> anyhow::Result<()> {
    let mut todos = TodoList::load(ctx.storage.clone());
    let out = io::stdout().lock();

    match cmd {
        TodoCommand::Add(TodoAddArgs {
            text,
            priority,
            category,
        }) => {
            let mut draft = TodoDraft {
                text: join_words(&text),
                ..TodoDraft::default()
            };
            if let Some(priority) = priority {
                draft.priority = priority;
            }
            if let Some(category) = category {
                draft.category = category;
            }

            let outcome = todos.add(&mut draft);
            let added = todos.items().last().map(|todo| short_id(&todo.id)).unwrap_or("");
            ctx.renderer
                .write_outcome(out, outcome, &format!("added task {added}"))
        }
        TodoCommand::Done { id } => {
            let id = todos.resolve_id(&id).unwrap_or(id);
            let outcome = todos.toggle_complete(&id);
            let state = todos
                .get(&id)
                .map(|todo| if todo.completed { "done" } else { "open" })
                .unwrap_or_default();
            ctx.renderer
                .write_outcome(out, outcome, &format!("task {} is {state}", short_id(&id)))
        }
        TodoCommand::Delete { id } => {
            let id = todos.resolve_id(&id).unwrap_or(id);
            let outcome = todos.delete(&id);
            ctx.renderer
                .write_outcome(out, outcome, &format!("deleted task {}", short_id(&id)))
        }
        TodoCommand::List { filter } => {
            let view = todos.view(filter.unwrap_or_default());
            ctx.renderer.write_todo_table(out, &view)
        }
    }
}

async fn run_reminder(ctx: &CommandEnv, cmd: ReminderCommand) -> anyhow::Result<()> {
    let mut reminders = Reminders::load(ctx.storage.clone());

    match cmd {
        ReminderCommand::Add(ReminderAddArgs {
            title,
            date,
            time,
            category,
        }) => {
            let mut draft = ReminderDraft {
                title: join_words(&title),
                date,
                time,
                category: category.unwrap_or_default(),
            };
            let outcome = reminders.add(&mut draft);
            let added = reminders
                .items()
                .last()
                .map(|reminder| short_id(&reminder.id))
                .unwrap_or("");
            ctx.renderer
                .write_outcome(io::stdout().lock(), outcome, &format!("added reminder {added}"))
        }
        ReminderCommand::Done { id } => {
            let id = reminders.resolve_id(&id).unwrap_or(id);
            let outcome = reminders.toggle_complete(&id);
            ctx.renderer.write_outcome(
                io::stdout().lock(),
                outcome,
                &format!("toggled reminder {}", short_id(&id)),
            )
        }
        ReminderCommand::Delete { id } => {
            let id = reminders.resolve_id(&id).unwrap_or(id);
            let outcome = reminders.delete(&id);
            ctx.renderer.write_outcome(
                io::stdout().lock(),
                outcome,
                &format!("deleted reminder {}", short_id(&id)),
            )
        }
        ReminderCommand::List { filter } => {
            let view = reminders.view(filter.unwrap_or_default(), ctx.clock.now());
            ctx.renderer.write_reminder_table(io::stdout().lock(), &view)
        }
        ReminderCommand::Watch { ticks } => watch_reminders(ctx, reminders, ticks).await,
    }
}

#[instrument(skip(ctx, reminders))]
async fn watch_reminders(
    ctx: &CommandEnv,
    reminders: Reminders,
    ticks: Option<u64>,
) -> anyhow::Result<()> {
    let period = ctx
        .cfg
        .get_u64("reminders.interval")?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(CHECK_PERIOD);
    let allowed = ctx.cfg.get_bool("notifications").unwrap_or(true);
    if !allowed {
        warn!("notifications are off; due reminders will not be announced");
    }

    {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "watching {} reminder(s) every {}s; press Ctrl-C to stop",
            reminders.len(),
            period.as_secs()
        )?;
    }

    let watcher = ReminderWatcher::start(
        Arc::new(Mutex::new(reminders)),
        Arc::new(TerminalNotifier::new(allowed)),
        ctx.clock.clone(),
        period,
    );
    let mut tick_rx = watcher.ticks();

    match ticks {
        Some(limit) => {
            tokio::select! {
                result = tick_rx.wait_for(|count| *count >= limit) => {
                    result.context("reminder watcher stopped unexpectedly")?;
                }
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed waiting for Ctrl-C")?;
            info!("interrupted");
        }
    }

    watcher.stop().await;
    Ok(())
}

async fn run_chat(ctx: &CommandEnv, cmd: ChatCommand) -> anyhow::Result<()> {
    let mut history = ChatHistory::load(ctx.storage.clone());

    match cmd {
        ChatCommand::Send { text } => {
            let client = ChatClient::from_config(&ctx.cfg)?;
            info!(endpoint = %client.endpoint(), "asking assistant");
            let reply = history
                .send(&client, &join_words(&text))
                .await
                .map(|message| message.content.clone());

            let mut out = io::stdout().lock();
            match reply {
                Some(reply) => writeln!(out, "{reply}")?,
                None => writeln!(out, "nothing sent: message is empty")?,
            }
            Ok(())
        }
        ChatCommand::History => ctx
            .renderer
            .write_chat_history(io::stdout().lock(), history.messages()),
        ChatCommand::Clear => {
            history.clear();
            ctx.renderer.write_outcome(
                io::stdout().lock(),
                MutationOutcome::Applied,
                "chat history cleared",
            )
        }
    }
}
