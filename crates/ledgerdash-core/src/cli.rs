use std::convert::Infallible;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::{ReminderFilter, TodoFilter};
use crate::item::{Priority, ReminderCategory};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ledgerdash",
    version,
    about = "Personal finance dashboard: tasks, reminders and an assistant"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Financial task list.
    #[command(subcommand)]
    Todo(TodoCommand),

    /// Dated reminders with due alerts.
    #[command(subcommand)]
    Reminder(ReminderCommand),

    /// Financial assistant chat.
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TodoCommand {
    Add(TodoAddArgs),
    /// Toggle a task between open and done.
    Done { id: String },
    Delete { id: String },
    List {
        /// all, active or completed; other names show everything.
        #[arg(long, value_parser = todo_filter_arg)]
        filter: Option<TodoFilter>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TodoAddArgs {
    pub text: Vec<String>,

    #[arg(long, value_enum)]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReminderCommand {
    Add(ReminderAddArgs),
    /// Toggle a reminder between open and done.
    Done { id: String },
    Delete { id: String },
    List {
        /// all, upcoming, completed or overdue; other names show everything.
        #[arg(long, value_parser = reminder_filter_arg)]
        filter: Option<ReminderFilter>,
    },
    /// Check for due reminders on a timer until interrupted.
    Watch {
        /// Stop after this many checks.
        #[arg(long)]
        ticks: Option<u64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReminderAddArgs {
    pub title: Vec<String>,

    /// Due date, YYYY-MM-DD.
    #[arg(long, default_value = "")]
    pub date: String,

    /// Due time, HH:MM or HH:MM:SS.
    #[arg(long, default_value = "")]
    pub time: String,

    #[arg(long, value_enum)]
    pub category: Option<ReminderCategory>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChatCommand {
    Send { text: Vec<String> },
    History,
    Clear,
}

fn todo_filter_arg(s: &str) -> Result<TodoFilter, Infallible> {
    Ok(TodoFilter::from_name(s))
}

fn reminder_filter_arg(s: &str) -> Result<ReminderFilter, Infallible> {
    Ok(ReminderFilter::from_name(s))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` / `rc.KEY:VALUE` tokens out of the
/// argument list. Capture stops at `--` and once an `add` or `send`
/// subcommand starts taking free text, so message words are never eaten.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    let mut group_seen = false;
    let mut free_text = false;
    for arg in iter {
        let s = arg.to_string_lossy();
        if free_text {
            cleaned.push(arg);
            continue;
        }
        match s.as_ref() {
            "--" => free_text = true,
            "todo" | "reminder" | "chat" if !group_seen => group_seen = true,
            "add" | "send" if group_seen => free_text = true,
            _ => {}
        }

        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}

/// Joins free-form words into one field value.
pub fn join_words(words: &[String]) -> String {
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_tokens_become_overrides() {
        let pre = preprocess_args(&args(&[
            "ledgerdash",
            "rc.color=off",
            "todo",
            "rc.notifications:no",
            "list",
        ]));
        assert_eq!(pre.cleaned_args, args(&["ledgerdash", "todo", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.notifications".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn parses_reminder_add_with_flags() {
        let cli = GlobalCli::try_parse_from([
            "ledgerdash",
            "--rc",
            "color=off",
            "reminder",
            "add",
            "Pay",
            "card",
            "--date",
            "2025-01-01",
            "--time",
            "09:00",
            "--category",
            "tax",
        ])
        .expect("parse");

        assert_eq!(cli.rc_overrides[0].key, "color");
        let Command::Reminder(ReminderCommand::Add(add)) = cli.command else {
            panic!("expected reminder add");
        };
        assert_eq!(join_words(&add.title), "Pay card");
        assert_eq!(add.date, "2025-01-01");
        assert_eq!(add.category, Some(ReminderCategory::Tax));
    }

    #[test]
    fn parses_filters_by_name() {
        let cli = GlobalCli::try_parse_from(["ledgerdash", "todo", "list", "--filter", "active"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Todo(TodoCommand::List {
                filter: Some(TodoFilter::Active)
            })
        ));
    }

    #[test]
    fn free_text_after_send_keeps_rc_like_words() {
        let pre = preprocess_args(&args(&[
            "ledgerdash",
            "rc.color=off",
            "chat",
            "send",
            "rc.note:",
            "hi",
        ]));
        assert_eq!(
            pre.cleaned_args,
            args(&["ledgerdash", "chat", "send", "rc.note:", "hi"])
        );
        assert_eq!(
            pre.rc_overrides,
            vec![("rc.color".to_string(), "off".to_string())]
        );

        let pre = preprocess_args(&args(&["ledgerdash", "todo", "--", "rc.x=1"]));
        assert!(pre.rc_overrides.is_empty());
    }

    #[test]
    fn unknown_filter_names_list_everything() {
        let cli = GlobalCli::try_parse_from(["ledgerdash", "todo", "list", "--filter", "bogus"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Todo(TodoCommand::List {
                filter: Some(TodoFilter::All)
            })
        ));

        let cli =
            GlobalCli::try_parse_from(["ledgerdash", "reminder", "list", "--filter", "soon"])
                .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Reminder(ReminderCommand::List {
                filter: Some(ReminderFilter::All)
            })
        ));

        let cli =
            GlobalCli::try_parse_from(["ledgerdash", "reminder", "list", "--filter", "Overdue"])
                .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Reminder(ReminderCommand::List {
                filter: Some(ReminderFilter::Overdue)
            })
        ));
    }

    #[test]
    fn rc_flag_requires_key_value() {
        assert!("color".parse::<KeyVal>().is_err());
    }
}
