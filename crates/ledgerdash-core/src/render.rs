use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due;
use crate::filter::ReminderView;
use crate::item::{ChatMessage, ChatRole, Priority, TodoItem};
use crate::store::MutationOutcome;

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, todos))]
    pub fn write_todo_table<W: Write>(&self, out: W, todos: &[&TodoItem]) -> anyhow::Result<()> {
        if todos.is_empty() {
            return write_empty(out, "No tasks yet.");
        }

        let headers = ["ID", "Done", "Priority", "Category", "Task"];
        let rows = todos
            .iter()
            .map(|todo| {
                let priority = match todo.priority {
                    Priority::High => self.paint(todo.priority.as_str(), "31"),
                    Priority::Medium => self.paint(todo.priority.as_str(), "33"),
                    Priority::Low => self.paint(todo.priority.as_str(), "32"),
                };
                let text = if todo.completed {
                    self.paint(&todo.text, "9")
                } else {
                    todo.text.clone()
                };
                vec![
                    self.paint(short_id(&todo.id), "33"),
                    checkbox(todo.completed).to_string(),
                    priority,
                    todo.category.clone(),
                    text,
                ]
            })
            .collect();

        write_table(out, &headers, rows)
    }

    #[tracing::instrument(skip(self, out, reminders))]
    pub fn write_reminder_table<W: Write>(
        &self,
        out: W,
        reminders: &[ReminderView<'_>],
    ) -> anyhow::Result<()> {
        if reminders.is_empty() {
            return write_empty(out, "No reminders yet.");
        }

        let headers = ["ID", "Done", "Due", "Category", "Reminder"];
        let rows = reminders
            .iter()
            .map(|view| {
                let mut due = format_due(view.due_at);
                if view.is_overdue {
                    due = self.paint(&format!("{due} overdue"), "31");
                }
                vec![
                    self.paint(short_id(&view.item.id), "33"),
                    checkbox(view.item.completed).to_string(),
                    due,
                    view.item.category.to_string(),
                    view.item.title.clone(),
                ]
            })
            .collect();

        write_table(out, &headers, rows)
    }

    #[tracing::instrument(skip(self, out, messages))]
    pub fn write_chat_history<W: Write>(
        &self,
        mut out: W,
        messages: &[ChatMessage],
    ) -> anyhow::Result<()> {
        if messages.is_empty() {
            return write_empty(out, "No messages yet.");
        }

        for message in messages {
            let who = match message.role {
                ChatRole::User => self.paint("you", "36"),
                ChatRole::Assistant => self.paint("assistant", "35"),
            };
            writeln!(
                out,
                "[{}] {who}: {}",
                message.timestamp.format("%Y-%m-%d %H:%M"),
                message.content
            )?;
        }
        Ok(())
    }

    pub fn write_outcome<W: Write>(
        &self,
        mut out: W,
        outcome: MutationOutcome,
        applied: &str,
    ) -> anyhow::Result<()> {
        match outcome {
            MutationOutcome::Applied => writeln!(out, "{applied}")?,
            MutationOutcome::ValidationFailed => writeln!(
                out,
                "{}",
                self.paint("nothing added: required fields are missing or invalid", "33")
            )?,
            MutationOutcome::NotFound => {
                writeln!(out, "{}", self.paint("no item matches that id", "33"))?
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn checkbox(completed: bool) -> &'static str {
    if completed { "[x]" } else { "[ ]" }
}

fn write_empty<W: Write>(mut out: W, message: &str) -> anyhow::Result<()> {
    writeln!(out, "{message}")?;
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    let last = headers.len().saturating_sub(1);
    for (idx, header) in headers.iter().enumerate() {
        write_cell(&mut writer, header, widths[idx], idx == last)?;
    }
    writeln!(writer)?;

    for (idx, width) in widths.iter().enumerate() {
        write!(writer, "{}", "-".repeat(*width))?;
        if idx != last {
            write!(writer, " ")?;
        }
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            write_cell(&mut writer, cell, widths[idx], idx == last)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn write_cell<W: Write>(writer: &mut W, cell: &str, width: usize, last: bool) -> io::Result<()> {
    if last {
        return write!(writer, "{cell}");
    }
    let padding = width.saturating_sub(visible_width(cell));
    write!(writer, "{cell}{} ", " ".repeat(padding))
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
