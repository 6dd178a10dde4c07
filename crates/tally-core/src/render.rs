use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_local_date, is_overdue};
use crate::todo::{Category, Priority, Todo, category_color, find_category};

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

    #[tracing::instrument(skip_all, fields(count = todos.len()))]
    pub fn write_todo_table<W: Write>(
        &self,
        out: W,
        todos: &[&Todo],
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Done", "Due", "Priority", "Category", "Text", "Subtasks"]
            .map(str::to_string)
            .to_vec();

        let rows = todos
            .iter()
            .map(|todo| {
                let due = format_local_date(todo.due_date);
                let due = if !todo.completed && is_overdue(todo.due_date, now) {
                    self.paint(&due, "31")
                } else {
                    due
                };

                let subtasks = if todo.subtasks.is_empty() {
                    String::new()
                } else {
                    format!("{}/{}", todo.completed_subtasks(), todo.subtasks.len())
                };

                vec![
                    self.paint(todo.id.as_str(), "33"),
                    if todo.completed { "x" } else { " " }.to_string(),
                    due,
                    self.paint_priority(todo.priority),
                    self.paint_hex(
                        &category_label(categories, todo),
                        category_color(categories, &todo.category),
                    ),
                    todo.text.clone(),
                    subtasks,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all, fields(id = %todo.id))]
    pub fn write_todo_info<W: Write>(
        &self,
        mut out: W,
        todo: &Todo,
        categories: &[Category],
    ) -> anyhow::Result<()> {
        writeln!(out, "id        {}", todo.id)?;
        writeln!(out, "text      {}", todo.text)?;
        writeln!(out, "status    {}", if todo.completed { "completed" } else { "active" })?;
        writeln!(out, "priority  {}", self.paint_priority(todo.priority))?;
        writeln!(out, "category  {}", category_label(categories, todo))?;
        writeln!(out, "due       {}", format_local_date(todo.due_date))?;
        writeln!(out, "created   {}", todo.created_at.format("%Y-%m-%dT%H:%M:%SZ"))?;
        if !todo.notes.is_empty() {
            writeln!(out, "notes     {}", todo.notes)?;
        }

        for (idx, subtask) in todo.subtasks.iter().enumerate() {
            let label = if idx == 0 { "subtasks" } else { "" };
            writeln!(
                out,
                "{label:<9} [{}] {} ({})",
                if subtask.completed { "x" } else { " " },
                subtask.text,
                subtask.id
            )?;
        }

        Ok(())
    }

    pub fn write_categories<W: Write>(
        &self,
        out: W,
        categories: &[Category],
    ) -> anyhow::Result<()> {
        let headers = vec!["ID".to_string(), "Name".to_string(), "Color".to_string()];
        let rows = categories
            .iter()
            .map(|c| {
                vec![
                    c.id.to_string(),
                    self.paint_hex(&c.name, &c.color),
                    c.color.clone(),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    fn paint_priority(&self, priority: Priority) -> String {
        self.paint_hex(priority.as_str(), priority.color())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    /// Colors are free-form tokens; anything that is not `#RRGGBB` prints
    /// unstyled.
    fn paint_hex(&self, text: &str, hex: &str) -> String {
        match parse_hex(hex) {
            Some((r, g, b)) => self.paint(text, &format!("38;2;{r};{g};{b}")),
            None => text.to_string(),
        }
    }
}

fn category_label(categories: &[Category], todo: &Todo) -> String {
    find_category(categories, &todo.category)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| todo.category.to_string())
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
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
