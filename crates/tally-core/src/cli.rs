use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

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
#[command(name = "tally", version, about = "Tally: a small persistent todo list")]
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

    #[arg(long = "tallyrc", global = true)]
    pub tallyrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a todo
    Add(AddArgs),
    /// Replace a todo's text
    Edit {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Flip a todo between active and completed
    Toggle { id: String },
    /// Delete a todo after confirmation
    Delete {
        id: String,
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Show the filtered, sorted list
    List(ListArgs),
    /// Show one todo in full
    Info { id: String },
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Print the stored snapshot as JSON
    Export,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    #[arg(short = 'c', long = "category", default_value = crate::todo::DEFAULT_CATEGORY)]
    pub category: String,

    #[arg(short = 'p', long = "priority", default_value = "medium")]
    pub priority: String,

    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,

    #[arg(short = 'n', long = "notes", default_value = "")]
    pub notes: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(short = 'f', long = "filter")]
    pub filter: Option<String>,

    #[arg(short = 's', long = "search", default_value = "")]
    pub search: String,

    #[arg(long = "sort")]
    pub sort: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Append a subtask to a todo
    Add {
        todo_id: String,
        #[arg(num_args = 0..)]
        text: Vec<String>,
    },
    /// Flip a subtask
    Toggle { todo_id: String, subtask_id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    /// Append a category
    Add {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
        #[arg(long = "color", default_value = crate::todo::FALLBACK_COLOR)]
        color: String,
    },
    /// List categories
    List,
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
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` / `rc.key:value` words out of the argument list.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// Joins the words of a free-text argument the way a shell user typed them.
pub fn join_words(words: &[String]) -> String {
    words.join(" ")
}
