use std::io::Write;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::cli::{CategoryCommand, Command, ListArgs, SubtaskCommand, join_words};
use crate::config::Config;
use crate::confirm::{AssumeYes, Confirm};
use crate::datetime::parse_due_input;
use crate::notify::WidgetNotifier;
use crate::persist::{KeyValueStore, PersistenceError};
use crate::projection::{ViewParams, project};
use crate::render::Renderer;
use crate::store::{Outcome, SavePolicy, TodoStore};
use crate::todo::{CategoryDraft, Priority, SubtaskId, TodoDraft, TodoId};

/// A store plus the result of loading it at startup.
pub struct Session<S, N> {
    pub store: TodoStore<S, N>,
    pub load_error: Option<PersistenceError>,
}

impl<S: KeyValueStore, N: WidgetNotifier> Session<S, N> {
    #[instrument(skip_all)]
    pub fn open(mut store: TodoStore<S, N>) -> Self {
        let load_error = store.load().err();
        if let Some(err) = &load_error {
            warn!(error = %err, "failed to load todos; continuing with defaults");
        }
        Self { store, load_error }
    }
}

/// Runs one user action. Returns the non-fatal notices (load and save
/// failures) for the caller to show; they never abort the command.
#[instrument(skip(session, cfg, renderer, confirm, out))]
pub fn dispatch<S, N, W>(
    session: &mut Session<S, N>,
    cfg: &Config,
    renderer: &Renderer,
    confirm: &mut dyn Confirm,
    mut out: W,
    command: Command,
) -> anyhow::Result<Vec<String>>
where
    S: KeyValueStore,
    N: WidgetNotifier,
    W: Write,
{
    let mut notices = Vec::new();
    if let Some(err) = &session.load_error {
        notices.push(format!("failed to load todos: {err}"));
        if is_mutation(&command) {
            notices.push("not saving changes over a snapshot that could not be loaded".to_string());
            return Ok(notices);
        }
    }

    let policy = session.store.policy();
    let store = &mut session.store;

    match command {
        Command::Add(args) => {
            let priority: Priority = args.priority.parse()?;
            let mut draft = TodoDraft::new(join_words(&args.text))
                .category(args.category)
                .priority(priority)
                .notes(args.notes);
            if let Some(due) = args.due.as_deref() {
                draft = draft.due(parse_due_input(due, Utc::now()).context("invalid --due")?);
            }

            match settle(store.add_todo(draft), policy, &mut notices) {
                Some(Some(id)) => writeln!(out, "Added todo {id}.")?,
                Some(None) => writeln!(out, "Nothing added: todo text is empty.")?,
                None => {}
            }
        }
        Command::Edit { id, text } => {
            let id = TodoId(id);
            let text = join_words(&text);
            let outcome = settle(store.update_todo_text(&id, &text), policy, &mut notices);
            let applied = format!("Updated todo {id}.");
            report(&mut out, outcome, &applied, &format!("Todo {id} unchanged."))?;
        }
        Command::Toggle { id } => {
            let id = TodoId(id);
            let outcome = settle(store.toggle_todo(&id), policy, &mut notices);
            let state = match store.snapshot().todo(&id) {
                Some(todo) if todo.completed => "completed",
                _ => "active",
            };
            let applied = format!("Todo {id} is now {state}.");
            report(&mut out, outcome, &applied, &format!("No todo {id}."))?;
        }
        Command::Delete { id, yes } => {
            let id = TodoId(id);
            let Some(todo) = store.snapshot().todo(&id) else {
                writeln!(out, "No todo {id}.")?;
                return Ok(notices);
            };

            let prompt = format!("Delete todo {id} \"{}\"?", todo.text);
            let confirmed = if yes {
                AssumeYes.confirm(&prompt)?
            } else {
                confirm.confirm(&prompt)?
            };
            if !confirmed {
                debug!("delete cancelled");
                writeln!(out, "Cancelled.")?;
                return Ok(notices);
            }

            let outcome = settle(store.delete_todo(&id), policy, &mut notices);
            report(&mut out, outcome, &format!("Deleted todo {id}."), &format!("No todo {id}."))?;
        }
        Command::List(args) => {
            let params = view_params(cfg, args)?;
            let snapshot = store.snapshot();
            let todos = project(snapshot, &params);
            renderer.write_todo_table(&mut out, &todos, &snapshot.categories, Utc::now())?;
        }
        Command::Info { id } => {
            let id = TodoId(id);
            match store.snapshot().todo(&id) {
                Some(todo) => renderer.write_todo_info(&mut out, todo, store.categories())?,
                None => writeln!(out, "No todo {id}.")?,
            }
        }
        Command::Subtask(SubtaskCommand::Add { todo_id, text }) => {
            let todo_id = TodoId(todo_id);
            match settle(store.add_subtask(&todo_id, &join_words(&text)), policy, &mut notices) {
                Some(Some(id)) => writeln!(out, "Added subtask {id} to todo {todo_id}.")?,
                Some(None) => writeln!(out, "No todo {todo_id}.")?,
                None => {}
            }
        }
        Command::Subtask(SubtaskCommand::Toggle { todo_id, subtask_id }) => {
            let todo_id = TodoId(todo_id);
            let subtask_id = SubtaskId(subtask_id);
            let outcome = settle(store.toggle_subtask(&todo_id, &subtask_id), policy, &mut notices);
            report(
                &mut out,
                outcome,
                &format!("Toggled subtask {subtask_id}."),
                &format!("No subtask {subtask_id} on todo {todo_id}."),
            )?;
        }
        Command::Category(CategoryCommand::Add { name, color }) => {
            let draft = CategoryDraft::new(join_words(&name), color);
            match settle(store.add_category(draft), policy, &mut notices) {
                Some(Some(id)) => writeln!(out, "Added category {id}.")?,
                Some(None) => writeln!(out, "Nothing added: category name is empty.")?,
                None => {}
            }
        }
        Command::Category(CategoryCommand::List) => {
            renderer.write_categories(&mut out, store.categories())?;
        }
        Command::Export => {
            writeln!(out, "{}", store.snapshot().encode_pretty()?)?;
        }
    }

    Ok(notices)
}

fn is_mutation(command: &Command) -> bool {
    match command {
        Command::Add(_)
        | Command::Edit { .. }
        | Command::Toggle { .. }
        | Command::Delete { .. }
        | Command::Subtask(_)
        | Command::Category(CategoryCommand::Add { .. }) => true,
        Command::List(_)
        | Command::Info { .. }
        | Command::Category(CategoryCommand::List)
        | Command::Export => false,
    }
}

fn view_params(cfg: &Config, args: ListArgs) -> anyhow::Result<ViewParams> {
    let filter = match args.filter {
        Some(raw) => raw.parse()?,
        None => cfg.default_filter()?,
    };
    let sort = match args.sort {
        Some(raw) => raw.parse()?,
        None => cfg.default_sort()?,
    };
    Ok(ViewParams {
        filter,
        search: args.search,
        sort,
    })
}

/// Turns a save failure into a notice. `None` means the write failed.
fn settle<T>(
    result: Result<T, PersistenceError>,
    policy: SavePolicy,
    notices: &mut Vec<String>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let effect = match policy {
                SavePolicy::Keep => "the change was not saved",
                SavePolicy::Revert => "the change was discarded",
            };
            notices.push(format!("failed to save todos: {err}; {effect}"));
            None
        }
    }
}

fn report<W: Write>(
    out: &mut W,
    outcome: Option<Outcome>,
    applied: &str,
    noop: &str,
) -> anyhow::Result<()> {
    match outcome {
        Some(Outcome::Applied) => writeln!(out, "{applied}")?,
        Some(Outcome::Noop) => writeln!(out, "{noop}")?,
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::cli::AddArgs;
    use crate::confirm::PromptConfirm;
    use crate::notify::RecordingNotifier;
    use crate::persist::MemoryKvStore;

    type TestSession = Session<MemoryKvStore, RecordingNotifier>;

    fn session() -> TestSession {
        Session::open(TodoStore::new(MemoryKvStore::new(), RecordingNotifier::default()))
    }

    fn run(session: &mut TestSession, command: Command, answer: &str) -> (String, Vec<String>) {
        let mut out = Vec::new();
        let mut prompt_out = Vec::new();
        let mut confirm = PromptConfirm::new(Cursor::new(answer.to_string()), &mut prompt_out);
        let notices = dispatch(
            session,
            &Config::defaults(),
            &Renderer::plain(),
            &mut confirm,
            &mut out,
            command,
        )
        .unwrap();
        (String::from_utf8(out).unwrap(), notices)
    }

    fn add(text: &str) -> Command {
        Command::Add(AddArgs {
            text: text.split(' ').map(str::to_string).collect(),
            category: "work".to_string(),
            priority: "high".to_string(),
            due: Some("2024-01-10".to_string()),
            notes: String::new(),
        })
    }

    fn only_id(session: &TestSession) -> String {
        session.store.todos()[0].id.to_string()
    }

    #[test]
    fn add_then_list_shows_the_todo() {
        let mut session = session();
        let (out, notices) = run(&mut session, add("buy oat milk"), "");
        assert!(out.starts_with("Added todo "));
        assert!(notices.is_empty());

        let todo = &session.store.todos()[0];
        assert_eq!(todo.text, "buy oat milk");
        assert_eq!(todo.priority, Priority::High);

        let (out, _) = run(&mut session, Command::List(ListArgs::default()), "");
        assert!(out.contains("buy oat milk"));
        assert!(out.contains("Work"));
    }

    #[test]
    fn delete_respects_confirmation() {
        let mut session = session();
        run(&mut session, add("shred papers"), "");
        let id = only_id(&session);

        let (out, _) = run(&mut session, Command::Delete { id: id.clone(), yes: false }, "n\n");
        assert!(out.contains("Cancelled."));
        assert_eq!(session.store.todos().len(), 1);

        let (out, _) = run(&mut session, Command::Delete { id: id.clone(), yes: false }, "y\n");
        assert!(out.contains(&format!("Deleted todo {id}.")));
        assert!(session.store.todos().is_empty());

        let (out, _) = run(&mut session, Command::Delete { id, yes: true }, "");
        assert!(out.starts_with("No todo "));
    }

    #[test]
    fn save_failures_become_notices() {
        let mut session = session();
        run(&mut session, add("first"), "");
        session.store.storage_mut().fail_writes = true;

        let id = only_id(&session);
        let (out, notices) = run(&mut session, Command::Toggle { id }, "");
        assert!(out.is_empty());
        assert_eq!(notices.len(), 1);
        assert!(notices[0].starts_with("failed to save todos"));
        assert!(notices[0].ends_with("the change was not saved"));
    }

    #[test]
    fn mutations_are_refused_after_a_failed_load() {
        let mut storage = MemoryKvStore::new();
        storage.fail_reads = true;
        let mut session = Session::open(TodoStore::new(storage, RecordingNotifier::default()));
        assert!(session.load_error.is_some());

        let (out, notices) = run(&mut session, add("lost"), "");
        assert!(out.is_empty());
        assert_eq!(notices.len(), 2);
        assert!(session.store.todos().is_empty());
        assert_eq!(session.store.storage().writes(), 0);

        let (_, notices) = run(&mut session, Command::Export, "");
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn subtasks_and_categories_round_out_the_session() {
        let mut session = session();
        run(&mut session, add("pack"), "");
        let id = only_id(&session);

        let (out, _) = run(
            &mut session,
            Command::Subtask(SubtaskCommand::Add {
                todo_id: id.clone(),
                text: vec!["socks".to_string()],
            }),
            "",
        );
        assert!(out.starts_with("Added subtask "));
        let sub = session.store.todos()[0].subtasks[0].id.to_string();

        let (out, _) = run(
            &mut session,
            Command::Subtask(SubtaskCommand::Toggle {
                todo_id: id.clone(),
                subtask_id: sub,
            }),
            "",
        );
        assert!(out.starts_with("Toggled subtask "));
        assert!(session.store.todos()[0].subtasks[0].completed);

        let (out, _) = run(
            &mut session,
            Command::Category(CategoryCommand::Add {
                name: vec!["Travel".to_string()],
                color: "#0984E3".to_string(),
            }),
            "",
        );
        assert!(out.starts_with("Added category "));

        let (out, _) = run(&mut session, Command::Info { id }, "");
        assert!(out.contains("[x] socks"));
    }
}
