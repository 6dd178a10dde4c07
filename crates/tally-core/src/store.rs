use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::datetime::to_millis;
use crate::ids::IdGenerator;
use crate::notify::WidgetNotifier;
use crate::persist::{KeyValueStore, PersistenceError, STORAGE_KEY};
use crate::projection::active_count;
use crate::snapshot::Snapshot;
use crate::todo::{
    Category, CategoryDraft, CategoryId, FALLBACK_COLOR, Subtask, SubtaskId, Todo, TodoDraft,
    TodoId,
};

/// What a mutation does to in-memory state when the write behind it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SavePolicy {
    /// Keep the new snapshot visible even though storage still holds the
    /// previous one.
    #[default]
    Keep,
    /// Drop the new snapshot and keep showing what storage holds.
    Revert,
}

impl fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SavePolicy::Keep => "keep",
            SavePolicy::Revert => "revert",
        })
    }
}

impl FromStr for SavePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(SavePolicy::Keep),
            "revert" => Ok(SavePolicy::Revert),
            other => Err(anyhow!("invalid save.policy: {other} (expected keep or revert)")),
        }
    }
}

/// Result of a mutation whose preconditions may not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Noop,
}

/// Owns the todo/category snapshot and keeps storage in step with it.
///
/// Every applied mutation builds a new snapshot, writes it whole under
/// [`STORAGE_KEY`], and then makes it visible. Unmet preconditions (blank
/// text, unknown ids) are no-ops and never touch storage.
pub struct TodoStore<S, N> {
    snapshot: Snapshot,
    storage: S,
    notifier: N,
    ids: IdGenerator,
    policy: SavePolicy,
    clock: fn() -> DateTime<Utc>,
}

impl<S: KeyValueStore, N: WidgetNotifier> TodoStore<S, N> {
    pub fn new(storage: S, notifier: N) -> Self {
        Self {
            snapshot: Snapshot::default(),
            storage,
            notifier,
            ids: IdGenerator::new(),
            policy: SavePolicy::default(),
            clock: Utc::now,
        }
    }

    pub fn with_policy(mut self, policy: SavePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn todos(&self) -> &[Todo] {
        &self.snapshot.todos
    }

    pub fn categories(&self) -> &[Category] {
        &self.snapshot.categories
    }

    pub fn policy(&self) -> SavePolicy {
        self.policy
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Replaces in-memory state with the stored snapshot. With nothing
    /// stored the current state is kept; on failure it is left untouched.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self) -> Result<(), PersistenceError> {
        let Some(raw) = self.storage.get(STORAGE_KEY)? else {
            debug!("no stored snapshot; keeping defaults");
            self.push_active_count();
            return Ok(());
        };

        let snapshot = Snapshot::decode(STORAGE_KEY, &raw)?;
        self.ids.observe_all(snapshot.all_ids());
        info!(
            todos = snapshot.todos.len(),
            categories = snapshot.categories.len(),
            "loaded snapshot"
        );
        self.snapshot = snapshot;
        self.push_active_count();
        Ok(())
    }

    #[tracing::instrument(skip(self, draft))]
    pub fn add_todo(&mut self, draft: TodoDraft) -> Result<Option<TodoId>, PersistenceError> {
        let text = draft.text.trim();
        if text.is_empty() {
            debug!("blank todo text; ignoring");
            return Ok(None);
        }

        let now = to_millis((self.clock)());
        let id = TodoId(self.ids.next_at(now));
        let todo = Todo {
            id: id.clone(),
            text: text.to_string(),
            completed: false,
            category: draft.category,
            priority: draft.priority,
            due_date: draft.due_date.map(to_millis).unwrap_or(now),
            notes: draft.notes,
            created_at: now,
            subtasks: Vec::new(),
        };

        let mut next = self.snapshot.clone();
        next.todos.push(todo);
        info!(id = %id, "adding todo");
        self.persist_then_commit(next, true)?;
        Ok(Some(id))
    }

    #[tracing::instrument(skip(self, text))]
    pub fn update_todo_text(
        &mut self,
        id: &TodoId,
        text: &str,
    ) -> Result<Outcome, PersistenceError> {
        let text = text.trim();
        if text.is_empty() {
            debug!("blank todo text; ignoring");
            return Ok(Outcome::Noop);
        }

        self.modify_todo(id, |todo| todo.text = text.to_string())
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_todo(&mut self, id: &TodoId) -> Result<Outcome, PersistenceError> {
        self.modify_todo(id, |todo| todo.completed = !todo.completed)
    }

    /// Removes the todo for good. Asking the user first is the caller's job.
    #[tracing::instrument(skip(self))]
    pub fn delete_todo(&mut self, id: &TodoId) -> Result<Outcome, PersistenceError> {
        let Some(pos) = self.position(id) else {
            return Ok(Outcome::Noop);
        };

        let mut next = self.snapshot.clone();
        next.todos.remove(pos);
        info!("deleting todo");
        self.persist_then_commit(next, true)?;
        Ok(Outcome::Applied)
    }

    /// Subtask text is stored exactly as given.
    #[tracing::instrument(skip(self, text))]
    pub fn add_subtask(
        &mut self,
        todo_id: &TodoId,
        text: &str,
    ) -> Result<Option<SubtaskId>, PersistenceError> {
        let Some(pos) = self.position(todo_id) else {
            debug!("unknown todo; ignoring subtask");
            return Ok(None);
        };

        let now = (self.clock)();
        let id = SubtaskId(self.ids.next_at(now));
        let mut next = self.snapshot.clone();
        next.todos[pos].subtasks.push(Subtask {
            id: id.clone(),
            text: text.to_string(),
            completed: false,
        });

        info!(subtask = %id, "adding subtask");
        self.persist_then_commit(next, true)?;
        Ok(Some(id))
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_subtask(
        &mut self,
        todo_id: &TodoId,
        subtask_id: &SubtaskId,
    ) -> Result<Outcome, PersistenceError> {
        let Some(pos) = self.position(todo_id) else {
            return Ok(Outcome::Noop);
        };
        let Some(sub_pos) = self.snapshot.todos[pos]
            .subtasks
            .iter()
            .position(|s| &s.id == subtask_id)
        else {
            debug!("unknown subtask; ignoring");
            return Ok(Outcome::Noop);
        };

        let mut next = self.snapshot.clone();
        let subtask = &mut next.todos[pos].subtasks[sub_pos];
        subtask.completed = !subtask.completed;
        self.persist_then_commit(next, true)?;
        Ok(Outcome::Applied)
    }

    #[tracing::instrument(skip(self, draft))]
    pub fn add_category(
        &mut self,
        draft: CategoryDraft,
    ) -> Result<Option<CategoryId>, PersistenceError> {
        let name = draft.name.trim();
        if name.is_empty() {
            debug!("blank category name; ignoring");
            return Ok(None);
        }

        let color = if draft.color.trim().is_empty() {
            FALLBACK_COLOR.to_string()
        } else {
            draft.color
        };

        let now = (self.clock)();
        let id = CategoryId(self.ids.next_at(now));
        let mut next = self.snapshot.clone();
        next.categories.push(Category {
            id: id.clone(),
            name: name.to_string(),
            color,
        });

        info!(id = %id, name, "adding category");
        self.persist_then_commit(next, false)?;
        Ok(Some(id))
    }

    fn position(&self, id: &TodoId) -> Option<usize> {
        let pos = self.snapshot.todos.iter().position(|t| &t.id == id);
        if pos.is_none() {
            debug!(id = %id, "todo not found");
        }
        pos
    }

    fn modify_todo<F>(&mut self, id: &TodoId, apply: F) -> Result<Outcome, PersistenceError>
    where
        F: FnOnce(&mut Todo),
    {
        let Some(pos) = self.position(id) else {
            return Ok(Outcome::Noop);
        };

        let mut next = self.snapshot.clone();
        apply(&mut next.todos[pos]);
        self.persist_then_commit(next, true)?;
        Ok(Outcome::Applied)
    }

    fn persist_then_commit(
        &mut self,
        next: Snapshot,
        todos_changed: bool,
    ) -> Result<(), PersistenceError> {
        let written = next
            .encode()
            .and_then(|raw| self.storage.set(STORAGE_KEY, &raw));

        if let Err(err) = &written {
            warn!(error = %err, policy = %self.policy, "failed to persist snapshot");
            if self.policy == SavePolicy::Revert {
                return written;
            }
        }

        self.snapshot = next;
        if todos_changed {
            self.push_active_count();
        }
        written
    }

    fn push_active_count(&mut self) {
        let active = active_count(&self.snapshot);
        if let Err(err) = self.notifier.update_widget(active) {
            warn!(error = %err, active, "widget update failed");
        }
    }
}
