use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::iso_date_serde;

pub const FALLBACK_COLOR: &str = "#6C5CE7";
pub const DEFAULT_CATEGORY: &str = "personal";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(TodoId);
string_id!(SubtaskId);
string_id!(CategoryId);

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Position in the priority sort; high sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Priority::High => "#FF7675",
            Priority::Medium => "#FDCB6E",
            Priority::Low => "#00B894",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Priority::Low),
            "m" | "medium" => Ok(Priority::Medium),
            "h" | "high" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other} (expected low, medium or high)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: SubtaskId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    pub category: CategoryId,

    #[serde(default)]
    pub priority: Priority,

    #[serde(with = "iso_date_serde")]
    pub due_date: DateTime<Utc>,

    #[serde(default)]
    pub notes: String,

    #[serde(with = "iso_date_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl Todo {
    pub fn completed_subtasks(&self) -> usize {
        self.subtasks.iter().filter(|s| s.completed).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
}

impl Category {
    fn builtin(id: &str, name: &str, color: &str) -> Self {
        Self {
            id: CategoryId::from(id),
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// The categories every fresh store starts with.
pub fn builtin_categories() -> Vec<Category> {
    vec![
        Category::builtin("personal", "Personal", "#6C5CE7"),
        Category::builtin("work", "Work", "#00B894"),
        Category::builtin("shopping", "Shopping", "#FF7675"),
    ]
}

/// Todos may reference categories that do not exist; those resolve to
/// [`FALLBACK_COLOR`].
pub fn category_color<'a>(categories: &'a [Category], id: &CategoryId) -> &'a str {
    find_category(categories, id)
        .map(|c| c.color.as_str())
        .unwrap_or(FALLBACK_COLOR)
}

pub fn find_category<'a>(categories: &'a [Category], id: &CategoryId) -> Option<&'a Category> {
    categories.iter().find(|c| &c.id == id)
}

/// User input for a new todo, validated by the store.
#[derive(Debug, Clone)]
pub struct TodoDraft {
    pub text: String,
    pub category: CategoryId,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: String,
}

impl TodoDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: CategoryId::from(DEFAULT_CATEGORY),
            priority: Priority::default(),
            due_date: None,
            notes: String::new(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = CategoryId(category.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}
