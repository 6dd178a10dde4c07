use serde::{Deserialize, Serialize};

use crate::persist::PersistenceError;
use crate::todo::{Category, Todo, TodoId, builtin_categories};

/// Everything the store persists, written as one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default = "builtin_categories")]
    pub categories: Vec<Category>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            todos: Vec::new(),
            categories: builtin_categories(),
        }
    }
}

impl Snapshot {
    pub fn encode(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(PersistenceError::Encode)
    }

    pub fn encode_pretty(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(PersistenceError::Encode)
    }

    pub fn decode(key: &str, raw: &str) -> Result<Self, PersistenceError> {
        serde_json::from_str(raw).map_err(|source| PersistenceError::Decode {
            key: key.to_string(),
            source,
        })
    }

    pub fn todo(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| &t.id == id)
    }

    /// Every id in the document, for priming the id generator.
    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.todos
            .iter()
            .flat_map(|t| {
                std::iter::once(t.id.as_str()).chain(t.subtasks.iter().map(|s| s.id.as_str()))
            })
            .chain(self.categories.iter().map(|c| c.id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::todo::{CategoryId, Priority, Subtask, SubtaskId};

    fn sample() -> Snapshot {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 30).unwrap()
            + chrono::Duration::milliseconds(250);
        let mut snapshot = Snapshot::default();
        snapshot.todos.push(Todo {
            id: TodoId::from("1704186930250"),
            text: "buy milk".to_string(),
            completed: true,
            category: CategoryId::from("shopping"),
            priority: Priority::High,
            due_date: Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap(),
            notes: "2%".to_string(),
            created_at: created,
            subtasks: vec![Subtask {
                id: SubtaskId::from("1704186930251"),
                text: " oat ".to_string(),
                completed: false,
            }],
        });
        snapshot
    }

    #[test]
    fn encodes_with_camel_case_fields_and_iso_dates() {
        let value: serde_json::Value =
            serde_json::from_str(&sample().encode().unwrap()).unwrap();
        let todo = &value["todos"][0];

        assert_eq!(todo["dueDate"], "2024-03-05T00:00:00.000Z");
        assert_eq!(todo["createdAt"], "2024-01-02T09:15:30.250Z");
        assert_eq!(todo["priority"], "high");
        assert_eq!(todo["category"], "shopping");
        assert_eq!(todo["subtasks"][0]["text"], " oat ");
        assert_eq!(value["categories"][1]["color"], "#00B894");
    }

    #[test]
    fn decode_of_encode_is_field_for_field_equal() {
        let original = sample();
        let raw = original.encode().unwrap();
        assert_eq!(Snapshot::decode("k", &raw).unwrap(), original);
    }

    #[test]
    fn decode_fills_defaults_for_sparse_documents() {
        let raw = r#"{"todos":[{"id":"1","text":"x","category":"nowhere",
            "dueDate":"2024-02-20T05:00:00+05:00","createdAt":"2024-02-01"}]}"#;
        let snapshot = Snapshot::decode("k", raw).unwrap();
        let todo = &snapshot.todos[0];

        assert!(!todo.completed);
        assert_eq!(todo.priority, Priority::Medium);
        assert!(todo.notes.is_empty());
        assert!(todo.subtasks.is_empty());
        assert_eq!(todo.due_date, Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap());
        assert_eq!(snapshot.categories, builtin_categories());
    }

    #[test]
    fn malformed_documents_report_the_key() {
        let err = Snapshot::decode(crate::persist::STORAGE_KEY, "[not json").unwrap_err();
        assert!(err.to_string().contains("@todo_items"));
    }
}
