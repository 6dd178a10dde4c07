use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tally_core::notify::{NoopNotifier, RecordingNotifier};
use tally_core::persist::{FileKvStore, KeyValueStore, STORAGE_KEY};
use tally_core::projection::{SortKey, StatusFilter, ViewParams, project};
use tally_core::store::TodoStore;
use tally_core::todo::{CategoryDraft, Priority, TodoDraft};
use tempfile::tempdir;

#[test]
fn file_backed_store_survives_restart() {
    let temp = tempdir().expect("tempdir");

    let mut store = TodoStore::new(
        FileKvStore::open(temp.path()).expect("open storage"),
        RecordingNotifier::default(),
    );
    store.load().expect("empty storage loads");

    let milk = store
        .add_todo(
            TodoDraft::new("buy milk")
                .category("shopping")
                .priority(Priority::Low)
                .due(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
        )
        .expect("add")
        .expect("non-empty text");
    let report = store
        .add_todo(
            TodoDraft::new("write report")
                .category("work")
                .priority(Priority::High)
                .due(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap())
                .notes("Q1 numbers"),
        )
        .expect("add")
        .expect("non-empty text");
    store.add_subtask(&report, "collect data").expect("add subtask");
    store.toggle_todo(&milk).expect("toggle");
    let garden = store
        .add_category(CategoryDraft::new("Garden", "#55EFC4"))
        .expect("add category")
        .expect("non-empty name");

    assert_eq!(store.notifier().pushed, vec![0, 1, 2, 2, 1]);

    let mut reopened = TodoStore::new(
        FileKvStore::open(temp.path()).expect("reopen storage"),
        NoopNotifier,
    );
    reopened.load().expect("load persisted snapshot");
    assert_eq!(reopened.snapshot(), store.snapshot());
    assert!(reopened.categories().iter().any(|c| c.id == garden));

    let active = project(
        reopened.snapshot(),
        &ViewParams {
            filter: StatusFilter::Active,
            search: String::new(),
            sort: SortKey::Date,
        },
    );
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, report);
    assert_eq!(active[0].subtasks[0].text, "collect data");

    let by_priority = project(
        reopened.snapshot(),
        &ViewParams {
            sort: SortKey::Priority,
            ..ViewParams::default()
        },
    );
    assert_eq!(
        by_priority.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
        vec![report, milk]
    );
}

#[test]
fn stored_document_uses_the_shared_wire_names() {
    let temp = tempdir().expect("tempdir");
    let mut store = TodoStore::new(
        FileKvStore::open(temp.path()).expect("open storage"),
        NoopNotifier,
    );
    store.add_todo(TodoDraft::new("check format")).expect("add");

    let raw = store
        .storage()
        .get(STORAGE_KEY)
        .expect("read back")
        .expect("written");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    let todo = doc["todos"][0].as_object().expect("todo object");

    let mut keys: Vec<&str> = todo.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "category",
            "completed",
            "createdAt",
            "dueDate",
            "id",
            "notes",
            "priority",
            "subtasks",
            "text"
        ]
    );
    assert_eq!(doc["categories"].as_array().map(Vec::len), Some(3));
}
