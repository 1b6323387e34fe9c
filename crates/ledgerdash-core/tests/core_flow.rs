use std::fs;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ledgerdash_core::datastore::{FileStorage, Storage};
use ledgerdash_core::filter::{ReminderFilter, TodoFilter};
use ledgerdash_core::item::{Priority, ReminderCategory};
use ledgerdash_core::notify::collect_due_notifications;
use ledgerdash_core::store::{
    MutationOutcome, REMINDERS_KEY, ReminderDraft, Reminders, TODOS_KEY, TodoDraft, TodoList,
};
use tempfile::tempdir;

fn at(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|date| date.and_hms_opt(hour, min, sec))
        .expect("valid timestamp")
}

fn pay_card() -> ReminderDraft {
    ReminderDraft {
        title: "Pay card".to_string(),
        date: "2025-01-01".to_string(),
        time: "09:00".to_string(),
        category: ReminderCategory::Bill,
    }
}

#[test]
fn todo_add_filter_and_reload() {
    let temp = tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("open storage"));

    let mut todos = TodoList::load(storage.clone());
    let mut draft = TodoDraft {
        text: "Pay rent".to_string(),
        priority: Priority::High,
        ..TodoDraft::default()
    };
    assert_eq!(todos.add(&mut draft), MutationOutcome::Applied);

    let item = &todos.items()[0];
    assert_eq!(item.text, "Pay rent");
    assert!(!item.completed);
    assert_eq!(item.priority, Priority::High);
    assert_eq!(item.category, "finance");

    assert_eq!(todos.view(TodoFilter::Active).len(), 1);
    assert!(todos.view(TodoFilter::Completed).is_empty());

    let id = item.id.clone();
    assert_eq!(todos.toggle_complete(&id), MutationOutcome::Applied);

    let reopened: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("reopen storage"));
    let reloaded = TodoList::load(reopened);
    assert_eq!(reloaded.items(), todos.items());
    assert_eq!(reloaded.view(TodoFilter::Completed).len(), 1);
    assert!(reloaded.view(TodoFilter::Active).is_empty());
}

#[test]
fn reminder_moves_from_upcoming_to_overdue() {
    let temp = tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("open storage"));

    let mut reminders = Reminders::load(storage);
    assert_eq!(reminders.add(&mut pay_card()), MutationOutcome::Applied);

    let before = at(8, 59, 30);
    let upcoming = reminders.view(ReminderFilter::Upcoming, before);
    assert_eq!(upcoming.len(), 1);
    assert!(!upcoming[0].is_overdue);
    assert!(reminders.view(ReminderFilter::Overdue, before).is_empty());

    let due = collect_due_notifications(reminders.items(), before);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title, "Financial Reminder: Pay card");

    let after = at(9, 0, 1);
    let overdue = reminders.view(ReminderFilter::Overdue, after);
    assert_eq!(overdue.len(), 1);
    assert!(overdue[0].is_overdue);
    assert!(reminders.view(ReminderFilter::Upcoming, after).is_empty());
    assert!(collect_due_notifications(reminders.items(), after).is_empty());
}

#[test]
fn reminders_persist_as_a_json_array() {
    let temp = tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("open storage"));

    let mut reminders = Reminders::load(storage.clone());
    reminders.add(&mut pay_card());

    let raw = storage
        .get_item(REMINDERS_KEY)
        .expect("read")
        .expect("reminders written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let first = &value.as_array().expect("array")[0];
    assert_eq!(first["title"], "Pay card");
    assert_eq!(first["date"], "2025-01-01");
    assert_eq!(first["time"], "09:00");
    assert_eq!(first["category"], "bill");
    assert_eq!(first["completed"], false);
}

#[test]
fn reminders_reload_equal_including_seconds() {
    let temp = tempdir().expect("tempdir");
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("open storage"));

    let mut reminders = Reminders::load(storage);
    reminders.add(&mut pay_card());
    let mut with_seconds = ReminderDraft {
        title: "Rebalance portfolio".to_string(),
        date: "2025-03-31".to_string(),
        time: "09:00:30".to_string(),
        category: ReminderCategory::Investment,
    };
    assert_eq!(reminders.add(&mut with_seconds), MutationOutcome::Applied);
    let first = reminders.items()[0].id.clone();
    reminders.toggle_complete(&first);

    let reopened: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("reopen storage"));
    let reloaded = Reminders::load(reopened.clone());
    assert_eq!(reloaded.items(), reminders.items());
    assert_eq!(reloaded.items()[1].due_at(), at(9, 0, 30) + chrono::TimeDelta::days(89));

    let raw = reopened
        .get_item(REMINDERS_KEY)
        .expect("read")
        .expect("reminders written");
    assert!(raw.contains("\"time\":\"09:00:30\""));
}

#[test]
fn corrupt_file_loads_as_empty_and_is_replaced_on_write() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("todos.json"), "{not json").expect("write corrupt");

    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::open(temp.path()).expect("open storage"));
    let mut todos = TodoList::load(storage.clone());
    assert!(todos.is_empty());

    let mut draft = TodoDraft {
        text: "Review budget".to_string(),
        ..TodoDraft::default()
    };
    assert_eq!(todos.add(&mut draft), MutationOutcome::Applied);

    let raw = storage
        .get_item(TODOS_KEY)
        .expect("read")
        .expect("todos written");
    assert!(raw.starts_with('['));
    assert_eq!(TodoList::load(storage).len(), 1);
}
