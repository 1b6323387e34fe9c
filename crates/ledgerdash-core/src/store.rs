use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::datastore::{Storage, load_collection, save_collection};
use crate::datetime::{parse_reminder_date, parse_reminder_time};
use crate::item::{
    ChatMessage, DEFAULT_TODO_CATEGORY, Priority, ReminderCategory, ReminderItem, TodoItem,
    new_item_id,
};

pub const TODOS_KEY: &str = "todos";
pub const REMINDERS_KEY: &str = "reminders";
pub const CHAT_HISTORY_KEY: &str = "chatHistory";

/// Result of a mutation. Mutations never fail loudly; the outcome says
/// whether anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    ValidationFailed,
    NotFound,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// A record kept in an [`ItemStore`].
pub trait Record: fmt::Debug + Clone + Serialize + DeserializeOwned {
    /// Storage key the whole collection lives under.
    const STORAGE_KEY: &'static str;

    fn id(&self) -> &str;
}

pub trait Completable: Record {
    fn is_completed(&self) -> bool;
    fn toggle_completed(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Empty(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty(field) => write!(f, "{field} is required"),
            Self::Invalid(field) => write!(f, "{field} is not valid"),
        }
    }
}

/// User input that builds one record on submit.
pub trait Draft {
    type Item: Record;

    fn build(&self, id: String) -> Result<Self::Item, ValidationError>;

    /// Resets the fields consumed by a successful submit.
    fn clear(&mut self);
}

impl Record for TodoItem {
    const STORAGE_KEY: &'static str = TODOS_KEY;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Completable for TodoItem {
    fn is_completed(&self) -> bool {
        self.completed
    }

    fn toggle_completed(&mut self) {
        self.completed = !self.completed;
    }
}

impl Record for ReminderItem {
    const STORAGE_KEY: &'static str = REMINDERS_KEY;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Completable for ReminderItem {
    fn is_completed(&self) -> bool {
        self.completed
    }

    fn toggle_completed(&mut self) {
        self.completed = !self.completed;
    }
}

impl Record for ChatMessage {
    const STORAGE_KEY: &'static str = CHAT_HISTORY_KEY;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    pub text: String,
    pub priority: Priority,
    pub category: String,
}

impl Default for TodoDraft {
    fn default() -> Self {
        Self {
            text: String::new(),
            priority: Priority::default(),
            category: DEFAULT_TODO_CATEGORY.to_string(),
        }
    }
}

impl Draft for TodoDraft {
    type Item = TodoItem;

    fn build(&self, id: String) -> Result<TodoItem, ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::Empty("text"));
        }
        Ok(TodoItem {
            id,
            text: self.text.clone(),
            completed: false,
            priority: self.priority,
            category: self.category.clone(),
        })
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderDraft {
    pub title: String,
    pub date: String,
    pub time: String,
    pub category: ReminderCategory,
}

impl Draft for ReminderDraft {
    type Item = ReminderItem;

    fn build(&self, id: String) -> Result<ReminderItem, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty("title"));
        }
        if self.date.trim().is_empty() {
            return Err(ValidationError::Empty("date"));
        }
        if self.time.trim().is_empty() {
            return Err(ValidationError::Empty("time"));
        }
        let date = parse_reminder_date(&self.date).ok_or(ValidationError::Invalid("date"))?;
        let time = parse_reminder_time(&self.time).ok_or(ValidationError::Invalid("time"))?;

        Ok(ReminderItem {
            id,
            title: self.title.clone(),
            date,
            time,
            category: self.category,
            completed: false,
        })
    }

    fn clear(&mut self) {
        self.title.clear();
        self.date.clear();
        self.time.clear();
    }
}

/// Ordered collection persisted write-through under `T::STORAGE_KEY`.
#[derive(Debug)]
pub struct ItemStore<T: Record> {
    items: Vec<T>,
    storage: Arc<dyn Storage>,
}

pub type TodoList = ItemStore<TodoItem>;
pub type Reminders = ItemStore<ReminderItem>;

impl<T: Record> ItemStore<T> {
    #[tracing::instrument(skip(storage), fields(key = T::STORAGE_KEY))]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let items = load_collection::<T>(storage.as_ref(), T::STORAGE_KEY);
        Self { items, storage }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Exact id, or the single id starting with `prefix`.
    pub fn resolve_id(&self, prefix: &str) -> Option<String> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return None;
        }
        if let Some(item) = self.get(prefix) {
            return Some(item.id().to_string());
        }

        let mut matches = self.items.iter().filter(|item| item.id().starts_with(prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            debug!(prefix, "ambiguous id prefix");
            return None;
        }
        Some(first.id().to_string())
    }

    #[tracing::instrument(skip(self, draft), fields(key = T::STORAGE_KEY))]
    pub fn add<D>(&mut self, draft: &mut D) -> MutationOutcome
    where
        D: Draft<Item = T>,
    {
        let id = self.fresh_id();
        let item = match draft.build(id) {
            Ok(item) => item,
            Err(reason) => {
                debug!(%reason, "rejected add");
                return MutationOutcome::ValidationFailed;
            }
        };

        info!(id = item.id(), "added item");
        self.items.push(item);
        self.persist();
        draft.clear();
        MutationOutcome::Applied
    }

    #[tracing::instrument(skip(self), fields(key = T::STORAGE_KEY))]
    pub fn delete(&mut self, id: &str) -> MutationOutcome {
        let Some(idx) = self.items.iter().position(|item| item.id() == id) else {
            debug!("delete target not found");
            return MutationOutcome::NotFound;
        };

        self.items.remove(idx);
        info!(remaining = self.items.len(), "deleted item");
        self.persist();
        MutationOutcome::Applied
    }

    #[tracing::instrument(skip(self), fields(key = T::STORAGE_KEY))]
    pub fn clear(&mut self) {
        self.items.clear();
        if let Err(err) = self.storage.remove_item(T::STORAGE_KEY) {
            warn!(
                key = T::STORAGE_KEY,
                error = %format!("{err:#}"),
                "failed to remove collection"
            );
        }
    }

    pub(crate) fn append(&mut self, item: T) {
        self.items.push(item);
        self.persist();
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = new_item_id();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }

    fn persist(&self) {
        if let Err(err) = save_collection(self.storage.as_ref(), T::STORAGE_KEY, &self.items) {
            warn!(
                key = T::STORAGE_KEY,
                error = %format!("{err:#}"),
                "failed to persist collection"
            );
        }
    }
}

impl<T: Completable> ItemStore<T> {
    #[tracing::instrument(skip(self), fields(key = T::STORAGE_KEY))]
    pub fn toggle_complete(&mut self, id: &str) -> MutationOutcome {
        let Some(item) = self.items.iter_mut().find(|item| item.id() == id) else {
            debug!("toggle target not found");
            return MutationOutcome::NotFound;
        };

        item.toggle_completed();
        info!(completed = item.is_completed(), "toggled item");
        self.persist();
        MutationOutcome::Applied
    }
}
