use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{AttributeSet, CoreError, FileStorage, PromptKind, Result, Storage};

/// Storage key holding the collection of templates of every kind.
pub const TEMPLATES_KEY: &str = "prompt_architect_templates";

/// A named, immutable snapshot of an attribute set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredTemplate", into = "StoredTemplate")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub snapshot: AttributeSet,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn kind(&self) -> PromptKind {
        self.snapshot.kind()
    }
}

/// On-disk record layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTemplate {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: PromptKind,
    data: Value,
    timestamp: DateTime<Utc>,
}

impl TryFrom<StoredTemplate> for Template {
    type Error = CoreError;

    fn try_from(stored: StoredTemplate) -> Result<Self> {
        Ok(Template {
            snapshot: AttributeSet::from_value(stored.kind, stored.data)?,
            id: stored.id,
            name: stored.name,
            created_at: stored.timestamp,
        })
    }
}

impl From<Template> for StoredTemplate {
    fn from(t: Template) -> Self {
        StoredTemplate {
            kind: t.kind(),
            data: serde_json::to_value(&t.snapshot).unwrap_or_default(),
            id: t.id,
            name: t.name,
            timestamp: t.created_at,
        }
    }
}

/// Named template persistence, one serialized collection under
/// [`TEMPLATES_KEY`]. Kind filtering happens on read.
///
/// Records that fail validation are hidden from reads but written back
/// untouched, so a bad record never costs the user the rest of the library.
pub struct TemplateStore<S = FileStorage> {
    storage: S,
    write_lock: Mutex<()>,
}

impl TemplateStore<FileStorage> {
    /// Store backed by the global data directory.
    pub fn global() -> Self {
        Self::new(FileStorage::global())
    }
}

impl<S: Storage> TemplateStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Every valid template, in insertion order.
    pub fn all(&self) -> Vec<Template> {
        self.read_records()
            .into_iter()
            .filter_map(|record| match decode_record(record) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable template record");
                    None
                }
            })
            .collect()
    }

    /// Templates of `kind`, in insertion order. Never fails.
    pub fn list(&self, kind: PromptKind) -> Vec<Template> {
        self.all().into_iter().filter(|t| t.kind() == kind).collect()
    }

    /// Persist a new template. The kind comes from the snapshot itself.
    pub fn save(&self, name: &str, snapshot: &AttributeSet) -> Result<Template> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput("template name must not be empty"));
        }

        let template = Template {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            snapshot: snapshot.clone(),
            created_at: Utc::now(),
        };

        let _guard = self.lock();
        let mut records = self.read_records();
        records.push(serde_json::to_value(&template)?);
        self.write_records(&records)?;

        info!(id = %template.id, name = %template.name, kind = %template.kind(), "saved template");
        Ok(template)
    }

    pub fn get(&self, id: &str) -> Result<Template> {
        self.all()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    /// Snapshot of the template with `id`.
    pub fn load(&self, id: &str) -> Result<AttributeSet> {
        self.get(id).map(|t| t.snapshot)
    }

    /// Remove the template with `id`. Returns whether anything was removed;
    /// an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock();
        let mut records = self.read_records();
        let before = records.len();
        records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        if records.len() == before {
            debug!(id, "delete of unknown template ignored");
            return Ok(false);
        }
        self.write_records(&records)?;
        info!(id, "deleted template");
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Raw records. Absent or corrupt storage reads as empty.
    fn read_records(&self) -> Vec<Value> {
        let raw = match self.storage.get(TEMPLATES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return vec![],
            Err(e) => {
                warn!(error = %e, "template storage unreadable, treating as empty");
                return vec![];
            }
        };
        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "template collection corrupt, treating as empty");
                vec![]
            }
        }
    }

    fn write_records(&self, records: &[Value]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.storage.set(TEMPLATES_KEY, &json)
    }
}

fn decode_record(record: Value) -> Result<Template> {
    Ok(serde_json::from_value(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;

    fn store() -> TemplateStore<MemoryStorage> {
        TemplateStore::new(MemoryStorage::new())
    }

    fn portrait() -> AttributeSet {
        AttributeSet::from_fields(
            PromptKind::Image,
            [("mainSubject", "cyberpunk hero"), ("shotType", "close-up")],
        )
        .unwrap()
    }

    #[test]
    fn save_then_list_by_kind() {
        let store = store();
        let saved = store.save("  Cyberpunk Hero Portrait ", &portrait()).unwrap();

        assert_eq!(saved.name, "Cyberpunk Hero Portrait");
        assert_eq!(saved.kind(), PromptKind::Image);
        assert_eq!(store.list(PromptKind::Image), vec![saved]);
        assert!(store.list(PromptKind::Text).is_empty());
    }

    #[test]
    fn blank_name_is_rejected_without_writing() {
        let store = store();
        store.save("keep", &portrait()).unwrap();
        let before = store.list(PromptKind::Image);

        let err = store.save("   ", &portrait()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert_eq!(store.list(PromptKind::Image), before);
    }

    #[test]
    fn duplicate_names_get_distinct_ids_in_insertion_order() {
        let store = store();
        let a = store.save("same", &portrait()).unwrap();
        let b = store.save("same", &AttributeSet::empty(PromptKind::Image)).unwrap();
        let c = store.save("same", &AttributeSet::empty(PromptKind::Text)).unwrap();

        assert_ne!(a.id, b.id);
        let ids: Vec<String> = store.list(PromptKind::Image).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(store.list(PromptKind::Text), vec![c]);
    }

    #[test]
    fn load_returns_snapshot_or_not_found() {
        let store = store();
        let saved = store.save("p", &portrait()).unwrap();

        assert_eq!(store.load(&saved.id).unwrap(), portrait());
        assert!(matches!(store.load("missing"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn delete_is_idempotent() {
        let store = store();
        let saved = store.save("p", &portrait()).unwrap();

        assert!(store.delete(&saved.id).unwrap());
        assert!(!store.delete(&saved.id).unwrap());
        assert!(store.list(PromptKind::Image).is_empty());
    }

    #[test]
    fn corrupt_collection_reads_as_empty() {
        let storage = MemoryStorage::new();
        storage.set(TEMPLATES_KEY, "{not json").unwrap();
        let store = TemplateStore::new(storage);

        assert!(store.list(PromptKind::Image).is_empty());
        let saved = store.save("fresh", &portrait()).unwrap();
        assert_eq!(store.list(PromptKind::Image), vec![saved]);
    }

    #[test]
    fn mismatched_record_is_hidden_but_preserved() {
        let storage = MemoryStorage::new();
        let bogus = serde_json::json!([{
            "id": "legacy",
            "name": "text data under image type",
            "type": "IMAGE",
            "data": serde_json::to_value(AttributeSet::empty(PromptKind::Text)).unwrap(),
            "timestamp": "2024-05-01T10:00:00.000Z"
        }]);
        storage.set(TEMPLATES_KEY, &bogus.to_string()).unwrap();
        let store = TemplateStore::new(storage);

        assert!(store.list(PromptKind::Image).is_empty());
        assert!(store.list(PromptKind::Text).is_empty());

        store.save("new", &portrait()).unwrap();
        let raw = store.storage.get(TEMPLATES_KEY).unwrap().unwrap();
        let records: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "legacy");
    }

    #[test]
    fn reads_records_written_by_the_browser_layout() {
        let storage = MemoryStorage::new();
        let mut data = serde_json::to_value(AttributeSet::empty(PromptKind::Text)).unwrap();
        data["purpose"] = "Explain recursion".into();
        let legacy = serde_json::json!([{
            "id": "0b8a3c5e-2d1f-4c8e-9a57-3e1f0d2b6c4a",
            "name": "Teacher",
            "type": "TEXT",
            "data": data,
            "timestamp": "2024-05-01T10:00:00.000Z"
        }]);
        storage.set(TEMPLATES_KEY, &legacy.to_string()).unwrap();
        let store = TemplateStore::new(storage);

        let listed = store.list(PromptKind::Text);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].snapshot.assemble(), "Task: Explain recursion.");
    }

    #[test]
    fn file_backed_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = TemplateStore::new(FileStorage::new(dir.path()));
        let saved = first.save("disk", &portrait()).unwrap();

        let second = TemplateStore::new(FileStorage::new(dir.path()));
        assert_eq!(second.get(&saved.id).unwrap(), saved);
    }
}
