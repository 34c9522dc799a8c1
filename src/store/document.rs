//! The in-memory JSON document and its persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::observability::metrics;
use crate::store::query::{ListPage, ListQuery};
use crate::store::StoreError;

pub type SharedStore = Arc<Store>;

/// What a `GET /{resource}` resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Collection(ListPage),
    Singular(Value),
}

/// JSON document holding every resource, optionally backed by a file.
pub struct Store {
    doc: RwLock<Map<String, Value>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open the document at `path`, creating it as `{}` when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if !tokio::fs::try_exists(&path).await? {
            tracing::info!(path = ?path, "Database file missing, creating empty document");
            tokio::fs::write(&path, "{}\n").await?;
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let doc = parse_document(&content)?;

        tracing::info!(
            path = ?path,
            resources = doc.len(),
            "Database loaded"
        );

        Ok(Self {
            doc: RwLock::new(doc),
            path: Some(path),
        })
    }

    /// Build a store that never touches the filesystem.
    pub fn in_memory(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(doc) => Ok(Self {
                doc: RwLock::new(doc),
                path: None,
            }),
            _ => Err(StoreError::InvalidDocument),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file. Returns `true` when the contents changed.
    ///
    /// The file is read under the write lock, the same lock `persist` runs
    /// under, so a reload never sees a file older than the last write.
    pub async fn reload(&self) -> Result<bool, StoreError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let mut doc = self.doc.write().await;
        let content = tokio::fs::read_to_string(path).await?;
        let fresh = parse_document(&content)?;

        if *doc == fresh {
            return Ok(false);
        }
        *doc = fresh;
        Ok(true)
    }

    /// Full copy of the document.
    pub async fn snapshot(&self) -> Value {
        Value::Object(self.doc.read().await.clone())
    }

    /// Names of all top-level resources.
    pub async fn resource_names(&self) -> Vec<String> {
        self.doc.read().await.keys().cloned().collect()
    }

    /// Number of records in a collection. Missing or non-array resources count as empty.
    pub async fn collection_len(&self, name: &str) -> usize {
        match self.doc.read().await.get(name) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    /// Read a resource, applying `query` when it is a collection.
    pub async fn get(&self, name: &str, query: &ListQuery) -> Result<Resource, StoreError> {
        let doc = self.doc.read().await;
        match doc.get(name) {
            Some(Value::Array(items)) => Ok(Resource::Collection(query.apply(items))),
            Some(value) => Ok(Resource::Singular(value.clone())),
            None => Err(StoreError::ResourceNotFound(name.to_string())),
        }
    }

    /// Fetch one record by id.
    pub async fn find(&self, name: &str, id: &str) -> Result<Value, StoreError> {
        let doc = self.doc.read().await;
        let items = collection(&doc, name)?;
        items
            .iter()
            .find(|item| has_id(item, id))
            .cloned()
            .ok_or_else(|| record_not_found(name, id))
    }

    /// Append a record, generating an id when the body has none.
    pub async fn insert(&self, name: &str, body: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = body else {
            return Err(StoreError::NotAnObject);
        };

        let mut doc = self.doc.write().await;
        let items = collection_mut(&mut doc, name)?;

        let id = match fields.get("id").filter(|id| !id.is_null()) {
            Some(id) => {
                let key = id_key(id).unwrap_or_default();
                if items.iter().any(|item| has_id(item, &key)) {
                    return Err(StoreError::DuplicateId(key));
                }
                id.clone()
            }
            None => next_id(items),
        };

        let record = with_id(id, fields);
        items.push(record.clone());

        self.persist(&doc).await?;
        metrics::record_store_mutation("insert");
        Ok(record)
    }

    /// Replace a record wholesale, keeping its id.
    pub async fn replace(&self, name: &str, id: &str, body: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = body else {
            return Err(StoreError::NotAnObject);
        };

        let mut doc = self.doc.write().await;
        let items = collection_mut(&mut doc, name)?;
        let slot = items
            .iter_mut()
            .find(|item| has_id(item, id))
            .ok_or_else(|| record_not_found(name, id))?;

        let existing_id = slot.get("id").cloned().unwrap_or(Value::Null);
        *slot = with_id(existing_id, fields);
        let record = slot.clone();

        self.persist(&doc).await?;
        metrics::record_store_mutation("replace");
        Ok(record)
    }

    /// Merge fields into a record, keeping its id.
    pub async fn update(&self, name: &str, id: &str, body: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = body else {
            return Err(StoreError::NotAnObject);
        };

        let mut doc = self.doc.write().await;
        let items = collection_mut(&mut doc, name)?;
        let slot = items
            .iter_mut()
            .find(|item| has_id(item, id))
            .ok_or_else(|| record_not_found(name, id))?;

        if let Value::Object(existing) = slot {
            for (key, value) in fields {
                if key != "id" {
                    existing.insert(key, value);
                }
            }
        }
        let record = slot.clone();

        self.persist(&doc).await?;
        metrics::record_store_mutation("update");
        Ok(record)
    }

    /// Delete a record by id.
    pub async fn remove(&self, name: &str, id: &str) -> Result<(), StoreError> {
        let mut doc = self.doc.write().await;
        let items = collection_mut(&mut doc, name)?;
        let index = items
            .iter()
            .position(|item| has_id(item, id))
            .ok_or_else(|| record_not_found(name, id))?;
        items.remove(index);

        self.persist(&doc).await?;
        metrics::record_store_mutation("remove");
        Ok(())
    }

    /// Overwrite a singular resource.
    pub async fn replace_singular(&self, name: &str, body: Value) -> Result<Value, StoreError> {
        if !body.is_object() {
            return Err(StoreError::NotAnObject);
        }

        let mut doc = self.doc.write().await;
        let slot = singular_mut(&mut doc, name)?;
        *slot = body.clone();

        self.persist(&doc).await?;
        metrics::record_store_mutation("replace");
        Ok(body)
    }

    /// Merge fields into a singular resource.
    pub async fn update_singular(&self, name: &str, body: Value) -> Result<Value, StoreError> {
        let Value::Object(fields) = body else {
            return Err(StoreError::NotAnObject);
        };

        let mut doc = self.doc.write().await;
        let slot = singular_mut(&mut doc, name)?;
        if let Value::Object(existing) = slot {
            existing.extend(fields);
        }
        let record = slot.clone();

        self.persist(&doc).await?;
        metrics::record_store_mutation("update");
        Ok(record)
    }

    /// Write the document through a temp file and rename.
    async fn persist(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut content = serde_json::to_string_pretty(doc)?;
        content.push('\n');

        let tmp = path.with_extension("json.tmp");
        let result = async {
            tokio::fs::write(&tmp, content).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(path = ?path, error = %e, "Failed to persist database");
        }
        Ok(result?)
    }
}

fn parse_document(content: &str) -> Result<Map<String, Value>, StoreError> {
    match serde_json::from_str(content)? {
        Value::Object(doc) => Ok(doc),
        _ => Err(StoreError::InvalidDocument),
    }
}

fn collection<'a>(doc: &'a Map<String, Value>, name: &str) -> Result<&'a Vec<Value>, StoreError> {
    match doc.get(name) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StoreError::NotACollection(name.to_string())),
        None => Err(StoreError::ResourceNotFound(name.to_string())),
    }
}

fn collection_mut<'a>(
    doc: &'a mut Map<String, Value>,
    name: &str,
) -> Result<&'a mut Vec<Value>, StoreError> {
    match doc.get_mut(name) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StoreError::NotACollection(name.to_string())),
        None => Err(StoreError::ResourceNotFound(name.to_string())),
    }
}

fn singular_mut<'a>(doc: &'a mut Map<String, Value>, name: &str) -> Result<&'a mut Value, StoreError> {
    match doc.get_mut(name) {
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(StoreError::NotSingular(name.to_string())),
        None => Err(StoreError::ResourceNotFound(name.to_string())),
    }
}

fn record_not_found(resource: &str, id: &str) -> StoreError {
    StoreError::RecordNotFound {
        resource: resource.to_string(),
        id: id.to_string(),
    }
}

/// String form of an id value; only strings and numbers qualify.
fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_id(item: &Value, id: &str) -> bool {
    item.get("id").and_then(id_key).is_some_and(|key| key == id)
}

/// Numeric successor of the highest numeric id, or a short random id when
/// the collection already uses non-numeric ids.
fn next_id(items: &[Value]) -> Value {
    let ids: Vec<&Value> = items.iter().filter_map(|item| item.get("id")).collect();
    if ids.is_empty() {
        return Value::from(1);
    }

    let numeric: Option<Vec<i64>> = ids.iter().map(|id| id.as_i64()).collect();
    if let Some(next) = numeric
        .and_then(|ids| ids.into_iter().max())
        .and_then(|max| max.checked_add(1))
    {
        return Value::from(next);
    }

    random_id()
}

/// Seven random hex characters.
fn random_id() -> Value {
    let random = uuid::Uuid::new_v4().simple().to_string();
    Value::String(random[..7].to_string())
}

/// Rebuild a record with `id` as its first field.
fn with_id(id: Value, fields: Map<String, Value>) -> Value {
    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert("id".to_string(), id);
    for (key, value) in fields {
        if key != "id" {
            record.insert(key, value);
        }
    }
    Value::Object(record)
}
