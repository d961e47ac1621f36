use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::namespace::Namespace;
use crate::storage::{Cursor, RecordStore};
use bson::{Document, doc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Durable collection options. Serialized to an opaque document for
/// comparison and replication; the UUID field is stripped where two
/// incarnations of "the same" collection must compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub temp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<Document>,
}

impl CollectionOptions {
    pub fn to_document(&self) -> Result<Document, ScrollError> {
        Ok(bson::to_document(self)?)
    }

    pub fn to_document_without_uuid(&self) -> Result<Document, ScrollError> {
        let mut document = self.to_document()?;
        document.remove("uuid");
        Ok(document)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) spec: Document,
    pub(crate) ready: bool,
}

struct CollectionState {
    ns: Namespace,
    temp: bool,
    validator: Option<Document>,
    indexes: Vec<IndexEntry>,
}

/// A live collection. The handle survives same-database renames: only the
/// bound namespace changes, never the UUID or the backing record store.
pub struct Collection {
    uuid: Uuid,
    catalog_id: u64,
    records: RecordStore,
    state: Arc<RwLock<CollectionState>>,
}

impl Collection {
    pub(crate) fn new(catalog_id: u64, ns: Namespace, options: CollectionOptions) -> Arc<Self> {
        let uuid = options.uuid.unwrap_or_else(Uuid::new_v4);
        Arc::new(Self {
            uuid,
            catalog_id,
            records: RecordStore::new(),
            state: Arc::new(RwLock::new(CollectionState {
                ns,
                temp: options.temp,
                validator: options.validator,
                // Every collection carries the implicit primary-key index.
                indexes: vec![IndexEntry {
                    spec: id_index_spec(),
                    ready: true,
                }],
            })),
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn catalog_id(&self) -> u64 {
        self.catalog_id
    }

    pub fn ns(&self) -> Namespace {
        self.state.read().ns.clone()
    }

    pub fn is_temp(&self) -> bool {
        self.state.read().temp
    }

    pub fn num_records(&self) -> u64 {
        self.records.num_records()
    }

    pub fn cursor(&self) -> Cursor {
        self.records.cursor()
    }

    pub fn record_store(&self) -> &RecordStore {
        &self.records
    }

    pub fn options(&self) -> CollectionOptions {
        let state = self.state.read();
        CollectionOptions {
            uuid: Some(self.uuid),
            temp: state.temp,
            validator: state.validator.clone(),
        }
    }

    /// Inserts a document, enforcing the collection validator unless the
    /// operation has validation disabled. Requires an active write unit.
    pub fn insert_document(
        &self,
        opctx: &OperationContext,
        document: &Document,
    ) -> Result<(), ScrollError> {
        let ns = {
            let state = self.state.read();
            if !opctx.is_document_validation_disabled()
                && let Some(validator) = &state.validator
                && !matches_validator(document, validator)
            {
                return Err(ScrollError::DocumentValidationFailed {
                    namespace: state.ns.ns(),
                });
            }
            state.ns.clone()
        };
        let mut bytes = Vec::new();
        document
            .to_writer(&mut bytes)
            .map_err(|err| ScrollError::Decode(err.to_string()))?;
        self.records.insert(opctx, bytes);
        opctx.observer().on_inserts(opctx, &ns, self.uuid, 1)?;
        Ok(())
    }

    /// Serialized descriptors of all finished indexes, in creation order.
    pub fn ready_index_specs(&self) -> Vec<Document> {
        self.state
            .read()
            .indexes
            .iter()
            .filter(|entry| entry.ready)
            .map(|entry| entry.spec.clone())
            .collect()
    }

    pub(crate) fn add_ready_index(
        &self,
        opctx: &OperationContext,
        spec: Document,
    ) -> Result<(), ScrollError> {
        let name = index_name(&spec)?.to_string();
        {
            let mut state = self.state.write();
            if state
                .indexes
                .iter()
                .any(|entry| index_name(&entry.spec).is_ok_and(|n| n == name))
            {
                return Err(ScrollError::CommandFailed(format!(
                    "index '{name}' already exists on {}",
                    state.ns
                )));
            }
            state.indexes.push(IndexEntry { spec, ready: true });
        }
        let state = Arc::clone(&self.state);
        opctx.register_rollback(move || {
            state
                .write()
                .indexes
                .retain(|entry| index_name(&entry.spec).is_ok_and(|n| n != name));
        });
        Ok(())
    }

    pub(crate) fn set_ns(&self, ns: Namespace) {
        self.state.write().ns = ns;
    }

    /// Returns the previous value.
    pub(crate) fn set_temp(&self, temp: bool) -> bool {
        let mut state = self.state.write();
        std::mem::replace(&mut state.temp, temp)
    }
}

pub(crate) fn id_index_spec() -> Document {
    doc! { "v": 2i32, "key": { "_id": 1i32 }, "name": "_id_" }
}

pub fn is_id_index(spec: &Document) -> bool {
    spec.get_str("name") == Ok("_id_")
}

fn index_name(spec: &Document) -> Result<&str, ScrollError> {
    spec.get_str("name")
        .map_err(|_| ScrollError::BadValue("index spec has no 'name' field".into()))
}

/// Minimal validator semantics: every top-level field of the validator must
/// be present in the document with an equal value.
fn matches_validator(document: &Document, validator: &Document) -> bool {
    validator
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}
