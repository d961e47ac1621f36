pub mod collection;
pub mod database;
pub mod drop;
pub mod rename;

pub use collection::{Collection, CollectionOptions, is_id_index};
pub use database::Database;

use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::namespace::Namespace;
use bson::Document;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// A named query over another collection; collides with collections in the
/// name catalog but has no storage of its own.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub ns: Namespace,
    pub view_on: String,
    pub pipeline: Vec<Document>,
}

#[derive(Default)]
struct DatabaseInfo {
    drop_pending: bool,
}

#[derive(Default)]
struct CatalogState {
    databases: HashMap<String, DatabaseInfo>,
    collections: HashMap<Namespace, Arc<Collection>>,
    by_uuid: HashMap<Uuid, Namespace>,
    views: HashMap<Namespace, ViewDefinition>,
}

/// The name catalog: namespace and UUID bindings for every live collection
/// and view. Mutations participate in the active write unit; readers see
/// either the pre- or the post-state of a unit, never a partial one, because
/// mutators hold the relevant exclusive collection locks for the unit's
/// lifetime.
#[derive(Default)]
pub struct CollectionCatalog {
    state: Arc<RwLock<CatalogState>>,
    next_catalog_id: AtomicU64,
}

impl CollectionCatalog {
    pub fn lookup_collection_by_namespace(&self, ns: &Namespace) -> Option<Arc<Collection>> {
        self.state.read().collections.get(ns).cloned()
    }

    pub fn lookup_collection_by_uuid(&self, uuid: Uuid) -> Option<Arc<Collection>> {
        let state = self.state.read();
        let ns = state.by_uuid.get(&uuid)?;
        state.collections.get(ns).cloned()
    }

    pub fn lookup_namespace_by_uuid(&self, uuid: Uuid) -> Option<Namespace> {
        self.state.read().by_uuid.get(&uuid).cloned()
    }

    pub fn lookup_view_by_namespace(&self, ns: &Namespace) -> Option<ViewDefinition> {
        self.state.read().views.get(ns).cloned()
    }

    pub fn collection_namespaces_in(&self, db: &str) -> Vec<Namespace> {
        let mut namespaces: Vec<_> = self
            .state
            .read()
            .collections
            .keys()
            .filter(|ns| ns.db() == db)
            .cloned()
            .collect();
        namespaces.sort();
        namespaces
    }

    pub fn database(&self, name: &str) -> Option<Database> {
        self.state
            .read()
            .databases
            .contains_key(name)
            .then(|| Database::new(name))
    }

    pub fn open_database(&self, name: &str) -> Database {
        self.state
            .write()
            .databases
            .entry(name.to_string())
            .or_default();
        Database::new(name)
    }

    pub fn is_database_drop_pending(&self, name: &str) -> bool {
        self.state
            .read()
            .databases
            .get(name)
            .is_some_and(|info| info.drop_pending)
    }

    pub fn set_database_drop_pending(&self, name: &str, drop_pending: bool) {
        if let Some(info) = self.state.write().databases.get_mut(name) {
            info.drop_pending = drop_pending;
        }
    }

    /// Index descriptors of the named collection; an empty list when the
    /// collection does not exist.
    pub fn list_index_specs_empty_if_missing(&self, ns: &Namespace) -> Vec<Document> {
        self.lookup_collection_by_namespace(ns)
            .map(|coll| coll.ready_index_specs())
            .unwrap_or_default()
    }

    pub fn define_view(&self, view: ViewDefinition) -> Result<(), ScrollError> {
        let mut state = self.state.write();
        if state.collections.contains_key(&view.ns) || state.views.contains_key(&view.ns) {
            return Err(ScrollError::NamespaceExists(view.ns.ns()));
        }
        state
            .databases
            .entry(view.ns.db().to_string())
            .or_default();
        state.views.insert(view.ns.clone(), view);
        Ok(())
    }

    pub(crate) fn next_catalog_id(&self) -> u64 {
        self.next_catalog_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn register_collection(
        &self,
        opctx: &OperationContext,
        coll: Arc<Collection>,
    ) -> Result<(), ScrollError> {
        let ns = coll.ns();
        {
            let mut state = self.state.write();
            if state.collections.contains_key(&ns) || state.views.contains_key(&ns) {
                return Err(ScrollError::NamespaceExists(ns.ns()));
            }
            state.by_uuid.insert(coll.uuid(), ns.clone());
            state.collections.insert(ns.clone(), Arc::clone(&coll));
        }
        let catalog = self.shared_state();
        let uuid = coll.uuid();
        opctx.register_rollback(move || {
            let mut state = catalog.write();
            state.collections.remove(&ns);
            state.by_uuid.remove(&uuid);
        });
        Ok(())
    }

    pub(crate) fn deregister_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
    ) -> Result<Arc<Collection>, ScrollError> {
        let coll = {
            let mut state = self.state.write();
            let coll = state
                .collections
                .remove(ns)
                .ok_or_else(|| ScrollError::NamespaceNotFound(ns.ns()))?;
            state.by_uuid.remove(&coll.uuid());
            coll
        };
        let catalog = self.shared_state();
        let undo_ns = ns.clone();
        let undo_coll = Arc::clone(&coll);
        opctx.register_rollback(move || {
            let mut state = catalog.write();
            state.by_uuid.insert(undo_coll.uuid(), undo_ns.clone());
            state.collections.insert(undo_ns, undo_coll);
        });
        Ok(coll)
    }

    /// Rebinds `source` to `target` in place: same handle, same UUID, same
    /// records. Clears the temporary marker unless `stay_temp`.
    pub(crate) fn rename_collection_entry(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        stay_temp: bool,
    ) -> Result<(), ScrollError> {
        let (coll, was_temp) = {
            let mut state = self.state.write();
            if state.collections.contains_key(target) || state.views.contains_key(target) {
                return Err(ScrollError::NamespaceExists(target.ns()));
            }
            let coll = state
                .collections
                .remove(source)
                .ok_or_else(|| ScrollError::NamespaceNotFound(source.ns()))?;
            let was_temp = coll.is_temp();
            if !stay_temp {
                coll.set_temp(false);
            }
            coll.set_ns(target.clone());
            state.collections.insert(target.clone(), Arc::clone(&coll));
            state.by_uuid.insert(coll.uuid(), target.clone());
            (coll, was_temp)
        };
        let catalog = self.shared_state();
        let undo_source = source.clone();
        let undo_target = target.clone();
        opctx.register_rollback(move || {
            let mut state = catalog.write();
            state.collections.remove(&undo_target);
            coll.set_ns(undo_source.clone());
            coll.set_temp(was_temp);
            state.by_uuid.insert(coll.uuid(), undo_source.clone());
            state.collections.insert(undo_source, coll);
        });
        Ok(())
    }

    fn shared_state(&self) -> Arc<RwLock<CatalogState>> {
        Arc::clone(&self.state)
    }
}

/// While in scope, inserts by this operation skip collection validators.
/// Documents moved verbatim between collections are not re-validated.
pub struct DisableDocumentValidation<'a> {
    opctx: &'a OperationContext,
}

impl<'a> DisableDocumentValidation<'a> {
    pub fn new(opctx: &'a OperationContext) -> Self {
        let depth = opctx.validation_disabled_depth();
        depth.set(depth.get() + 1);
        Self { opctx }
    }
}

impl Drop for DisableDocumentValidation<'_> {
    fn drop(&mut self) {
        let depth = self.opctx.validation_disabled_depth();
        depth.set(depth.get() - 1);
    }
}
