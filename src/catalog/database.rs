use crate::catalog::collection::{Collection, CollectionOptions};
use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::lock::LockMode;
use crate::namespace::Namespace;
use crate::repl::OpTime;
use rand::Rng;
use std::sync::Arc;

const UNIQUE_NAME_ATTEMPTS: usize = 10;

/// Handle on one database of the catalog. Carries no state of its own; every
/// method resolves against the catalog of the operation's service context.
pub struct Database {
    name: String,
}

impl Database {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_drop_pending(&self, opctx: &OperationContext) -> bool {
        opctx.catalog().is_database_drop_pending(&self.name)
    }

    /// Creates a collection and transcribes the creation. Requires an active
    /// write unit and at least an intent-exclusive database lock.
    pub fn create_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        options: CollectionOptions,
    ) -> Result<Arc<Collection>, ScrollError> {
        assert_eq!(ns.db(), self.name, "collection created in foreign database");
        assert!(
            opctx.is_db_locked_for_mode(&self.name, LockMode::IntentExclusive),
            "createCollection requires the database lock"
        );
        let coll = Collection::new(opctx.catalog().next_catalog_id(), ns.clone(), options.clone());
        opctx.catalog().register_collection(opctx, Arc::clone(&coll))?;
        opctx
            .observer()
            .on_create_collection(opctx, ns, coll.uuid(), &options)?;
        Ok(coll)
    }

    /// Drops a collection. With a null log position, or for namespaces the
    /// oplog does not cover, the collection is removed outright. Otherwise it
    /// is parked under a drop-pending namespace stamped with the position, so
    /// that it stays resolvable by UUID until physical removal.
    pub fn drop_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        drop_op_time: OpTime,
    ) -> Result<(), ScrollError> {
        assert_eq!(ns.db(), self.name, "collection dropped in foreign database");
        assert!(
            opctx.is_db_locked_for_mode(&self.name, LockMode::IntentExclusive),
            "dropCollection requires the database lock"
        );
        let catalog = opctx.catalog();
        if catalog.lookup_collection_by_namespace(ns).is_none() {
            return Err(ScrollError::NamespaceNotFound(ns.ns()));
        }
        let immediate = drop_op_time.is_null()
            || ns.is_drop_pending()
            || opctx.repl().is_oplog_disabled_for(ns);
        if immediate {
            catalog.deregister_collection(opctx, ns)?;
        } else {
            let parked = ns.drop_pending_variant(drop_op_time.ts());
            catalog.rename_collection_entry(opctx, ns, &parked, true)?;
        }
        Ok(())
    }

    /// Rebinds `source` to `target` within this database, preserving the
    /// collection's UUID and record store. The temporary marker survives only
    /// when `stay_temp` is set.
    pub fn rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        stay_temp: bool,
    ) -> Result<(), ScrollError> {
        assert_eq!(source.db(), self.name, "rename source in foreign database");
        assert_eq!(target.db(), self.name, "rename target crosses databases");
        assert!(
            opctx.is_db_locked_for_mode(&self.name, LockMode::IntentExclusive),
            "renameCollection requires the database lock"
        );
        opctx
            .catalog()
            .rename_collection_entry(opctx, source, target, stay_temp)
    }

    /// Generates an unused namespace in this database by expanding each `%`
    /// of `pattern` to a random hex digit. Only sound under an exclusive
    /// database lock: nothing else can bind the name before the caller does.
    pub fn make_unique_collection_namespace(
        &self,
        opctx: &OperationContext,
        pattern: &str,
    ) -> Result<Namespace, ScrollError> {
        assert!(
            opctx.is_db_locked_for_mode(&self.name, LockMode::Exclusive),
            "unique namespace generation requires an exclusive database lock"
        );
        let catalog = opctx.catalog();
        let mut rng = rand::thread_rng();
        for _ in 0..UNIQUE_NAME_ATTEMPTS {
            let coll: String = pattern
                .chars()
                .map(|c| {
                    if c == '%' {
                        char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0')
                    } else {
                        c
                    }
                })
                .collect();
            let candidate = Namespace::new(self.name.clone(), coll);
            if catalog.lookup_collection_by_namespace(&candidate).is_none()
                && catalog.lookup_view_by_namespace(&candidate).is_none()
            {
                return Ok(candidate);
            }
        }
        Err(ScrollError::NamespaceExists(format!(
            "could not generate an unused namespace in '{}' for pattern '{pattern}'",
            self.name
        )))
    }
}
