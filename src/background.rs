use crate::catalog::Collection;
use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::namespace::Namespace;
use bson::Document;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Tracks collection-background operations (compactions, offline builds).
/// Callers that require quiescence assert against this registry after
/// blocking new registrations; a live registration at that point is a
/// programming error, hence the panic.
#[derive(Default)]
pub struct BackgroundRegistry {
    in_progress: RwLock<HashSet<String>>,
}

impl BackgroundRegistry {
    pub fn begin_op(&self, ns: &Namespace) {
        self.in_progress.write().insert(ns.ns());
    }

    pub fn end_op(&self, ns: &Namespace) {
        self.in_progress.write().remove(&ns.ns());
    }

    pub fn assert_no_bg_op_in_prog_for_ns(&self, ns: &Namespace) {
        assert!(
            !self.in_progress.read().contains(&ns.ns()),
            "background operation in progress for {ns}"
        );
    }
}

/// Tracks in-progress index builds by collection UUID and owns the path that
/// stamps ready indexes onto a still-empty collection.
#[derive(Default)]
pub struct IndexBuildsCoordinator {
    building: RwLock<HashSet<Uuid>>,
}

impl IndexBuildsCoordinator {
    pub fn begin_build(&self, uuid: Uuid) {
        self.building.write().insert(uuid);
    }

    pub fn end_build(&self, uuid: Uuid) {
        self.building.write().remove(&uuid);
    }

    pub fn assert_no_index_build_in_prog_for_collection(&self, uuid: Uuid) {
        assert!(
            !self.building.read().contains(&uuid),
            "index build in progress for collection {uuid}"
        );
    }

    /// Adds `specs` as ready indexes on an empty collection, one log entry
    /// per index written ahead of the index itself so that each replicated
    /// index creation carries a distinct position preceding any inserts.
    pub fn create_indexes_on_empty_collection(
        &self,
        opctx: &OperationContext,
        coll: &Arc<Collection>,
        specs: &[Document],
    ) -> Result<(), ScrollError> {
        assert_eq!(
            coll.num_records(),
            0,
            "bulk index creation requires an empty collection"
        );
        let ns = coll.ns();
        for spec in specs {
            opctx
                .observer()
                .on_create_indexes(opctx, &ns, coll.uuid(), spec)?;
            coll.add_ready_index(opctx, spec.clone())?;
        }
        Ok(())
    }
}
