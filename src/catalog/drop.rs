use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::lock::{CollectionLock, DatabaseLock, LockMode};
use crate::namespace::Namespace;
use crate::repl::OpTime;
use crate::storage::write_unit::{WriteUnitOfWork, write_conflict_retry};

/// Whether a drop may target reserved `system.*` collections. Internal
/// callers replaying a log or cleaning up staging collections are allowed;
/// user commands are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCollectionMode {
    Disallow,
    Allow,
}

/// Drop path used by log replay and by internal cleanup. Tolerates system
/// namespaces when asked to, and stamps the drop with a pre-assigned log
/// position instead of letting the observer produce one.
pub fn drop_collection_for_apply_ops(
    opctx: &OperationContext,
    ns: &Namespace,
    drop_op_time: OpTime,
    mode: SystemCollectionMode,
) -> Result<(), ScrollError> {
    if mode == SystemCollectionMode::Disallow && ns.is_system() && !ns.is_user_writable() {
        return Err(ScrollError::IllegalOperation(format!(
            "cannot drop system collection {ns}"
        )));
    }
    let _db_lock = DatabaseLock::new(opctx, ns.db(), LockMode::IntentExclusive)?;
    let _coll_lock = CollectionLock::new(opctx, ns, LockMode::Exclusive)?;

    let db = opctx
        .catalog()
        .database(ns.db())
        .ok_or_else(|| ScrollError::NamespaceNotFound(ns.ns()))?;

    write_conflict_retry(opctx, "dropCollection", &ns.ns(), || {
        let wunit = WriteUnitOfWork::new(opctx);
        let coll = opctx
            .catalog()
            .lookup_collection_by_namespace(ns)
            .ok_or_else(|| ScrollError::NamespaceNotFound(ns.ns()))?;
        opctx.background().assert_no_bg_op_in_prog_for_ns(ns);
        opctx
            .index_builds()
            .assert_no_index_build_in_prog_for_collection(coll.uuid());

        let observer_time = opctx.observer().on_drop_collection(opctx, ns, coll.uuid())?;
        let chosen = if !drop_op_time.is_null() {
            // A pre-assigned position implies the observer must stay silent.
            assert!(
                observer_time.is_null(),
                "unexpected drop entry written to the log for {ns} at {observer_time} \
                 when a position was pre-assigned"
            );
            drop_op_time
        } else {
            observer_time
        };
        db.drop_collection(opctx, ns, chosen)?;
        wunit.commit();
        Ok(())
    })
}
