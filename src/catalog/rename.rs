//! Collection rename.
//!
//! Rebinds a target namespace to the contents and identity of a source
//! collection, atomically with respect to catalog readers and replicated
//! observers. Same-database renames keep the collection's UUID; a
//! cross-database rename copies into a freshly created collection in the
//! target database and then drops the source, so the UUID changes.

use crate::catalog::DisableDocumentValidation;
use crate::catalog::collection::{Collection, is_id_index};
use crate::catalog::database::Database;
use crate::catalog::drop::{SystemCollectionMode, drop_collection_for_apply_ops};
use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::failpoint::{RENAME_PATH_THROUGH_CONFIG_SERVER, WRITE_CONFLICT_IN_RENAME_COPY};
use crate::lock::{CollectionLock, DatabaseLock, LockMode, UninterruptibleLockGuard};
use crate::namespace::Namespace;
use crate::repl::{OpTime, ReplicationMode, UnreplicatedWritesBlock};
use crate::storage::write_unit::{WriteUnitOfWork, write_conflict_retry};
use bson::spec::BinarySubtype;
use bson::{Bson, Document};
use scopeguard::ScopeGuard;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    /// Drop an existing target collection instead of failing.
    pub drop_target: bool,
    /// Preserve the temporary marker on the renamed collection.
    pub stay_temp: bool,
}

/// From a replicated to an unreplicated collection or vice versa.
fn is_replicated_changed(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
) -> bool {
    let repl = opctx.repl();
    repl.is_oplog_disabled_for(source) != repl.is_oplog_disabled_for(target)
}

fn check_source_and_target_namespaces(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    options: RenameOptions,
    target_exists_allowed: bool,
) -> Result<(), ScrollError> {
    let repl = opctx.repl();
    if opctx.writes_are_replicated() && !repl.can_accept_writes_for(source) {
        return Err(ScrollError::NotPrimary(format!(
            "not primary while renaming collection {source} to {target}"
        )));
    }

    if !opctx
        .fail_points()
        .should_fail(RENAME_PATH_THROUGH_CONFIG_SERVER)
        && opctx.sharding().is_collection_sharded(source)
    {
        return Err(ScrollError::IllegalOperation(
            "source namespace cannot be sharded".into(),
        ));
    }

    if is_replicated_changed(opctx, source, target) {
        return Err(ScrollError::IllegalOperation(
            "cannot rename collections between a replicated and an unreplicated database".into(),
        ));
    }

    let catalog = opctx.catalog();
    if catalog.database(source.db()).is_none() || catalog.is_database_drop_pending(source.db()) {
        return Err(ScrollError::NamespaceNotFound(format!(
            "database {} does not exist or is drop pending",
            source.db()
        )));
    }

    let Some(source_coll) = catalog.lookup_collection_by_namespace(source) else {
        if catalog.lookup_view_by_namespace(source).is_some() {
            return Err(ScrollError::CommandNotSupportedOnView(format!(
                "cannot rename view: {source}"
            )));
        }
        return Err(ScrollError::NamespaceNotFound(format!(
            "source collection {source} does not exist"
        )));
    };

    // Callers are responsible for quiescing these before entering; a live
    // one here is a programming error.
    opctx.background().assert_no_bg_op_in_prog_for_ns(source);
    opctx
        .index_builds()
        .assert_no_index_build_in_prog_for_collection(source_coll.uuid());

    match catalog.lookup_collection_by_namespace(target) {
        Some(_) => {
            if opctx.sharding().is_collection_sharded(target) {
                return Err(ScrollError::IllegalOperation(
                    "cannot rename to a sharded collection".into(),
                ));
            }
            if !target_exists_allowed && !options.drop_target {
                return Err(ScrollError::NamespaceExists("target namespace exists".into()));
            }
        }
        None => {
            if catalog.lookup_view_by_namespace(target).is_some() {
                return Err(ScrollError::NamespaceExists(format!(
                    "a view already exists with that name: {target}"
                )));
            }
        }
    }

    Ok(())
}

/// Moves an in-the-way target collection aside to a generated name so a
/// later drop-by-UUID can still find it. The move itself is not transcribed.
fn rename_target_collection_to_tmp(
    opctx: &OperationContext,
    source_ns: &Namespace,
    source_uuid: Uuid,
    db: &Database,
    target_ns: &Namespace,
    target_uuid: Uuid,
) -> Result<(), ScrollError> {
    let _unreplicated = UnreplicatedWritesBlock::new(opctx);

    // The generated name is only guaranteed unused while the database stays
    // exclusively locked.
    assert!(
        opctx.is_db_locked_for_mode(db.name(), LockMode::Exclusive),
        "moving the target aside requires an exclusive database lock"
    );
    let tmp_name = db.make_unique_collection_namespace(opctx, "tmp%%%%%.rename")?;
    let stay_temp = true;
    write_conflict_retry(opctx, "renameCollection", &target_ns.ns(), || {
        let wunit = WriteUnitOfWork::new(opctx);
        db.rename_collection(opctx, target_ns, &tmp_name, stay_temp)?;
        wunit.commit();
        tracing::info!(
            target = %target_ns,
            target_uuid = %target_uuid,
            tmp = %tmp_name,
            source = %source_ns,
            source_uuid = %source_uuid,
            "renamed the target aside so the source can take its name"
        );
        Ok(())
    })
}

/// In-place rebind when no target collection is in the way.
fn rename_collection_directly(
    opctx: &OperationContext,
    db: &Database,
    uuid: Uuid,
    source: &Namespace,
    target: &Namespace,
    options: RenameOptions,
) -> Result<(), ScrollError> {
    write_conflict_retry(opctx, "renameCollection", &target.ns(), || {
        let wunit = WriteUnitOfWork::new(opctx);

        {
            // The whole command is transcribed as a single entry below.
            let _unreplicated = UnreplicatedWritesBlock::new(opctx);
            db.rename_collection(opctx, source, target, options.stay_temp)?;
        }

        // The observer holds the oplog collection lock; not safe to abandon
        // mid-way.
        let _no_interrupt = UninterruptibleLockGuard::new(opctx);

        // The dropped-target fields stay empty regardless of the requested
        // options so a replay never removes an unrelated same-named
        // collection on another node.
        opctx.observer().on_rename_collection(
            opctx,
            source,
            target,
            uuid,
            None,
            0,
            options.stay_temp,
        )?;

        wunit.commit();
        Ok(())
    })
}

/// Rebind with a collision: the pre/post observer pair brackets the drop of
/// the target so a replay sees exactly the user-requested operation.
#[allow(clippy::too_many_arguments)]
fn rename_collection_and_drop_target(
    opctx: &OperationContext,
    db: &Database,
    uuid: Uuid,
    source: &Namespace,
    target: &Namespace,
    target_coll: &Arc<Collection>,
    options: RenameOptions,
    rename_op_time_from_apply_ops: OpTime,
) -> Result<(), ScrollError> {
    write_conflict_retry(opctx, "renameCollection", &target.ns(), || {
        let wunit = WriteUnitOfWork::new(opctx);

        assert!(options.drop_target, "target exists but dropping it was not requested");

        if !opctx.repl().is_oplog_disabled_for(target) {
            assert!(opctx.writes_are_replicated());
            assert!(rename_op_time_from_apply_ops.is_null());
        }

        let num_records = target_coll.num_records();
        let mut rename_op_time = opctx.observer().pre_rename_collection(
            opctx,
            source,
            target,
            uuid,
            Some(target_coll.uuid()),
            num_records,
            options.stay_temp,
        )?;

        if !rename_op_time_from_apply_ops.is_null() {
            // A pre-assigned position implies writes are not replicated, so
            // the observer must not have produced one of its own.
            if !rename_op_time.is_null() {
                tracing::error!(
                    %source,
                    %target,
                    %rename_op_time,
                    "unexpected rename entry written to the log while applying \
                     a pre-assigned position"
                );
                panic!(
                    "renameCollection {source} to {target} (with dropTarget=true): unexpected \
                     rename entry written to the log at {rename_op_time}"
                );
            }
            rename_op_time = rename_op_time_from_apply_ops;
        }

        // The pre-rename entry above covers the whole command.
        let _unreplicated = UnreplicatedWritesBlock::new(opctx);

        let victim_ns = target_coll.ns();
        opctx.background().assert_no_bg_op_in_prog_for_ns(&victim_ns);
        opctx
            .index_builds()
            .assert_no_index_build_in_prog_for_collection(target_coll.uuid());

        db.drop_collection(opctx, &victim_ns, rename_op_time)?;
        db.rename_collection(opctx, source, target, options.stay_temp)?;

        opctx.observer().post_rename_collection(
            opctx,
            source,
            target,
            uuid,
            Some(target_coll.uuid()),
            options.stay_temp,
        )?;

        wunit.commit();
        Ok(())
    })
}

fn rename_collection_within_db(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    options: RenameOptions,
) -> Result<(), ScrollError> {
    assert_eq!(source.db(), target.db(), "same-database rename crosses databases");
    let _validation = DisableDocumentValidation::new(opctx);

    let _db_lock = DatabaseLock::new(opctx, source.db(), LockMode::IntentExclusive)?;
    opctx.sharding().check_db_version(source.db())?;

    // Deadlock avoidance: the views catalog is always locked last, because
    // every view-related operation also locks it last; otherwise lock in
    // ascending resource-id order.
    let _source_lock;
    let _target_lock;
    if !source.is_system_views()
        && (target.is_system_views() || source.resource_id() < target.resource_id())
    {
        _source_lock = CollectionLock::new(opctx, source, LockMode::Exclusive)?;
        _target_lock = CollectionLock::new(opctx, target, LockMode::Exclusive)?;
    } else {
        _target_lock = CollectionLock::new(opctx, target, LockMode::Exclusive)?;
        _source_lock = CollectionLock::new(opctx, source, LockMode::Exclusive)?;
    }

    check_source_and_target_namespaces(opctx, source, target, options, false)?;

    let catalog = opctx.catalog();
    let db = catalog
        .database(source.db())
        .ok_or_else(|| ScrollError::NamespaceNotFound(source.ns()))?;
    let source_coll = catalog
        .lookup_collection_by_namespace(source)
        .ok_or_else(|| ScrollError::NamespaceNotFound(source.ns()))?;

    match catalog.lookup_collection_by_namespace(target) {
        None => rename_collection_directly(opctx, &db, source_coll.uuid(), source, target, options),
        Some(target_coll) => rename_collection_and_drop_target(
            opctx,
            &db,
            source_coll.uuid(),
            source,
            target,
            &target_coll,
            options,
            OpTime::NULL,
        ),
    }
}

/// Same-database rename while replaying a log entry. Idempotent: the entry
/// may have fully or partially applied already, and the collection to drop
/// is identified by UUID rather than by name.
fn rename_collection_within_db_for_apply_ops(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    uuid_to_drop: Option<Uuid>,
    rename_op_time_from_apply_ops: OpTime,
    options: RenameOptions,
) -> Result<(), ScrollError> {
    assert_eq!(source.db(), target.db(), "same-database rename crosses databases");
    let _validation = DisableDocumentValidation::new(opctx);

    // Exclusive database lock: subsumes the collection locks and satisfies
    // the unique-name-generation contract of the move-aside branch.
    let _db_lock = DatabaseLock::new(opctx, source.db(), LockMode::Exclusive)?;
    opctx.sharding().check_db_version(source.db())?;

    check_source_and_target_namespaces(opctx, source, target, options, true)?;

    let catalog = opctx.catalog();
    let db = catalog
        .database(source.db())
        .ok_or_else(|| ScrollError::NamespaceNotFound(source.ns()))?;
    let source_coll = catalog
        .lookup_collection_by_namespace(source)
        .ok_or_else(|| ScrollError::NamespaceNotFound(source.ns()))?;

    write_conflict_retry(opctx, "renameCollection", &target.ns(), || {
        let mut target_coll = opctx.catalog().lookup_collection_by_namespace(target);
        let wuow = WriteUnitOfWork::new(opctx);

        if let Some(tc) = target_coll.clone() {
            if source_coll.uuid() == tc.uuid() {
                if uuid_to_drop.is_none() || uuid_to_drop == Some(tc.uuid()) {
                    wuow.commit();
                    return Ok(());
                }

                // An earlier replay already moved the source onto the target;
                // all that remains is dropping the identified victim.
                let Some(to_drop) = opctx
                    .catalog()
                    .lookup_namespace_by_uuid(uuid_to_drop.expect("checked above"))
                else {
                    wuow.commit();
                    return Ok(());
                };
                let _unreplicated = UnreplicatedWritesBlock::new(opctx);
                db.drop_collection(opctx, &to_drop, rename_op_time_from_apply_ops)?;
                wuow.commit();
                return Ok(());
            }

            if uuid_to_drop.is_none() || uuid_to_drop != Some(tc.uuid()) {
                // The occupant is not the victim this entry names; move it
                // aside rather than dropping it.
                rename_target_collection_to_tmp(
                    opctx,
                    source,
                    source_coll.uuid(),
                    &db,
                    target,
                    tc.uuid(),
                )?;
                target_coll = None;
            }
        }

        // Identify the collection to drop by UUID: replaying by name could
        // remove the wrong collection.
        if target_coll.is_none()
            && let Some(uuid) = uuid_to_drop
        {
            assert!(options.drop_target, "a victim UUID requires dropTarget");
            if let Some(ns) = opctx.catalog().lookup_namespace_by_uuid(uuid)
                && !ns.is_drop_pending()
            {
                assert_eq!(
                    ns.db(),
                    target.db(),
                    "victim collection resolved outside the target database"
                );
                target_coll = opctx.catalog().lookup_collection_by_namespace(&ns);
            }
        }

        let result = match &target_coll {
            None => rename_collection_directly(
                opctx,
                &db,
                source_coll.uuid(),
                source,
                target,
                options,
            ),
            Some(tc) => {
                if Arc::ptr_eq(&source_coll, tc) {
                    wuow.commit();
                    return Ok(());
                }
                rename_collection_and_drop_target(
                    opctx,
                    &db,
                    source_coll.uuid(),
                    source,
                    target,
                    tc,
                    options,
                    rename_op_time_from_apply_ops,
                )
            }
        };

        if result.is_ok() {
            wuow.commit();
        }
        result
    })
}

/// Cross-database rename: copy into a generated staging collection in the
/// target database, promote it with the same-database path, then drop the
/// source.
fn rename_between_dbs(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    options: RenameOptions,
) -> Result<(), ScrollError> {
    assert_ne!(source.db(), target.db(), "cross-database rename within one database");

    // The source is only read; a shared collection lock suffices. Database
    // intent lock first so the stronger target lock below cannot force a
    // mode upgrade.
    let mut source_db_lock = None;
    let mut source_coll_lock = None;
    if !opctx.is_collection_locked_for_mode(source, LockMode::Shared) {
        source_db_lock = Some(DatabaseLock::new(opctx, source.db(), LockMode::IntentExclusive)?);
        source_coll_lock = Some(CollectionLock::new(opctx, source, LockMode::Shared)?);
    }
    let mut target_db_lock = None;
    if !opctx.is_db_locked_for_mode(target.db(), LockMode::Exclusive) {
        target_db_lock = Some(DatabaseLock::new(opctx, target.db(), LockMode::Exclusive)?);
    }

    opctx.sharding().check_db_version(source.db())?;
    let _validation = DisableDocumentValidation::new(opctx);

    let catalog = opctx.catalog();
    if catalog.database(source.db()).is_none() {
        return Err(ScrollError::NamespaceNotFound(
            "source namespace does not exist".into(),
        ));
    }
    let Some(source_coll) = catalog.lookup_collection_by_namespace(source) else {
        if catalog.lookup_view_by_namespace(source).is_some() {
            return Err(ScrollError::CommandNotSupportedOnView(format!(
                "cannot rename view: {source}"
            )));
        }
        return Err(ScrollError::NamespaceNotFound(
            "source namespace does not exist".into(),
        ));
    };

    if !opctx
        .fail_points()
        .should_fail(RENAME_PATH_THROUGH_CONFIG_SERVER)
        && opctx.sharding().is_collection_sharded(source)
    {
        return Err(ScrollError::IllegalOperation(
            "source namespace cannot be sharded".into(),
        ));
    }

    if is_replicated_changed(opctx, source, target) {
        return Err(ScrollError::IllegalOperation(
            "cannot rename collections between a replicated and an unreplicated database".into(),
        ));
    }

    opctx.background().assert_no_bg_op_in_prog_for_ns(source);
    opctx
        .index_builds()
        .assert_no_index_build_in_prog_for_collection(source_coll.uuid());

    let target_db = catalog.database(target.db());
    let target_coll = if target_db.is_some() {
        catalog.lookup_collection_by_namespace(target)
    } else {
        None
    };
    if let Some(tc) = &target_coll {
        if source_coll.uuid() == tc.uuid() {
            // Re-applying a rename that already completed.
            assert_eq!(source, target, "one UUID bound under two namespaces");
            return Ok(());
        }
        if opctx.sharding().is_collection_sharded(target) {
            return Err(ScrollError::IllegalOperation(
                "cannot rename to a sharded collection".into(),
            ));
        }
        if !options.drop_target {
            return Err(ScrollError::NamespaceExists("target namespace exists".into()));
        }
    } else if target_db.is_some() && catalog.lookup_view_by_namespace(target).is_some() {
        return Err(ScrollError::NamespaceExists(format!(
            "a view already exists with that name: {target}"
        )));
    }

    let target_db = match target_db {
        Some(db) => db,
        None => catalog.open_database(target.db()),
    };

    // The generated name is only guaranteed unused while the database stays
    // exclusively locked.
    assert!(
        opctx.is_db_locked_for_mode(target.db(), LockMode::Exclusive),
        "staging creation requires an exclusive target-database lock"
    );
    let tmp_name = target_db.make_unique_collection_namespace(opctx, "tmp%%%%%.renameCollection")?;

    tracing::info!(
        tmp = %tmp_name,
        source = %source,
        "attempting to create temporary collection with the contents of the source"
    );

    // Staging takes the source's durable options verbatim, except identity.
    let mut staging_options = source_coll.options();
    staging_options.uuid = Some(Uuid::new_v4());

    let tmp_coll = write_conflict_retry(opctx, "renameCollection", &tmp_name.ns(), || {
        let wunit = WriteUnitOfWork::new(opctx);
        let coll = target_db.create_collection(opctx, &tmp_name, staging_options.clone())?;
        wunit.commit();
        Ok(coll)
    })?;

    // Dismissed on success. Failures while dropping are logged and swallowed;
    // the rename already has a primary failure to report.
    let tmp_dropper = scopeguard::guard((), |_| {
        if let Err(err) =
            drop_collection_for_apply_ops(opctx, &tmp_name, OpTime::NULL, SystemCollectionMode::Allow)
        {
            tracing::warn!(
                tmp = %tmp_name,
                source = %source,
                target = %target,
                error = %err,
                "unable to drop temporary collection while renaming"
            );
        }
    });

    let indexes_to_copy: Vec<Document> = source_coll
        .ready_index_specs()
        .into_iter()
        .filter(|spec| !is_id_index(spec))
        .collect();

    // Indexes go onto the still-empty staging collection first, each entry
    // transcribed ahead of the index, so every replicated index creation
    // carries a distinct position preceding the inserts.
    if !indexes_to_copy.is_empty() {
        write_conflict_retry(opctx, "renameCollection", &tmp_name.ns(), || {
            let wunit = WriteUnitOfWork::new(opctx);
            opctx
                .index_builds()
                .create_indexes_on_empty_collection(opctx, &tmp_coll, &indexes_to_copy)?;
            wunit.commit();
            Ok(())
        })?;
    }

    let tmp_uuid = tmp_coll.uuid();
    drop(tmp_coll);
    {
        // Copy phase: trade the exclusive target-database lock for intent
        // locks on the staging collection so the rest of the target database
        // stays usable during a long copy.
        drop(target_db_lock.take());
        let _tmp_db_lock = DatabaseLock::new(opctx, target.db(), LockMode::IntentExclusive)?;
        let removed = || {
            ScrollError::NamespaceNotFound(format!(
                "temporary collection '{tmp_name}' was removed while renaming collection \
                 across databases"
            ))
        };
        let tmp_ns = opctx
            .catalog()
            .lookup_namespace_by_uuid(tmp_uuid)
            .ok_or_else(removed)?;
        let _tmp_coll_lock = CollectionLock::new(opctx, &tmp_ns, LockMode::IntentExclusive)?;
        let tmp_coll = opctx
            .catalog()
            .lookup_collection_by_uuid(tmp_uuid)
            .ok_or_else(removed)?;

        let batch_size = opctx.config().insert_batch_size.max(1);
        let mut cursor = source_coll.cursor();
        let mut record = cursor.next();
        while record.is_some() {
            opctx.check_for_interrupt()?;
            let begin_batch_id = record.as_ref().expect("loop guard").id;
            write_conflict_retry(opctx, "renameCollection", &tmp_name.ns(), || {
                let wunit = WriteUnitOfWork::new(opctx);
                // A conflict rolled the previous attempt back and left the
                // cursor past the batch; re-address the batch start. Record
                // ids stay addressable across the rollback.
                if record.as_ref().map(|r| r.id) != Some(begin_batch_id) {
                    record = cursor.seek_exact(begin_batch_id);
                }
                let batch_result = (|| {
                    let mut inserted = 0usize;
                    while let Some(current) = record.take() {
                        let document = current.to_document()?;
                        tmp_coll.insert_document(opctx, &document)?;
                        inserted += 1;
                        record = cursor.next();
                        if inserted >= batch_size {
                            break;
                        }
                    }
                    // Yield point: detach before the batch commits.
                    cursor.save();
                    if opctx.fail_points().should_fail(WRITE_CONFLICT_IN_RENAME_COPY) {
                        return Err(ScrollError::WriteConflict);
                    }
                    Ok(())
                })();
                // On every exit, conflict included, the cursor must come
                // back before the next attempt; the restore itself tolerates
                // retry.
                write_conflict_retry(opctx, "retryRestoreCursor", &tmp_name.ns(), || {
                    cursor.restore()
                })?;
                batch_result?;
                wunit.commit();
                Ok(())
            })?;
        }
    }
    drop(source_coll_lock.take());
    drop(source_db_lock.take());

    // The copy is complete; the user-visible rename is the in-place promote.
    assert_eq!(tmp_name.db(), target.db());
    rename_collection_within_db(opctx, &tmp_name, target, options)?;

    ScopeGuard::into_inner(tmp_dropper);
    drop_collection_for_apply_ops(opctx, source, OpTime::NULL, SystemCollectionMode::Allow)
}

/// User-facing rename.
pub fn rename_collection(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    options: RenameOptions,
) -> Result<(), ScrollError> {
    if source.is_drop_pending() {
        return Err(ScrollError::NamespaceNotFound(format!(
            "renameCollection cannot accept a source collection that is in a drop-pending \
             state: {source}"
        )));
    }

    if source.is_system_views() || target.is_system_views() {
        return Err(ScrollError::IllegalOperation(
            "renaming the views collection or renaming to the views collection is not allowed"
                .into(),
        ));
    }

    tracing::info!(
        %source,
        %target,
        drop_target = options.drop_target,
        "renameCollection"
    );

    if source.db() == target.db() {
        rename_collection_within_db(opctx, source, target, options)
    } else {
        rename_between_dbs(opctx, source, target, options)
    }
}

/// Command-surface entry point: full namespace and permission validation in
/// front of [`rename_collection`].
pub fn validate_and_run_rename_collection(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    drop_target: bool,
    stay_temp: bool,
) -> Result<(), ScrollError> {
    if !source.is_valid() {
        return Err(ScrollError::InvalidNamespace(format!(
            "invalid source namespace: {}",
            source.ns()
        )));
    }
    if !target.is_valid() {
        return Err(ScrollError::InvalidNamespace(format!(
            "invalid target namespace: {}",
            target.ns()
        )));
    }

    if opctx.repl().replication_mode() != ReplicationMode::None {
        if source.is_oplog() {
            return Err(ScrollError::IllegalOperation(
                "can't rename live oplog while replicating".into(),
            ));
        }
        if target.is_oplog() {
            return Err(ScrollError::IllegalOperation(
                "can't rename to live oplog while replicating".into(),
            ));
        }
    }

    if source.is_oplog() != target.is_oplog() {
        return Err(ScrollError::IllegalOperation(
            "if either the source or target of a rename is an oplog name, both must be".into(),
        ));
    }

    if !source.is_user_writable() {
        return Err(ScrollError::IllegalOperation(format!(
            "error with source namespace: {source} is not writable"
        )));
    }
    if !target.is_user_writable() {
        return Err(ScrollError::IllegalOperation(format!(
            "error with target namespace: {target} is not writable"
        )));
    }

    if source.is_server_configuration() {
        return Err(ScrollError::IllegalOperation(
            "renaming the server configuration collection is not allowed".into(),
        ));
    }

    rename_collection(
        opctx,
        source,
        target,
        RenameOptions {
            drop_target,
            stay_temp,
        },
    )
}

fn bson_true_value(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null | Bson::Undefined) => false,
        Some(Bson::Boolean(b)) => *b,
        Some(Bson::Int32(n)) => *n != 0,
        Some(Bson::Int64(n)) => *n != 0,
        Some(Bson::Double(n)) => *n != 0.0,
        Some(_) => true,
    }
}

fn bson_uuid(value: &Bson) -> Option<Result<Uuid, ScrollError>> {
    match value {
        Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => Some(
            Uuid::from_slice(&binary.bytes)
                .map_err(|err| ScrollError::BadValue(format!("invalid victim UUID: {err}"))),
        ),
        _ => None,
    }
}

/// Replay-side entry point. `cmd` is the logged command document: the first
/// element names the source, `to` the target, `dropTarget` is a boolean or
/// the victim's UUID, `stayTemp` a boolean. A pre-assigned log position is
/// only legal when writes are not being replicated here.
pub fn rename_collection_for_apply_ops(
    opctx: &OperationContext,
    db_name: &str,
    uuid_to_rename: Option<Uuid>,
    cmd: &Document,
    rename_op_time: OpTime,
) -> Result<(), ScrollError> {
    if !rename_op_time.is_null() && opctx.writes_are_replicated() {
        return Err(ScrollError::BadValue(
            "renameCollection cannot accept a rename position when writes are replicated".into(),
        ));
    }

    let (first_key, first_value) = cmd
        .iter()
        .next()
        .ok_or_else(|| ScrollError::TypeMismatch("empty rename command document".into()))?;
    let source_str = first_value.as_str().ok_or_else(|| {
        ScrollError::TypeMismatch(format!("'{first_key}' must be of type string"))
    })?;
    let target_str = cmd
        .get_str("to")
        .map_err(|_| ScrollError::TypeMismatch("'to' must be of type string".into()))?;

    let mut source = Namespace::parse(source_str)?;
    let target = Namespace::parse(target_str)?;

    // The source may itself have been renamed earlier in the log; its UUID
    // is authoritative over the logged name.
    if let Some(uuid) = uuid_to_rename
        && let Some(ns) = opctx.catalog().lookup_namespace_by_uuid(uuid)
    {
        source = ns;
    }

    let options = RenameOptions {
        drop_target: bson_true_value(cmd.get("dropTarget")),
        stay_temp: bson_true_value(cmd.get("stayTemp")),
    };
    let uuid_to_drop = match cmd.get("dropTarget").and_then(bson_uuid) {
        Some(parsed) => Some(parsed?),
        None => None,
    };

    if !target.is_user_writable() {
        return Err(ScrollError::IllegalOperation(format!(
            "error with target namespace: {target} is not writable"
        )));
    }

    if opctx.repl().replication_mode() == ReplicationMode::None && target.is_oplog() {
        return Err(ScrollError::IllegalOperation(
            "cannot rename collection to the oplog".into(),
        ));
    }

    let source_exists = opctx
        .catalog()
        .lookup_collection_by_namespace(&source)
        .is_some();
    if source.is_drop_pending() || !source_exists {
        // The source is already gone: degrade the rename into a bare drop of
        // whichever victim still applies.
        let mut drop_target_ns = None;
        if options.drop_target {
            drop_target_ns = Some(target.clone());
        }
        if let Some(uuid) = uuid_to_drop {
            drop_target_ns = opctx.catalog().lookup_namespace_by_uuid(uuid);
        }
        if let Some(ns) = drop_target_ns {
            return drop_collection_for_apply_ops(
                opctx,
                &ns,
                rename_op_time,
                SystemCollectionMode::Allow,
            );
        }
        return Err(ScrollError::NamespaceNotFound(format!(
            "renameCollection cannot accept a source collection that does not exist or is in \
             a drop-pending state: {source}"
        )));
    }

    tracing::info!(
        db = db_name,
        source = %source,
        source_uuid = ?uuid_to_rename,
        target = %target,
        victim_uuid = ?uuid_to_drop,
        "applying renameCollection"
    );

    if source.db() == target.db() {
        rename_collection_within_db_for_apply_ops(
            opctx,
            &source,
            &target,
            uuid_to_drop,
            rename_op_time,
            options,
        )
    } else {
        rename_between_dbs(opctx, &source, &target, options)
    }
}

/// Rollback-side entry point: rebinds whatever namespace currently holds
/// `uuid` back to `target`. Only same-database rollbacks exist; anything
/// else is a programming error.
pub fn rename_collection_for_rollback(
    opctx: &OperationContext,
    target: &Namespace,
    uuid: Uuid,
) -> Result<(), ScrollError> {
    let source = opctx
        .catalog()
        .lookup_namespace_by_uuid(uuid)
        .expect("rollback rename of a UUID with no live collection");
    assert_eq!(
        source.db(),
        target.db(),
        "rollback rename source and target must share a database; \
         source: {source}, target: {target}"
    );

    tracing::info!(%source, %uuid, %target, "renameCollectionForRollback");

    rename_collection_within_db(opctx, &source, target, RenameOptions::default())
}

/// Compare-then-rename: fails `CommandFailed` unless the target's durable
/// options (UUID aside) and index descriptors still match the captured
/// originals, then runs the validating entry point. The exclusive
/// target-database lock pins the comparison and the rename together.
pub fn rename_collection_if_unchanged(
    opctx: &OperationContext,
    source: &Namespace,
    target: &Namespace,
    drop_target: bool,
    stay_temp: bool,
    original_indexes: &[Document],
    original_options: &Document,
) -> Result<(), ScrollError> {
    let _db_lock = DatabaseLock::new(opctx, target.db(), LockMode::Exclusive)?;

    let collection = if opctx.catalog().database(target.db()).is_some() {
        opctx.catalog().lookup_collection_by_namespace(target)
    } else {
        None
    };
    // The target may have been dropped and recreated in the meantime; that
    // is fine as long as options and indexes came back identical, so UUIDs
    // are left out of the comparison.
    let current_options = match &collection {
        Some(coll) => coll.options().to_document_without_uuid()?,
        None => Document::new(),
    };
    let mut expected_options = original_options.clone();
    expected_options.remove("uuid");
    if current_options != expected_options {
        return Err(ScrollError::CommandFailed(format!(
            "collection options of target collection {target} changed during processing. \
             original options: {expected_options}, new options: {current_options}"
        )));
    }

    let current_indexes = opctx.catalog().list_index_specs_empty_if_missing(target);
    if original_indexes.len() != current_indexes.len()
        || original_indexes
            .iter()
            .zip(current_indexes.iter())
            .any(|(original, current)| original != current)
    {
        return Err(ScrollError::CommandFailed(format!(
            "indexes of target collection {target} changed during processing"
        )));
    }

    validate_and_run_rename_collection(opctx, source, target, drop_target, stay_temp)
}

#[cfg(test)]
mod tests {
    use super::bson_true_value;
    use bson::{Bson, doc};

    #[test]
    fn true_value_follows_element_semantics() {
        let cmd = doc! {
            "a": true,
            "b": false,
            "c": 0i32,
            "d": 2i64,
            "e": Bson::Null,
            "f": "anything",
        };
        assert!(bson_true_value(cmd.get("a")));
        assert!(!bson_true_value(cmd.get("b")));
        assert!(!bson_true_value(cmd.get("c")));
        assert!(bson_true_value(cmd.get("d")));
        assert!(!bson_true_value(cmd.get("e")));
        // Non-numeric, non-boolean values count as set.
        assert!(bson_true_value(cmd.get("f")));
        assert!(!bson_true_value(cmd.get("missing")));
    }
}
