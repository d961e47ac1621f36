mod common;

use bson::doc;
use common::*;
use scrolldb::catalog::rename::{
    RenameOptions, rename_collection, rename_collection_for_rollback,
    rename_collection_if_unchanged, validate_and_run_rename_collection,
};
use scrolldb::catalog::{CollectionOptions, ViewDefinition};
use scrolldb::error::ScrollError;
use scrolldb::failpoint::RENAME_PATH_THROUGH_CONFIG_SERVER;

#[test]
fn rename_without_collision_keeps_uuid_and_unbinds_source() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    let uuid = create_collection(&opctx, &source);
    insert_docs(&opctx, &source, &[doc! { "n": 1 }, doc! { "n": 2 }]);

    rename_collection(&opctx, &source, &target, RenameOptions::default()).expect("rename");

    assert_eq!(uuid_of(&opctx, &target), Some(uuid));
    assert_eq!(uuid_of(&opctx, &source), None);
    assert_eq!(
        documents(&opctx, &target),
        vec![doc! { "n": 1 }, doc! { "n": 2 }]
    );
}

#[test]
fn collision_without_drop_target_changes_nothing() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    let source_uuid = create_collection(&opctx, &source);
    let target_uuid = create_collection(&opctx, &target);

    let err = rename_collection(&opctx, &source, &target, RenameOptions::default())
        .expect_err("collision");
    assert!(matches!(err, ScrollError::NamespaceExists(_)), "{err}");

    assert_eq!(uuid_of(&opctx, &source), Some(source_uuid));
    assert_eq!(uuid_of(&opctx, &target), Some(target_uuid));
}

#[test]
fn collision_with_drop_target_replaces_target() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    let source_uuid = create_collection(&opctx, &source);
    let target_uuid = create_collection(&opctx, &target);
    insert_docs(&opctx, &source, &[doc! { "from": "x" }]);

    rename_collection(
        &opctx,
        &source,
        &target,
        RenameOptions {
            drop_target: true,
            stay_temp: false,
        },
    )
    .expect("rename with dropTarget");

    assert_eq!(uuid_of(&opctx, &target), Some(source_uuid));
    assert_eq!(uuid_of(&opctx, &source), None);
    // Standalone drops are physical; the victim's UUID resolves nowhere.
    assert_eq!(opctx.catalog().lookup_namespace_by_uuid(target_uuid), None);
    assert_eq!(documents(&opctx, &target), vec![doc! { "from": "x" }]);
}

#[test]
fn round_trip_restores_original_uuid() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let a = ns("db1.a");
    let b = ns("db1.b");
    let uuid = create_collection(&opctx, &a);

    rename_collection(&opctx, &a, &b, RenameOptions::default()).expect("a to b");
    rename_collection(&opctx, &b, &a, RenameOptions::default()).expect("b to a");

    assert_eq!(uuid_of(&opctx, &a), Some(uuid));
    assert_eq!(uuid_of(&opctx, &b), None);
}

#[test]
fn stay_temp_controls_the_temporary_marker() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.tmp_src");
    create_collection_with_options(
        &opctx,
        &source,
        CollectionOptions {
            temp: true,
            ..CollectionOptions::default()
        },
    );

    let kept = ns("db1.kept");
    rename_collection(
        &opctx,
        &source,
        &kept,
        RenameOptions {
            drop_target: false,
            stay_temp: true,
        },
    )
    .expect("rename keeping temp");
    let coll = opctx
        .catalog()
        .lookup_collection_by_namespace(&kept)
        .expect("collection");
    assert!(coll.is_temp());

    let cleared = ns("db1.cleared");
    rename_collection(&opctx, &kept, &cleared, RenameOptions::default())
        .expect("rename clearing temp");
    let coll = opctx
        .catalog()
        .lookup_collection_by_namespace(&cleared)
        .expect("collection");
    assert!(!coll.is_temp());
}

#[test]
fn direct_rename_emits_exactly_one_observer_event() {
    let (svc, events) = recording_service(scrolldb::repl::ReplSettings::replica_set_primary());
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    create_collection(&opctx, &source);

    rename_collection(&opctx, &source, &target, RenameOptions::default()).expect("rename");

    assert_eq!(rename_event_count(&events), 1);
    let rename_entries = svc
        .oplog()
        .entries()
        .iter()
        .filter(|entry| entry.op.contains_key("renameCollection"))
        .count();
    assert_eq!(rename_entries, 1);
}

#[test]
fn swap_drop_emits_one_pre_post_pair_and_parks_the_victim() {
    let (svc, events) = recording_service(scrolldb::repl::ReplSettings::replica_set_primary());
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    let source_uuid = create_collection(&opctx, &source);
    let target_uuid = create_collection(&opctx, &target);

    rename_collection(
        &opctx,
        &source,
        &target,
        RenameOptions {
            drop_target: true,
            stay_temp: false,
        },
    )
    .expect("rename with dropTarget");

    assert_eq!(rename_event_count(&events), 1);
    assert!(!events.lock().contains(&"rename"));

    assert_eq!(uuid_of(&opctx, &target), Some(source_uuid));
    // Replicated drops are two-phase: the victim stays resolvable by UUID
    // under a drop-pending namespace.
    let parked = opctx
        .catalog()
        .lookup_namespace_by_uuid(target_uuid)
        .expect("victim still resolvable");
    assert!(parked.is_drop_pending());
}

#[test]
fn secondary_rejects_rename() {
    let svc = replica_set_secondary();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    create_collection(&opctx, &source);

    let err = rename_collection(&opctx, &source, &ns("db1.y"), RenameOptions::default())
        .expect_err("not primary");
    assert!(matches!(err, ScrollError::NotPrimary(_)), "{err}");
}

#[test]
fn sharded_source_is_rejected_unless_bypassed() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    create_collection(&opctx, &source);
    svc.sharding().shard_collection(&source);

    let err = rename_collection(&opctx, &source, &target, RenameOptions::default())
        .expect_err("sharded source");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");

    svc.fail_points().enable(RENAME_PATH_THROUGH_CONFIG_SERVER);
    rename_collection(&opctx, &source, &target, RenameOptions::default())
        .expect("bypassed routing check");
}

#[test]
fn sharded_target_is_rejected() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let target = ns("db1.y");
    create_collection(&opctx, &source);
    create_collection(&opctx, &target);
    svc.sharding().shard_collection(&target);

    let err = rename_collection(
        &opctx,
        &source,
        &target,
        RenameOptions {
            drop_target: true,
            stay_temp: false,
        },
    )
    .expect_err("sharded target");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");
}

#[test]
fn views_collide_with_renames() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let catalog = opctx.catalog();

    catalog
        .define_view(ViewDefinition {
            ns: ns("db1.v"),
            view_on: "x".into(),
            pipeline: Vec::new(),
        })
        .expect("define view");

    let err = rename_collection(&opctx, &ns("db1.v"), &ns("db1.y"), RenameOptions::default())
        .expect_err("view source");
    assert!(matches!(err, ScrollError::CommandNotSupportedOnView(_)), "{err}");

    create_collection(&opctx, &ns("db1.x"));
    let err = rename_collection(&opctx, &ns("db1.x"), &ns("db1.v"), RenameOptions::default())
        .expect_err("view target");
    assert!(matches!(err, ScrollError::NamespaceExists(_)), "{err}");
}

#[test]
fn drop_pending_source_is_gone_for_rename() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.system.drop.7.x");
    let err = rename_collection(&opctx, &source, &ns("db1.y"), RenameOptions::default())
        .expect_err("drop-pending source");
    assert!(matches!(err, ScrollError::NamespaceNotFound(_)), "{err}");
}

#[test]
fn views_catalog_is_not_a_rename_participant() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let err = rename_collection(
        &opctx,
        &ns("db1.system.views"),
        &ns("db1.y"),
        RenameOptions::default(),
    )
    .expect_err("views namespace");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");
}

#[test]
#[should_panic(expected = "background operation in progress")]
fn unquiesced_background_op_is_fatal() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    create_collection(&opctx, &source);
    svc.background().begin_op(&source);
    let _ = rename_collection(&opctx, &source, &ns("db1.y"), RenameOptions::default());
}

#[test]
fn validating_entry_point_enforces_namespace_rules() {
    let svc = replica_set_primary();
    let opctx = svc.new_operation();

    let err = validate_and_run_rename_collection(
        &opctx,
        &ns("db 1.x"),
        &ns("db1.y"),
        false,
        false,
    )
    .expect_err("invalid source");
    assert!(matches!(err, ScrollError::InvalidNamespace(_)), "{err}");

    let err = validate_and_run_rename_collection(
        &opctx,
        &ns("local.oplog.rs"),
        &ns("local.oplog.other"),
        false,
        false,
    )
    .expect_err("live oplog");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");

    let err = validate_and_run_rename_collection(
        &opctx,
        &ns("db1.x"),
        &ns("local.oplog.rs"),
        false,
        false,
    )
    .expect_err("oplog asymmetry");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");

    let err = validate_and_run_rename_collection(
        &opctx,
        &ns("db1.system.indexes"),
        &ns("db1.y"),
        false,
        false,
    )
    .expect_err("reserved source");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");

    let err = validate_and_run_rename_collection(
        &opctx,
        &ns("admin.system.version"),
        &ns("admin.other"),
        false,
        false,
    )
    .expect_err("server configuration source");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");
}

#[test]
fn oplog_rename_is_allowed_without_replication() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("local.oplog.rs");
    create_collection(&opctx, &source);
    validate_and_run_rename_collection(&opctx, &source, &ns("local.oplog.old"), false, false)
        .expect("standalone oplog rename");
}

#[test]
fn rollback_rebinds_by_uuid() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let original = ns("db1.x");
    let renamed = ns("db1.renamed");
    let uuid = create_collection(&opctx, &original);
    rename_collection(&opctx, &original, &renamed, RenameOptions::default()).expect("rename");

    rename_collection_for_rollback(&opctx, &original, uuid).expect("rollback");
    assert_eq!(uuid_of(&opctx, &original), Some(uuid));
    assert_eq!(uuid_of(&opctx, &renamed), None);
}

#[test]
#[should_panic(expected = "must share a database")]
fn cross_database_rollback_is_fatal() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    let uuid = create_collection(&opctx, &source);
    let _ = rename_collection_for_rollback(&opctx, &ns("db2.x"), uuid);
}

#[test]
fn rename_if_unchanged_succeeds_when_target_matches_capture() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.src");
    let target = ns("db1.out");
    create_collection(&opctx, &source);
    create_collection(&opctx, &target);

    let target_coll = opctx
        .catalog()
        .lookup_collection_by_namespace(&target)
        .expect("target");
    let original_options = target_coll.options().to_document().expect("options");
    let original_indexes = target_coll.ready_index_specs();

    rename_collection_if_unchanged(
        &opctx,
        &source,
        &target,
        true,
        false,
        &original_indexes,
        &original_options,
    )
    .expect("unchanged rename");
    assert!(uuid_of(&opctx, &target).is_some());
    assert_eq!(uuid_of(&opctx, &source), None);
}

#[test]
fn rename_if_unchanged_fails_when_options_drift() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.src");
    let target = ns("db1.out");
    create_collection(&opctx, &source);
    create_collection_with_options(
        &opctx,
        &target,
        CollectionOptions {
            temp: true,
            ..CollectionOptions::default()
        },
    );

    // Captured before the target's options changed underneath us.
    let stale_options = CollectionOptions::default().to_document().expect("options");
    let indexes = opctx.catalog().list_index_specs_empty_if_missing(&target);

    let err = rename_collection_if_unchanged(
        &opctx,
        &source,
        &target,
        true,
        false,
        &indexes,
        &stale_options,
    )
    .expect_err("options drift");
    assert!(matches!(err, ScrollError::CommandFailed(_)), "{err}");
}

#[test]
fn rename_if_unchanged_fails_when_indexes_drift() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.src");
    let target = ns("db1.out");
    create_collection(&opctx, &source);
    create_collection(&opctx, &target);

    let original_options = CollectionOptions::default().to_document().expect("options");
    let original_indexes = opctx.catalog().list_index_specs_empty_if_missing(&target);

    create_index(
        &opctx,
        &target,
        doc! { "v": 2i32, "key": { "n": 1i32 }, "name": "n_1" },
    );

    let err = rename_collection_if_unchanged(
        &opctx,
        &source,
        &target,
        true,
        false,
        &original_indexes,
        &original_options,
    )
    .expect_err("index drift");
    assert!(matches!(err, ScrollError::CommandFailed(_)), "{err}");
}

#[test]
fn stale_database_routing_version_is_rejected() {
    let svc = standalone();
    let opctx = svc.new_operation();
    let source = ns("db1.x");
    create_collection(&opctx, &source);
    svc.sharding().mark_db_version_stale("db1");

    let err = rename_collection(&opctx, &source, &ns("db1.y"), RenameOptions::default())
        .expect_err("stale routing");
    assert!(matches!(err, ScrollError::IllegalOperation(_)), "{err}");
}
