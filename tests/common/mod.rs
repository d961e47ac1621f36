#![allow(dead_code)]

use bson::Document;
use parking_lot::Mutex;
use scrolldb::catalog::CollectionOptions;
use scrolldb::config::ScrollConfig;
use scrolldb::context::{OperationContext, ServiceContext};
use scrolldb::error::ScrollError;
use scrolldb::lock::{CollectionLock, DatabaseLock, LockMode};
use scrolldb::namespace::Namespace;
use scrolldb::repl::observer::{OpObserver, OplogObserver};
use scrolldb::repl::{OpTime, ReplSettings};
use scrolldb::storage::write_unit::WriteUnitOfWork;
use std::sync::Arc;
use uuid::Uuid;

pub fn standalone() -> Arc<ServiceContext> {
    ServiceContext::new(ScrollConfig::test(), ReplSettings::standalone())
}

pub fn replica_set_primary() -> Arc<ServiceContext> {
    ServiceContext::new(ScrollConfig::test(), ReplSettings::replica_set_primary())
}

pub fn replica_set_secondary() -> Arc<ServiceContext> {
    ServiceContext::new(ScrollConfig::test(), ReplSettings::replica_set_secondary())
}

pub fn ns(full: &str) -> Namespace {
    Namespace::parse(full).expect("namespace")
}

pub fn create_collection(opctx: &OperationContext, ns: &Namespace) -> Uuid {
    create_collection_with_options(opctx, ns, CollectionOptions::default())
}

pub fn create_collection_with_options(
    opctx: &OperationContext,
    ns: &Namespace,
    options: CollectionOptions,
) -> Uuid {
    let db = opctx.catalog().open_database(ns.db());
    let _db_lock = DatabaseLock::new(opctx, ns.db(), LockMode::Exclusive).expect("db lock");
    let wunit = WriteUnitOfWork::new(opctx);
    let coll = db
        .create_collection(opctx, ns, options)
        .expect("create collection");
    wunit.commit();
    coll.uuid()
}

pub fn create_index(opctx: &OperationContext, ns: &Namespace, spec: Document) {
    let _db_lock = DatabaseLock::new(opctx, ns.db(), LockMode::IntentExclusive).expect("db lock");
    let _coll_lock = CollectionLock::new(opctx, ns, LockMode::Exclusive).expect("coll lock");
    let coll = opctx
        .catalog()
        .lookup_collection_by_namespace(ns)
        .expect("collection");
    let wunit = WriteUnitOfWork::new(opctx);
    opctx
        .index_builds()
        .create_indexes_on_empty_collection(opctx, &coll, &[spec])
        .expect("create index");
    wunit.commit();
}

pub fn insert_docs(opctx: &OperationContext, ns: &Namespace, docs: &[Document]) {
    let _db_lock = DatabaseLock::new(opctx, ns.db(), LockMode::IntentExclusive).expect("db lock");
    let _coll_lock =
        CollectionLock::new(opctx, ns, LockMode::IntentExclusive).expect("coll lock");
    let coll = opctx
        .catalog()
        .lookup_collection_by_namespace(ns)
        .expect("collection");
    let wunit = WriteUnitOfWork::new(opctx);
    for doc in docs {
        coll.insert_document(opctx, doc).expect("insert");
    }
    wunit.commit();
}

pub fn documents(opctx: &OperationContext, ns: &Namespace) -> Vec<Document> {
    opctx
        .catalog()
        .lookup_collection_by_namespace(ns)
        .expect("collection")
        .record_store()
        .scan()
        .iter()
        .map(|record| record.to_document().expect("decode"))
        .collect()
}

pub fn uuid_of(opctx: &OperationContext, ns: &Namespace) -> Option<Uuid> {
    opctx
        .catalog()
        .lookup_collection_by_namespace(ns)
        .map(|coll| coll.uuid())
}

/// Observer wrapper that records which hooks fired, then delegates to the
/// real oplog transcription.
pub struct RecordingObserver {
    inner: OplogObserver,
    events: Arc<Mutex<Vec<&'static str>>>,
}

pub fn recording_service(repl: ReplSettings) -> (Arc<ServiceContext>, Arc<Mutex<Vec<&'static str>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let svc = ServiceContext::with_observer(ScrollConfig::test(), repl, move |oplog, repl| {
        Box::new(RecordingObserver {
            inner: OplogObserver::new(Arc::clone(oplog), Arc::clone(repl)),
            events: recorded,
        })
    });
    (svc, events)
}

impl OpObserver for RecordingObserver {
    fn on_create_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        options: &CollectionOptions,
    ) -> Result<(), ScrollError> {
        self.events.lock().push("create");
        self.inner.on_create_collection(opctx, ns, uuid, options)
    }

    fn on_create_indexes(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        spec: &Document,
    ) -> Result<(), ScrollError> {
        self.events.lock().push("createIndexes");
        self.inner.on_create_indexes(opctx, ns, uuid, spec)
    }

    fn on_inserts(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        count: usize,
    ) -> Result<(), ScrollError> {
        self.events.lock().push("inserts");
        self.inner.on_inserts(opctx, ns, uuid, count)
    }

    fn on_drop_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
    ) -> Result<OpTime, ScrollError> {
        self.events.lock().push("drop");
        self.inner.on_drop_collection(opctx, ns, uuid)
    }

    fn on_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        dropped_records: u64,
        stay_temp: bool,
    ) -> Result<(), ScrollError> {
        self.events.lock().push("rename");
        self.inner.on_rename_collection(
            opctx,
            source,
            target,
            source_uuid,
            dropped_target_uuid,
            dropped_records,
            stay_temp,
        )
    }

    fn pre_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        dropped_records: u64,
        stay_temp: bool,
    ) -> Result<OpTime, ScrollError> {
        self.events.lock().push("preRename");
        self.inner.pre_rename_collection(
            opctx,
            source,
            target,
            source_uuid,
            dropped_target_uuid,
            dropped_records,
            stay_temp,
        )
    }

    fn post_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        stay_temp: bool,
    ) -> Result<(), ScrollError> {
        self.events.lock().push("postRename");
        self.inner.post_rename_collection(
            opctx,
            source,
            target,
            source_uuid,
            dropped_target_uuid,
            stay_temp,
        )
    }
}

/// Count of observer-visible rename emissions: direct renames count one,
/// pre/post pairs count one.
pub fn rename_event_count(events: &Mutex<Vec<&'static str>>) -> usize {
    let events = events.lock();
    let direct = events.iter().filter(|e| **e == "rename").count();
    let pre = events.iter().filter(|e| **e == "preRename").count();
    let post = events.iter().filter(|e| **e == "postRename").count();
    assert_eq!(pre, post, "unbalanced pre/post rename events");
    direct + pre
}
