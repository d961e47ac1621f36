use crate::catalog::CollectionOptions;
use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::lock::{CollectionLock, LockMode};
use crate::namespace::Namespace;
use crate::repl::{OpTime, ReplSettings};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document, doc};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// One replicated catalog operation.
#[derive(Debug, Clone)]
pub struct OplogEntry {
    pub op_time: OpTime,
    pub ns: Namespace,
    pub op: Document,
}

#[derive(Default)]
struct OplogState {
    entries: Vec<OplogEntry>,
    next_ts: u64,
}

/// In-memory replicated operation log. Appends participate in the enclosing
/// write unit: an aborted unit takes its entries back out.
#[derive(Default)]
pub struct Oplog {
    state: Arc<Mutex<OplogState>>,
}

impl Oplog {
    pub(crate) fn append(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        op: Document,
    ) -> OpTime {
        let op_time = {
            let mut state = self.state.lock();
            state.next_ts += 1;
            let op_time = OpTime::new(state.next_ts);
            state.entries.push(OplogEntry {
                op_time,
                ns: ns.clone(),
                op,
            });
            op_time
        };
        let state = Arc::clone(&self.state);
        opctx.register_rollback(move || {
            state
                .lock()
                .entries
                .retain(|entry| entry.op_time != op_time);
        });
        op_time
    }

    pub fn entries(&self) -> Vec<OplogEntry> {
        self.state.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn uuid_to_bson(uuid: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: uuid.as_bytes().to_vec(),
    })
}

/// The component that transcribes catalog-mutating operations into
/// replicated log entries. Injected into the service context so replication
/// can be observed, wrapped, or stubbed out.
pub trait OpObserver: Send + Sync {
    fn on_create_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        options: &CollectionOptions,
    ) -> Result<(), ScrollError>;

    fn on_create_indexes(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        spec: &Document,
    ) -> Result<(), ScrollError>;

    fn on_inserts(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        count: usize,
    ) -> Result<(), ScrollError>;

    fn on_drop_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
    ) -> Result<OpTime, ScrollError>;

    /// Single-entry form used when no target collection is dropped.
    #[allow(clippy::too_many_arguments)]
    fn on_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        dropped_records: u64,
        stay_temp: bool,
    ) -> Result<(), ScrollError>;

    /// Writes the rename entry ahead of the target drop and returns its log
    /// position, which the drop is then stamped with.
    #[allow(clippy::too_many_arguments)]
    fn pre_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        dropped_records: u64,
        stay_temp: bool,
    ) -> Result<OpTime, ScrollError>;

    /// Catalog-side completion hook for the pre/post pair; writes nothing.
    fn post_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        stay_temp: bool,
    ) -> Result<(), ScrollError>;
}

/// Default observer: transcribes to the in-memory oplog under the oplog
/// collection lock.
pub struct OplogObserver {
    oplog: Arc<Oplog>,
    repl: Arc<ReplSettings>,
}

impl OplogObserver {
    pub fn new(oplog: Arc<Oplog>, repl: Arc<ReplSettings>) -> Self {
        Self { oplog, repl }
    }

    fn oplog_ns() -> Namespace {
        Namespace::new("local", "oplog.rs")
    }

    fn should_log(&self, opctx: &OperationContext, ns: &Namespace) -> bool {
        opctx.writes_are_replicated()
            && !ns.is_drop_pending()
            && !self.repl.is_oplog_disabled_for(ns)
    }

    fn append(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        op: Document,
    ) -> Result<OpTime, ScrollError> {
        let _oplog_lock = CollectionLock::new(opctx, &Self::oplog_ns(), LockMode::IntentExclusive)?;
        Ok(self.oplog.append(opctx, ns, op))
    }

    fn rename_entry(
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        stay_temp: bool,
    ) -> Document {
        let drop_target = match dropped_target_uuid {
            Some(uuid) => uuid_to_bson(uuid),
            None => Bson::Boolean(false),
        };
        doc! {
            "renameCollection": source.ns(),
            "to": target.ns(),
            "stayTemp": stay_temp,
            "dropTarget": drop_target,
            "ui": uuid_to_bson(source_uuid),
        }
    }
}

impl OpObserver for OplogObserver {
    fn on_create_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        options: &CollectionOptions,
    ) -> Result<(), ScrollError> {
        if !self.should_log(opctx, ns) {
            return Ok(());
        }
        let op = doc! {
            "create": ns.coll(),
            "ui": uuid_to_bson(uuid),
            "options": options.to_document_without_uuid()?,
        };
        self.append(opctx, ns, op)?;
        Ok(())
    }

    fn on_create_indexes(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        spec: &Document,
    ) -> Result<(), ScrollError> {
        if !self.should_log(opctx, ns) {
            return Ok(());
        }
        let op = doc! {
            "createIndexes": ns.coll(),
            "ui": uuid_to_bson(uuid),
            "spec": spec.clone(),
        };
        self.append(opctx, ns, op)?;
        Ok(())
    }

    fn on_inserts(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
        count: usize,
    ) -> Result<(), ScrollError> {
        if !self.should_log(opctx, ns) {
            return Ok(());
        }
        let op = doc! {
            "insert": ns.coll(),
            "ui": uuid_to_bson(uuid),
            "count": count as i64,
        };
        self.append(opctx, ns, op)?;
        Ok(())
    }

    fn on_drop_collection(
        &self,
        opctx: &OperationContext,
        ns: &Namespace,
        uuid: Uuid,
    ) -> Result<OpTime, ScrollError> {
        if !self.should_log(opctx, ns) {
            return Ok(OpTime::NULL);
        }
        let op = doc! {
            "drop": ns.coll(),
            "ui": uuid_to_bson(uuid),
        };
        self.append(opctx, ns, op)
    }

    fn on_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        _dropped_records: u64,
        stay_temp: bool,
    ) -> Result<(), ScrollError> {
        if !self.should_log(opctx, source) {
            return Ok(());
        }
        let op = Self::rename_entry(source, target, source_uuid, dropped_target_uuid, stay_temp);
        self.append(opctx, source, op)?;
        Ok(())
    }

    fn pre_rename_collection(
        &self,
        opctx: &OperationContext,
        source: &Namespace,
        target: &Namespace,
        source_uuid: Uuid,
        dropped_target_uuid: Option<Uuid>,
        _dropped_records: u64,
        stay_temp: bool,
    ) -> Result<OpTime, ScrollError> {
        if !self.should_log(opctx, source) {
            return Ok(OpTime::NULL);
        }
        let op = Self::rename_entry(source, target, source_uuid, dropped_target_uuid, stay_temp);
        self.append(opctx, source, op)
    }

    fn post_rename_collection(
        &self,
        _opctx: &OperationContext,
        _source: &Namespace,
        _target: &Namespace,
        _source_uuid: Uuid,
        _dropped_target_uuid: Option<Uuid>,
        _stay_temp: bool,
    ) -> Result<(), ScrollError> {
        Ok(())
    }
}
