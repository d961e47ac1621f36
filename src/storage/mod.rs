pub mod write_unit;

use crate::context::OperationContext;
use crate::error::ScrollError;
use bson::Document;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Position of a record within its store. Ids are assigned in insertion
/// order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

#[derive(Debug, Clone)]
pub struct Record {
    pub id: RecordId,
    pub data: Arc<Vec<u8>>,
}

impl Record {
    pub fn to_document(&self) -> Result<Document, ScrollError> {
        Ok(Document::from_reader(&self.data[..])?)
    }
}

#[derive(Default)]
struct StoreState {
    records: BTreeMap<RecordId, Arc<Vec<u8>>>,
    next_id: u64,
}

/// Ordered in-memory record store backing one collection. State is shared
/// with outstanding cursors and with undo actions registered against write
/// units.
pub struct RecordStore {
    state: Arc<RwLock<StoreState>>,
}

impl RecordStore {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn num_records(&self) -> u64 {
        self.state.read().records.len() as u64
    }

    /// Inserts raw document bytes. Requires an active write unit; the insert
    /// is undone if the unit aborts.
    pub(crate) fn insert(&self, opctx: &OperationContext, data: Vec<u8>) -> RecordId {
        let id = {
            let mut state = self.state.write();
            state.next_id += 1;
            let id = RecordId(state.next_id);
            state.records.insert(id, Arc::new(data));
            id
        };
        let state = Arc::clone(&self.state);
        opctx.register_rollback(move || {
            state.write().records.remove(&id);
        });
        id
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            state: Arc::clone(&self.state),
            last: None,
            detached: false,
        }
    }

    /// Materializes every record in id order.
    pub fn scan(&self) -> Vec<Record> {
        self.state
            .read()
            .records
            .iter()
            .map(|(id, data)| Record {
                id: *id,
                data: Arc::clone(data),
            })
            .collect()
    }
}

/// Forward cursor over a record store. `save` detaches the cursor so the
/// store may be mutated underneath it; `restore` revalidates the position,
/// after which `seek_exact` can re-address the record a batch started at
/// even if a conflicting transaction rolled the batch back.
pub struct Cursor {
    state: Arc<RwLock<StoreState>>,
    last: Option<RecordId>,
    detached: bool,
}

impl Cursor {
    pub fn next(&mut self) -> Option<Record> {
        assert!(!self.detached, "cursor advanced while saved");
        let state = self.state.read();
        let lower = match self.last {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let found = state
            .records
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(id, data)| Record {
                id: *id,
                data: Arc::clone(data),
            });
        if let Some(record) = &found {
            self.last = Some(record.id);
        }
        found
    }

    pub fn seek_exact(&mut self, id: RecordId) -> Option<Record> {
        assert!(!self.detached, "cursor sought while saved");
        self.last = Some(id);
        self.state.read().records.get(&id).map(|data| Record {
            id,
            data: Arc::clone(data),
        })
    }

    pub fn save(&mut self) {
        self.detached = true;
    }

    pub fn restore(&mut self) -> Result<(), ScrollError> {
        self.detached = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RecordStore;
    use crate::config::ScrollConfig;
    use crate::context::ServiceContext;
    use crate::repl::ReplSettings;
    use crate::storage::write_unit::WriteUnitOfWork;

    #[test]
    fn cursor_iterates_in_id_order_and_seeks() {
        let svc = ServiceContext::new(ScrollConfig::test(), ReplSettings::standalone());
        let opctx = svc.new_operation();
        let store = RecordStore::new();

        let wunit = WriteUnitOfWork::new(&opctx);
        let ids: Vec<_> = (0..3u8).map(|i| store.insert(&opctx, vec![i])).collect();
        wunit.commit();

        let mut cursor = store.cursor();
        let first = cursor.next().expect("first");
        assert_eq!(first.id, ids[0]);
        cursor.save();
        cursor.restore().expect("restore");
        let again = cursor.seek_exact(ids[0]).expect("seek");
        assert_eq!(*again.data, vec![0u8]);
        assert_eq!(cursor.next().expect("second").id, ids[1]);
        assert_eq!(cursor.next().expect("third").id, ids[2]);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn aborted_insert_is_invisible() {
        let svc = ServiceContext::new(ScrollConfig::test(), ReplSettings::standalone());
        let opctx = svc.new_operation();
        let store = RecordStore::new();
        {
            let _wunit = WriteUnitOfWork::new(&opctx);
            store.insert(&opctx, vec![1]);
            assert_eq!(store.num_records(), 1);
        }
        assert_eq!(store.num_records(), 0);
    }
}
