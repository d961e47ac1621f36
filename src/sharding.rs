use crate::error::ScrollError;
use crate::namespace::Namespace;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Routing state attached to this node: which collections are sharded and
/// which databases have a stale routing version.
#[derive(Default)]
pub struct ShardingRegistry {
    sharded: RwLock<HashSet<Namespace>>,
    stale_dbs: RwLock<HashSet<String>>,
}

impl ShardingRegistry {
    pub fn shard_collection(&self, ns: &Namespace) {
        self.sharded.write().insert(ns.clone());
    }

    pub fn is_collection_sharded(&self, ns: &Namespace) -> bool {
        self.sharded.read().contains(ns)
    }

    pub fn mark_db_version_stale(&self, db: &str) {
        self.stale_dbs.write().insert(db.to_string());
    }

    /// Rejects the operation when this node's cached database routing
    /// version no longer matches the routing table.
    pub fn check_db_version(&self, db: &str) -> Result<(), ScrollError> {
        if self.stale_dbs.read().contains(db) {
            return Err(ScrollError::IllegalOperation(format!(
                "database version mismatch for '{db}'"
            )));
        }
        Ok(())
    }
}
