use crate::error::ScrollError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const SYSTEM_PREFIX: &str = "system.";
const SYSTEM_VIEWS: &str = "system.views";
const DROP_PENDING_PREFIX: &str = "system.drop.";
const MAX_NS_LEN: usize = 255;

/// Fully-qualified collection name: `(database, collection)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    db: String,
    coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Parses a full `database.collection` string. The first dot separates
    /// the database from the collection; the collection may itself contain
    /// dots.
    pub fn parse(ns: &str) -> Result<Self, ScrollError> {
        match ns.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(ScrollError::InvalidNamespace(format!(
                "expected database.collection, got '{ns}'"
            ))),
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn coll(&self) -> &str {
        &self.coll
    }

    pub fn ns(&self) -> String {
        format!("{}.{}", self.db, self.coll)
    }

    pub fn is_valid(&self) -> bool {
        if self.db.is_empty() || self.coll.is_empty() {
            return false;
        }
        if self.db.len() + 1 + self.coll.len() > MAX_NS_LEN {
            return false;
        }
        if self.db.contains(['.', ' ', '/', '\\', '$', '\0']) {
            return false;
        }
        !self.coll.starts_with('.') && !self.coll.contains(['$', '\0'])
    }

    pub fn is_local(&self) -> bool {
        self.db == "local"
    }

    pub fn is_oplog(&self) -> bool {
        self.is_local() && self.coll.starts_with("oplog.")
    }

    pub fn is_system(&self) -> bool {
        self.coll.starts_with(SYSTEM_PREFIX)
    }

    pub fn is_system_views(&self) -> bool {
        self.coll == SYSTEM_VIEWS
    }

    /// The `admin.system.version` collection holding cluster-wide
    /// configuration; never a legal rename participant.
    pub fn is_server_configuration(&self) -> bool {
        self.db == "admin" && self.coll == "system.version"
    }

    pub fn is_drop_pending(&self) -> bool {
        self.coll.starts_with(DROP_PENDING_PREFIX)
    }

    /// Namespaces a user command is allowed to write to. System collections
    /// are reserved except for the few with a documented write surface.
    pub fn is_user_writable(&self) -> bool {
        if !self.is_system() {
            return true;
        }
        matches!(self.coll.as_str(), "system.users" | "system.js")
    }

    /// The name a collection parks under between a replicated drop and its
    /// physical removal. Keeps the collection resolvable by UUID.
    pub fn drop_pending_variant(&self, drop_ts: u64) -> Namespace {
        Namespace::new(
            self.db.clone(),
            format!("{DROP_PENDING_PREFIX}{drop_ts}.{}", self.coll),
        )
    }

    /// Lock-resource identifier for this collection. Stable across processes
    /// and runs; defines the total order collection locks are acquired in.
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::for_collection(self)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Identifier of a lockable resource (a database or a collection), derived
/// from a stable digest of the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

#[derive(Clone, Copy)]
enum ResourceKind {
    Database = 1,
    Collection = 2,
}

impl ResourceId {
    fn digest(kind: ResourceKind, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([kind as u8]);
        hasher.update(name.as_bytes());
        let out = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&out[..8]);
        ResourceId(u64::from_be_bytes(word))
    }

    pub fn for_database(db: &str) -> Self {
        Self::digest(ResourceKind::Database, db)
    }

    pub fn for_collection(ns: &Namespace) -> Self {
        Self::digest(ResourceKind::Collection, &ns.ns())
    }
}
