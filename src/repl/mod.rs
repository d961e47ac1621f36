pub mod observer;

use crate::context::OperationContext;
use crate::namespace::Namespace;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    None,
    ReplicaSet,
}

/// Position in the replicated operation log. Zero is the null position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct OpTime(u64);

impl OpTime {
    pub const NULL: OpTime = OpTime(0);

    pub fn new(ts: u64) -> Self {
        OpTime(ts)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn ts(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "ts({})", self.0)
        }
    }
}

/// Replication coordinator surface: mode, primariness, and which namespaces
/// the operation log covers.
pub struct ReplSettings {
    mode: ReplicationMode,
    primary: AtomicBool,
}

impl ReplSettings {
    pub fn standalone() -> Self {
        Self {
            mode: ReplicationMode::None,
            primary: AtomicBool::new(true),
        }
    }

    pub fn replica_set_primary() -> Self {
        Self {
            mode: ReplicationMode::ReplicaSet,
            primary: AtomicBool::new(true),
        }
    }

    pub fn replica_set_secondary() -> Self {
        Self {
            mode: ReplicationMode::ReplicaSet,
            primary: AtomicBool::new(false),
        }
    }

    pub fn replication_mode(&self) -> ReplicationMode {
        self.mode
    }

    pub fn set_primary(&self, primary: bool) {
        self.primary.store(primary, Ordering::SeqCst);
    }

    pub fn can_accept_writes_for(&self, ns: &Namespace) -> bool {
        match self.mode {
            ReplicationMode::None => true,
            ReplicationMode::ReplicaSet => ns.is_local() || self.primary.load(Ordering::SeqCst),
        }
    }

    /// Whether operations on `ns` are excluded from the operation log.
    pub fn is_oplog_disabled_for(&self, ns: &Namespace) -> bool {
        self.mode == ReplicationMode::None || ns.is_local()
    }
}

/// While in scope, writes by this operation are not transcribed to the
/// operation log. Used for internal sub-operations whose enclosing command
/// is replicated as a single entry.
pub struct UnreplicatedWritesBlock<'a> {
    opctx: &'a OperationContext,
}

impl<'a> UnreplicatedWritesBlock<'a> {
    pub fn new(opctx: &'a OperationContext) -> Self {
        opctx.unreplicated_depth().set(opctx.unreplicated_depth().get() + 1);
        Self { opctx }
    }
}

impl Drop for UnreplicatedWritesBlock<'_> {
    fn drop(&mut self) {
        let depth = self.opctx.unreplicated_depth();
        depth.set(depth.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::{OpTime, ReplSettings};
    use crate::namespace::Namespace;

    #[test]
    fn null_op_time() {
        assert!(OpTime::NULL.is_null());
        assert!(!OpTime::new(3).is_null());
        assert_eq!(OpTime::new(3).to_string(), "ts(3)");
    }

    #[test]
    fn oplog_disabled_for_local_and_standalone() {
        let standalone = ReplSettings::standalone();
        assert!(standalone.is_oplog_disabled_for(&Namespace::new("db1", "x")));
        let primary = ReplSettings::replica_set_primary();
        assert!(!primary.is_oplog_disabled_for(&Namespace::new("db1", "x")));
        assert!(primary.is_oplog_disabled_for(&Namespace::new("local", "x")));
    }

    #[test]
    fn secondaries_reject_user_writes() {
        let secondary = ReplSettings::replica_set_secondary();
        assert!(!secondary.can_accept_writes_for(&Namespace::new("db1", "x")));
        assert!(secondary.can_accept_writes_for(&Namespace::new("local", "x")));
        secondary.set_primary(true);
        assert!(secondary.can_accept_writes_for(&Namespace::new("db1", "x")));
    }
}
