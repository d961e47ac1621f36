use crate::context::OperationContext;
use crate::error::ScrollError;
use crate::namespace::{Namespace, ResourceId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Multi-granularity lock modes, weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentShared,
    IntentExclusive,
    Shared,
    Exclusive,
}

impl LockMode {
    /// Standard multi-granularity compatibility matrix.
    pub fn is_compatible_with(self, held: LockMode) -> bool {
        use LockMode::*;
        match (self, held) {
            (IntentShared, IntentShared | IntentExclusive | Shared) => true,
            (IntentExclusive, IntentShared | IntentExclusive) => true,
            (Shared, IntentShared | Shared) => true,
            _ => false,
        }
    }

    /// Whether holding `self` satisfies a requirement for `wanted`.
    pub fn covers(self, wanted: LockMode) -> bool {
        use LockMode::*;
        match self {
            Exclusive => true,
            Shared => matches!(wanted, Shared | IntentShared),
            IntentExclusive => matches!(wanted, IntentExclusive | IntentShared),
            IntentShared => matches!(wanted, IntentShared),
        }
    }
}

pub(crate) type LockerId = u64;

struct Grant {
    locker: LockerId,
    mode: LockMode,
    count: u32,
}

#[derive(Default)]
struct LockTable {
    resources: HashMap<ResourceId, Vec<Grant>>,
}

/// Blocking lock manager over database- and collection-level resources.
///
/// Waits are sliced so a blocked acquisition can poll its operation for
/// interruption. There is no deadlock detector; callers are responsible for
/// acquiring in the documented order.
pub struct LockManager {
    table: Mutex<LockTable>,
    cv: Condvar,
}

impl LockManager {
    pub(crate) fn new() -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            cv: Condvar::new(),
        }
    }

    fn grantable(grants: &[Grant], locker: LockerId, mode: LockMode) -> bool {
        // A locker never conflicts with its own grants; re-acquisition and
        // stacking a stronger mode on top are both allowed.
        grants
            .iter()
            .filter(|g| g.locker != locker)
            .all(|g| mode.is_compatible_with(g.mode))
    }

    pub(crate) fn lock(
        &self,
        opctx: &OperationContext,
        resource: ResourceId,
        mode: LockMode,
    ) -> Result<(), ScrollError> {
        let locker = opctx.locker_id();
        let slice = Duration::from_millis(opctx.config().lock_wait_slice_ms.max(1));
        let mut table = self.table.lock();
        loop {
            let grants = table.resources.entry(resource).or_default();
            if Self::grantable(grants, locker, mode) {
                match grants
                    .iter_mut()
                    .find(|g| g.locker == locker && g.mode == mode)
                {
                    Some(grant) => grant.count += 1,
                    None => grants.push(Grant {
                        locker,
                        mode,
                        count: 1,
                    }),
                }
                return Ok(());
            }
            let _ = self.cv.wait_for(&mut table, slice);
            opctx.poll_lock_interrupt()?;
        }
    }

    pub(crate) fn unlock(&self, locker: LockerId, resource: ResourceId, mode: LockMode) {
        let mut table = self.table.lock();
        let grants = table
            .resources
            .get_mut(&resource)
            .expect("unlock of an unknown resource");
        let idx = grants
            .iter()
            .position(|g| g.locker == locker && g.mode == mode)
            .expect("unlock of a lock that is not held");
        grants[idx].count -= 1;
        if grants[idx].count == 0 {
            grants.swap_remove(idx);
        }
        if grants.is_empty() {
            table.resources.remove(&resource);
        }
        drop(table);
        self.cv.notify_all();
    }

    pub(crate) fn locker_holds(
        &self,
        locker: LockerId,
        resource: ResourceId,
        wanted: LockMode,
    ) -> bool {
        let table = self.table.lock();
        table
            .resources
            .get(&resource)
            .is_some_and(|grants| grants.iter().any(|g| g.locker == locker && g.mode.covers(wanted)))
    }
}

/// Owning handle on a database lock; released on drop.
pub struct DatabaseLock {
    mgr: Arc<LockManager>,
    locker: LockerId,
    resource: ResourceId,
    mode: LockMode,
}

impl DatabaseLock {
    pub fn new(opctx: &OperationContext, db: &str, mode: LockMode) -> Result<Self, ScrollError> {
        let resource = ResourceId::for_database(db);
        opctx.lock_manager().lock(opctx, resource, mode)?;
        Ok(Self {
            mgr: Arc::clone(opctx.lock_manager()),
            locker: opctx.locker_id(),
            resource,
            mode,
        })
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        self.mgr.unlock(self.locker, self.resource, self.mode);
    }
}

/// Owning handle on a collection lock; released on drop.
pub struct CollectionLock {
    mgr: Arc<LockManager>,
    locker: LockerId,
    resource: ResourceId,
    mode: LockMode,
}

impl CollectionLock {
    pub fn new(
        opctx: &OperationContext,
        ns: &Namespace,
        mode: LockMode,
    ) -> Result<Self, ScrollError> {
        let resource = ns.resource_id();
        opctx.lock_manager().lock(opctx, resource, mode)?;
        Ok(Self {
            mgr: Arc::clone(opctx.lock_manager()),
            locker: opctx.locker_id(),
            resource,
            mode,
        })
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        self.mgr.unlock(self.locker, self.resource, self.mode);
    }
}

/// While in scope, lock acquisitions on this operation ignore interruption.
/// Used around observer emission, which holds the oplog collection lock and
/// must not be abandoned half-way.
pub struct UninterruptibleLockGuard<'a> {
    opctx: &'a OperationContext,
}

impl<'a> UninterruptibleLockGuard<'a> {
    pub fn new(opctx: &'a OperationContext) -> Self {
        opctx.uninterruptible_depth().set(opctx.uninterruptible_depth().get() + 1);
        Self { opctx }
    }
}

impl Drop for UninterruptibleLockGuard<'_> {
    fn drop(&mut self) {
        let depth = self.opctx.uninterruptible_depth();
        depth.set(depth.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionLock, DatabaseLock, LockMode};
    use crate::config::ScrollConfig;
    use crate::context::ServiceContext;
    use crate::namespace::Namespace;
    use crate::repl::ReplSettings;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn svc() -> Arc<ServiceContext> {
        ServiceContext::new(ScrollConfig::test(), ReplSettings::standalone())
    }

    #[test]
    fn compatibility_matrix() {
        use LockMode::*;
        assert!(IntentShared.is_compatible_with(Shared));
        assert!(IntentExclusive.is_compatible_with(IntentExclusive));
        assert!(!IntentExclusive.is_compatible_with(Shared));
        assert!(!Shared.is_compatible_with(IntentExclusive));
        assert!(!Exclusive.is_compatible_with(IntentShared));
        assert!(Exclusive.covers(Shared));
        assert!(IntentExclusive.covers(IntentShared));
        assert!(!IntentExclusive.covers(Shared));
    }

    #[test]
    fn same_locker_reacquires_and_stacks_modes() {
        let svc = svc();
        let opctx = svc.new_operation();
        let a = DatabaseLock::new(&opctx, "db1", LockMode::IntentExclusive).expect("ix");
        let b = DatabaseLock::new(&opctx, "db1", LockMode::IntentExclusive).expect("ix again");
        let c = DatabaseLock::new(&opctx, "db1", LockMode::Exclusive).expect("upgrade");
        assert!(opctx.is_db_locked_for_mode("db1", LockMode::Exclusive));
        drop(c);
        assert!(!opctx.is_db_locked_for_mode("db1", LockMode::Exclusive));
        assert!(opctx.is_db_locked_for_mode("db1", LockMode::IntentShared));
        drop(b);
        drop(a);
        assert!(!opctx.is_db_locked_for_mode("db1", LockMode::IntentShared));
    }

    #[test]
    fn exclusive_blocks_other_locker_until_released() {
        let svc = svc();
        let ns = Namespace::new("db1", "x");
        let opctx = svc.new_operation();
        let held = CollectionLock::new(&opctx, &ns, LockMode::Exclusive).expect("x");

        let acquired = Arc::new(AtomicBool::new(false));
        let thread = {
            let svc = Arc::clone(&svc);
            let ns = ns.clone();
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let opctx = svc.new_operation();
                let _lk = CollectionLock::new(&opctx, &ns, LockMode::Shared).expect("s");
                acquired.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(held);
        thread.join().expect("join");
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn blocked_wait_honors_interruption() {
        let svc = svc();
        let ns = Namespace::new("db1", "x");
        let opctx = svc.new_operation();
        let _held = CollectionLock::new(&opctx, &ns, LockMode::Exclusive).expect("x");

        let blocked = svc.new_operation();
        let handle = blocked.interrupt_handle();
        let thread = std::thread::spawn(move || {
            CollectionLock::new(&blocked, &ns, LockMode::Shared).map(|_| ())
        });
        std::thread::sleep(Duration::from_millis(30));
        handle.interrupt();
        let result = thread.join().expect("join");
        assert!(matches!(result, Err(crate::error::ScrollError::Interrupted)));
    }
}
