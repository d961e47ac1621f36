use crate::context::OperationContext;
use crate::error::ScrollError;
use std::time::Duration;

type RollbackOp = Box<dyn FnOnce() + Send>;

/// Per-operation transaction state backing [`WriteUnitOfWork`]. Undo actions
/// accumulate while a unit is open and are discarded on commit or replayed in
/// reverse on abort.
#[derive(Default)]
pub(crate) struct RecoveryUnit {
    depth: u32,
    aborted: bool,
    rollback: Vec<RollbackOp>,
}

impl RecoveryUnit {
    pub(crate) fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn register(&mut self, undo: RollbackOp) {
        assert!(
            self.depth > 0,
            "catalog or record mutation outside of a write unit"
        );
        self.rollback.push(undo);
    }
}

/// A storage transaction bracketing zero or more mutations that commit
/// atomically. Units nest: an inner commit is deferred to the outermost
/// unit, and dropping any unit without committing aborts the whole stack.
pub struct WriteUnitOfWork<'a> {
    opctx: &'a OperationContext,
    committed: bool,
}

impl<'a> WriteUnitOfWork<'a> {
    pub fn new(opctx: &'a OperationContext) -> Self {
        let mut unit = opctx.recovery_mut();
        assert!(!unit.aborted, "write unit opened under an aborted stack");
        unit.depth += 1;
        drop(unit);
        Self {
            opctx,
            committed: false,
        }
    }

    pub fn commit(mut self) {
        let mut unit = self.opctx.recovery_mut();
        assert!(!unit.aborted, "commit after a nested write unit aborted");
        if unit.depth == 1 {
            unit.rollback.clear();
        }
        unit.depth -= 1;
        drop(unit);
        self.committed = true;
    }
}

impl Drop for WriteUnitOfWork<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let pending = {
            let mut unit = self.opctx.recovery_mut();
            unit.depth -= 1;
            if unit.depth == 0 {
                unit.aborted = false;
                std::mem::take(&mut unit.rollback)
            } else {
                unit.aborted = true;
                Vec::new()
            }
        };
        for undo in pending.into_iter().rev() {
            undo();
        }
    }
}

/// Runs `body` until it returns anything other than a write-conflict error.
/// Each retry reconstructs the enclosed write unit from scratch (the failed
/// unit rolled back when it was dropped). When the caller is already inside
/// an active write unit the body runs exactly once and the conflict, if any,
/// propagates: retrying a fragment of a larger transaction is unsound.
pub fn write_conflict_retry<T>(
    opctx: &OperationContext,
    label: &str,
    ns: &str,
    mut body: impl FnMut() -> Result<T, ScrollError>,
) -> Result<T, ScrollError> {
    if opctx.in_write_unit() {
        return body();
    }
    let mut attempts: u64 = 0;
    loop {
        match body() {
            Err(err) if err.is_write_conflict() => {
                attempts += 1;
                tracing::debug!(label, ns, attempts, "caught write conflict, retrying");
                if attempts < 4 {
                    std::thread::yield_now();
                } else {
                    std::thread::sleep(Duration::from_millis(attempts.min(10)));
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WriteUnitOfWork, write_conflict_retry};
    use crate::config::ScrollConfig;
    use crate::context::ServiceContext;
    use crate::error::ScrollError;
    use crate::repl::ReplSettings;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn opctx_svc() -> Arc<ServiceContext> {
        ServiceContext::new(ScrollConfig::test(), ReplSettings::standalone())
    }

    #[test]
    fn rollback_runs_in_reverse_on_abort_only() {
        let svc = opctx_svc();
        let opctx = svc.new_operation();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));

        {
            let wunit = WriteUnitOfWork::new(&opctx);
            for tag in ["a", "b"] {
                let trace = Arc::clone(&trace);
                opctx.register_rollback(move || trace.lock().push(tag));
            }
            wunit.commit();
        }
        assert!(trace.lock().is_empty());

        {
            let _wunit = WriteUnitOfWork::new(&opctx);
            for tag in ["a", "b"] {
                let trace = Arc::clone(&trace);
                opctx.register_rollback(move || trace.lock().push(tag));
            }
            // dropped uncommitted
        }
        assert_eq!(*trace.lock(), vec!["b", "a"]);
    }

    #[test]
    fn nested_units_commit_at_outermost_and_abort_together() {
        let svc = opctx_svc();
        let opctx = svc.new_operation();
        let trace = Arc::new(parking_lot::Mutex::new(Vec::new()));

        {
            let outer = WriteUnitOfWork::new(&opctx);
            {
                let inner = WriteUnitOfWork::new(&opctx);
                let trace = Arc::clone(&trace);
                opctx.register_rollback(move || trace.lock().push("inner"));
                inner.commit();
            }
            // Inner commit must not have discarded the undo yet.
            assert!(opctx.in_write_unit());
            drop(outer);
        }
        assert_eq!(*trace.lock(), vec!["inner"]);
    }

    #[test]
    fn retry_absorbs_write_conflicts() {
        let svc = opctx_svc();
        let opctx = svc.new_operation();
        let calls = AtomicU32::new(0);
        let result = write_conflict_retry(&opctx, "test", "db1.x", || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(ScrollError::WriteConflict);
            }
            Ok(7)
        });
        assert_eq!(result.expect("retried"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_is_a_passthrough_inside_an_active_unit() {
        let svc = opctx_svc();
        let opctx = svc.new_operation();
        let wunit = WriteUnitOfWork::new(&opctx);
        let result: Result<(), _> =
            write_conflict_retry(&opctx, "test", "db1.x", || Err(ScrollError::WriteConflict));
        assert!(matches!(result, Err(ScrollError::WriteConflict)));
        wunit.commit();
    }
}
