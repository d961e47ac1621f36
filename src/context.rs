use crate::background::{BackgroundRegistry, IndexBuildsCoordinator};
use crate::catalog::CollectionCatalog;
use crate::config::ScrollConfig;
use crate::error::ScrollError;
use crate::failpoint::FailPoints;
use crate::lock::{LockManager, LockMode, LockerId};
use crate::namespace::{Namespace, ResourceId};
use crate::repl::ReplSettings;
use crate::repl::observer::{OpObserver, Oplog, OplogObserver};
use crate::sharding::ShardingRegistry;
use crate::storage::write_unit::RecoveryUnit;
use std::cell::{Cell, RefCell, RefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Process-wide service state: the catalog, the lock manager, replication
/// settings, and the injected operation observer.
pub struct ServiceContext {
    config: ScrollConfig,
    lock_manager: Arc<LockManager>,
    catalog: CollectionCatalog,
    repl: Arc<ReplSettings>,
    oplog: Arc<Oplog>,
    observer: Box<dyn OpObserver>,
    sharding: ShardingRegistry,
    background: BackgroundRegistry,
    index_builds: IndexBuildsCoordinator,
    fail_points: FailPoints,
    next_locker: AtomicU64,
    self_ref: Weak<ServiceContext>,
}

impl ServiceContext {
    pub fn new(config: ScrollConfig, repl: ReplSettings) -> Arc<Self> {
        Self::with_observer(config, repl, |oplog, repl| {
            Box::new(OplogObserver::new(Arc::clone(oplog), Arc::clone(repl)))
        })
    }

    /// Builds a service with a caller-supplied observer. The factory receives
    /// the oplog and replication settings so wrappers can still transcribe.
    pub fn with_observer(
        config: ScrollConfig,
        repl: ReplSettings,
        observer: impl FnOnce(&Arc<Oplog>, &Arc<ReplSettings>) -> Box<dyn OpObserver>,
    ) -> Arc<Self> {
        let repl = Arc::new(repl);
        let oplog = Arc::new(Oplog::default());
        let observer = observer(&oplog, &repl);
        Arc::new_cyclic(|self_ref| Self {
            config,
            lock_manager: Arc::new(LockManager::new()),
            catalog: CollectionCatalog::default(),
            repl,
            oplog,
            observer,
            sharding: ShardingRegistry::default(),
            background: BackgroundRegistry::default(),
            index_builds: IndexBuildsCoordinator::default(),
            fail_points: FailPoints::default(),
            next_locker: AtomicU64::new(1),
            self_ref: self_ref.clone(),
        })
    }

    pub fn new_operation(&self) -> OperationContext {
        let svc = self
            .self_ref
            .upgrade()
            .expect("service context dropped while creating an operation");
        OperationContext {
            svc,
            locker: self.next_locker.fetch_add(1, Ordering::Relaxed),
            killed: Arc::new(AtomicBool::new(false)),
            uninterruptible_depth: Cell::new(0),
            unreplicated_depth: Cell::new(0),
            validation_disabled_depth: Cell::new(0),
            recovery: RefCell::new(RecoveryUnit::default()),
        }
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn repl(&self) -> &ReplSettings {
        &self.repl
    }

    pub fn oplog(&self) -> &Arc<Oplog> {
        &self.oplog
    }

    pub fn observer(&self) -> &dyn OpObserver {
        self.observer.as_ref()
    }

    pub fn sharding(&self) -> &ShardingRegistry {
        &self.sharding
    }

    pub fn background(&self) -> &BackgroundRegistry {
        &self.background
    }

    pub fn index_builds(&self) -> &IndexBuildsCoordinator {
        &self.index_builds
    }

    pub fn fail_points(&self) -> &FailPoints {
        &self.fail_points
    }
}

/// Per-operation state: lock ownership, interruption, the recovery unit, and
/// the scoped suppression counters.
pub struct OperationContext {
    svc: Arc<ServiceContext>,
    locker: LockerId,
    killed: Arc<AtomicBool>,
    uninterruptible_depth: Cell<u32>,
    unreplicated_depth: Cell<u32>,
    validation_disabled_depth: Cell<u32>,
    recovery: RefCell<RecoveryUnit>,
}

impl OperationContext {
    pub fn svc(&self) -> &Arc<ServiceContext> {
        &self.svc
    }

    pub fn config(&self) -> &ScrollConfig {
        self.svc.config()
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        self.svc.catalog()
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        self.svc.lock_manager()
    }

    pub fn repl(&self) -> &ReplSettings {
        self.svc.repl()
    }

    pub fn observer(&self) -> &dyn OpObserver {
        self.svc.observer()
    }

    pub fn sharding(&self) -> &ShardingRegistry {
        self.svc.sharding()
    }

    pub fn background(&self) -> &BackgroundRegistry {
        self.svc.background()
    }

    pub fn index_builds(&self) -> &IndexBuildsCoordinator {
        self.svc.index_builds()
    }

    pub fn fail_points(&self) -> &FailPoints {
        self.svc.fail_points()
    }

    pub(crate) fn locker_id(&self) -> LockerId {
        self.locker
    }

    /// Handle other threads can use to cancel this operation.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.killed))
    }

    pub fn check_for_interrupt(&self) -> Result<(), ScrollError> {
        if self.killed.load(Ordering::SeqCst) {
            return Err(ScrollError::Interrupted);
        }
        Ok(())
    }

    /// Interrupt check used inside blocked lock waits; a no-op while an
    /// uninterruptible guard is active.
    pub(crate) fn poll_lock_interrupt(&self) -> Result<(), ScrollError> {
        if self.uninterruptible_depth.get() > 0 {
            return Ok(());
        }
        self.check_for_interrupt()
    }

    pub fn writes_are_replicated(&self) -> bool {
        self.unreplicated_depth.get() == 0
    }

    pub fn is_document_validation_disabled(&self) -> bool {
        self.validation_disabled_depth.get() > 0
    }

    pub fn is_db_locked_for_mode(&self, db: &str, mode: LockMode) -> bool {
        self.svc
            .lock_manager()
            .locker_holds(self.locker, ResourceId::for_database(db), mode)
    }

    pub fn is_collection_locked_for_mode(&self, ns: &Namespace, mode: LockMode) -> bool {
        self.svc
            .lock_manager()
            .locker_holds(self.locker, ns.resource_id(), mode)
    }

    pub(crate) fn uninterruptible_depth(&self) -> &Cell<u32> {
        &self.uninterruptible_depth
    }

    pub(crate) fn unreplicated_depth(&self) -> &Cell<u32> {
        &self.unreplicated_depth
    }

    pub(crate) fn validation_disabled_depth(&self) -> &Cell<u32> {
        &self.validation_disabled_depth
    }

    pub(crate) fn recovery_mut(&self) -> RefMut<'_, RecoveryUnit> {
        self.recovery.borrow_mut()
    }

    pub fn in_write_unit(&self) -> bool {
        self.recovery.borrow().is_active()
    }

    /// Registers an undo action with the active write unit. Catalog and
    /// record mutations are only legal inside one.
    pub(crate) fn register_rollback(&self, undo: impl FnOnce() + Send + 'static) {
        self.recovery.borrow_mut().register(Box::new(undo));
    }
}

pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
