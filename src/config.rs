/// Runtime configuration for the catalog/storage layer.
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Upper bound on documents moved per write unit by the cross-database
    /// copy loop. The copy commits and yields between batches.
    pub insert_batch_size: usize,
    /// Granularity at which a blocked lock wait wakes up to poll for
    /// interruption.
    pub lock_wait_slice_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: 500,
            lock_wait_slice_ms: 20,
        }
    }
}

impl ScrollConfig {
    /// Profile for tests: tiny batches so multi-batch copy paths are
    /// exercised with small collections.
    pub fn test() -> Self {
        Self {
            insert_batch_size: 4,
            lock_wait_slice_ms: 5,
        }
    }
}
