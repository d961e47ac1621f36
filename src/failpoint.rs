use parking_lot::RwLock;
use std::collections::HashMap;

/// Forces a write conflict out of the cross-database copy loop, after a
/// batch has been staged but before its write unit commits.
pub const WRITE_CONFLICT_IN_RENAME_COPY: &str = "write-conflict-in-rename-copy";
/// Suppresses the sharded-source rejection so routed renames can be driven
/// through this path in tests.
pub const RENAME_PATH_THROUGH_CONFIG_SERVER: &str = "rename-path-through-config-server";

#[derive(Debug, Clone, Copy)]
enum Mode {
    AlwaysOn,
    /// Fires for the next `n` consultations, then turns itself off.
    Times(u64),
}

/// Fault-injection toggles keyed by name, consulted inline at the named
/// points. Owned by the service context so tests stay isolated.
#[derive(Default)]
pub struct FailPoints {
    points: RwLock<HashMap<String, Mode>>,
}

impl FailPoints {
    pub fn enable(&self, name: &str) {
        self.points.write().insert(name.to_string(), Mode::AlwaysOn);
    }

    pub fn enable_times(&self, name: &str, times: u64) {
        self.points
            .write()
            .insert(name.to_string(), Mode::Times(times));
    }

    pub fn disable(&self, name: &str) {
        self.points.write().remove(name);
    }

    /// Consults (and for `Times` modes, consumes) the named point.
    pub fn should_fail(&self, name: &str) -> bool {
        let mut points = self.points.write();
        let exhausted = match points.get_mut(name) {
            None => return false,
            Some(Mode::AlwaysOn) => return true,
            Some(Mode::Times(n)) => {
                *n -= 1;
                *n == 0
            }
        };
        if exhausted {
            points.remove(name);
        }
        true
    }
}
