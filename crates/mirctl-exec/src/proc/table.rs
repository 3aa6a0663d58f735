use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::util::terminate_pid;

/// Live external processes, indexed by owning task id.
///
/// This is the only handle the controller keeps on running work; terminate requests go through it.
#[derive(Clone, Default)]
pub struct ProcessTable {
    inner: Arc<Mutex<HashMap<String, Vec<u32>>>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner: &str, pid: u32) {
        self.inner.lock().entry(owner.to_string()).or_default().push(pid);
    }

    pub fn unregister(&self, owner: &str, pid: u32) {
        let mut inner = self.inner.lock();
        if let Some(pids) = inner.get_mut(owner) {
            pids.retain(|p| *p != pid);
            if pids.is_empty() {
                inner.remove(owner);
            }
        }
    }

    pub fn pids(&self, owner: &str) -> Vec<u32> {
        self.inner.lock().get(owner).cloned().unwrap_or_default()
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.inner.lock().contains_key(owner)
    }

    /// Send `SIGTERM` to every process of `owner`. Returns how many were signalled.
    ///
    /// Entries are left in place; the runner removes them when the wait returns.
    pub fn terminate(&self, owner: &str) -> usize {
        let pids = self.pids(owner);
        let mut signalled = 0;
        for pid in pids {
            match terminate_pid(pid) {
                Ok(()) => {
                    debug!(target: "mirctl.exec.table", owner, pid, "terminate signal sent");
                    signalled += 1;
                }
                Err(e) => warn!(target: "mirctl.exec.table", owner, pid, error = %e, "terminate failed"),
            }
        }
        signalled
    }
}
