use std::collections::HashMap;
use std::fmt;

use crate::host::BufferId;

/// One-shot initialisation callback run against the host's per-buffer state.
pub type InitCallback<C> = Box<dyn FnOnce(&mut C)>;

/// 延遲初始化佇列：每個緩衝區最多一個待執行回呼。 /
/// Arena of deferred initialisation callbacks, at most one pending per buffer.
///
/// The queue never runs anything itself; the host drains it from its display event
/// dispatch via [`DeferredInitQueue::take`].
pub struct DeferredInitQueue<C> {
    pending: HashMap<BufferId, InitCallback<C>>,
}

impl<C> Default for DeferredInitQueue<C> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for DeferredInitQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.pending.keys().copied().collect();
        ids.sort();
        f.debug_struct("DeferredInitQueue")
            .field("pending", &ids)
            .finish()
    }
}

impl<C> DeferredInitQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `callback` for `buf`. Returns `false` and drops the callback when one is
    /// already pending for that buffer.
    pub fn schedule(&mut self, buf: BufferId, callback: InitCallback<C>) -> bool {
        if self.pending.contains_key(&buf) {
            return false;
        }
        self.pending.insert(buf, callback);
        true
    }

    /// Removes and returns the pending callback for `buf`.
    pub fn take(&mut self, buf: BufferId) -> Option<InitCallback<C>> {
        self.pending.remove(&buf)
    }

    /// Drops a pending callback without running it, e.g. when the buffer is deleted.
    pub fn cancel(&mut self, buf: BufferId) -> bool {
        self.pending.remove(&buf).is_some()
    }

    pub fn is_pending(&self, buf: BufferId) -> bool {
        self.pending.contains_key(&buf)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
