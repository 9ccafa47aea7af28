// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The runtime context shared by every operation of a resource system.

use crate::deferred::{DeferredAction, DeferredQueue};
use crate::operation::handle::{Composition, OperationState};
use crate::operation::{AsyncOperation, ProgressTracker};
use crate::pool::{OperationPool, PoolSettings};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub(crate) struct RuntimeInner {
    pub(crate) pool: RefCell<OperationPool>,
    pub(crate) deferred: DeferredQueue,
}

/// Owns the reuse pool and the deferred-action queue.
///
/// Created once when the resource system starts and passed by handle to every
/// provider and composition primitive. Operations only keep a weak link back
/// to it: once the last `OperationRuntime` clone is dropped the pool is torn
/// down and recycled operations are discarded.
///
/// Everything runs on the thread that owns the runtime. "Asynchronous" means
/// completion deferred to a later [`run_pending`](Self::run_pending) or tick.
#[derive(Debug, Clone)]
pub struct OperationRuntime {
    inner: Rc<RuntimeInner>,
}

impl OperationRuntime {
    /// Creates a runtime with the default pool settings.
    pub fn new() -> Self {
        Self::with_settings(PoolSettings::default())
    }

    /// Creates a runtime with the given pool settings.
    pub fn with_settings(settings: PoolSettings) -> Self {
        log::info!(
            "Operation runtime initialized (pool capacity per type: {})",
            settings.capacity_per_type
        );
        Self {
            inner: Rc::new(RuntimeInner {
                pool: RefCell::new(OperationPool::new(settings)),
                deferred: DeferredQueue::new(),
            }),
        }
    }

    /// Creates a pending leaf operation, reusing a pooled one when available.
    pub fn create<T: Clone + 'static>(&self) -> AsyncOperation<T> {
        let recycled = self.inner.pool.borrow_mut().acquire::<T>();
        let state = recycled.unwrap_or_else(|| {
            Rc::new(RefCell::new(OperationState::new(Rc::downgrade(&self.inner))))
        });
        AsyncOperation::attach(state)
    }

    /// Creates a pending operation whose progress is reported through the
    /// returned tracker.
    pub fn create_tracked<T: Clone + 'static>(&self) -> (AsyncOperation<T>, ProgressTracker) {
        let operation = self.create::<T>();
        let tracker = ProgressTracker::new();
        operation.set_composition(Composition::Tracked(tracker.clone()));
        (operation, tracker)
    }

    /// Queues `action` for the next flush.
    pub fn defer(&self, action: impl FnOnce() + 'static) {
        self.push_deferred(Box::new(action));
    }

    pub(crate) fn push_deferred(&self, action: DeferredAction) {
        self.inner.deferred.push(action);
    }

    /// Runs the deferred actions queued before this call.
    pub fn run_pending(&self) -> usize {
        self.inner.deferred.run_pending()
    }

    /// Flushes the deferred queue until no more work is queued.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Number of queued deferred actions.
    pub fn pending_count(&self) -> usize {
        self.inner.deferred.len()
    }

    /// Number of recycled operations of result type `T` waiting for reuse.
    pub fn pooled_count<T: 'static>(&self) -> usize {
        self.inner.pool.borrow().pooled_count::<T>()
    }

    /// Total number of operations recycled so far.
    pub fn recycled_total(&self) -> u64 {
        self.inner.pool.borrow().recycled_total()
    }
}

impl Default for OperationRuntime {
    fn default() -> Self {
        Self::new()
    }
}
