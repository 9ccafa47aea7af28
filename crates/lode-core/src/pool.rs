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

//! The reuse pool that recycled operations are returned to.

use crate::operation::handle::SharedState;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};

/// Configuration of an [`OperationPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// How many recycled operations are kept per result type. Operations
    /// released beyond this are discarded.
    pub capacity_per_type: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity_per_type: 64,
        }
    }
}

/// Keeps recycled operation states, bucketed by result type, so new
/// operations can reuse their allocations.
///
/// The pool is owned by an [`OperationRuntime`](crate::runtime::OperationRuntime);
/// there is no process-wide instance.
#[derive(Debug)]
pub struct OperationPool {
    buckets: AHashMap<TypeId, Box<dyn Any>>,
    capacity_per_type: usize,
    recycled_total: u64,
}

impl OperationPool {
    /// Creates an empty pool.
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            buckets: AHashMap::new(),
            capacity_per_type: settings.capacity_per_type,
            recycled_total: 0,
        }
    }

    fn bucket<T: 'static>(&self) -> Option<&Vec<SharedState<T>>> {
        self.buckets.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub(crate) fn acquire<T: 'static>(&mut self) -> Option<SharedState<T>> {
        let bucket = self
            .buckets
            .get_mut(&TypeId::of::<T>())?
            .downcast_mut::<Vec<SharedState<T>>>()?;
        let state = bucket.pop()?;
        state.borrow_mut().pooled = false;
        Some(state)
    }

    /// Takes a recycled state. Returns `false` if the state is already pooled,
    /// so releasing twice never stores the same state twice.
    pub(crate) fn release<T: 'static>(&mut self, state: SharedState<T>) -> bool {
        {
            let mut inner = state.borrow_mut();
            if inner.pooled {
                log::warn!(
                    "Operation of type {} is already pooled, ignoring release",
                    type_name::<T>()
                );
                return false;
            }
            inner.pooled = true;
        }
        self.recycled_total += 1;

        let capacity = self.capacity_per_type;
        let bucket = self
            .buckets
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<SharedState<T>>::new()));
        let Some(bucket) = bucket.downcast_mut::<Vec<SharedState<T>>>() else {
            log::error!("Mismatched pool bucket for {}", type_name::<T>());
            return false;
        };
        if bucket.len() < capacity {
            bucket.push(state);
        } else {
            log::trace!("Pool full for {}, discarding operation", type_name::<T>());
        }
        true
    }

    /// Number of recycled operations of result type `T` waiting for reuse.
    pub fn pooled_count<T: 'static>(&self) -> usize {
        self.bucket::<T>().map_or(0, Vec::len)
    }

    /// Total number of operations recycled since the pool was created.
    pub fn recycled_total(&self) -> u64 {
        self.recycled_total
    }
}
