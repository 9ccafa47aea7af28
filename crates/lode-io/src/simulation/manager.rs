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

//! Shares a fixed local and remote bandwidth between the bundles currently
//! loading.

use super::virtual_bundle::{BundleState, Settled, VirtualBundle};
use crate::settings::{BundleMode, VirtualBundleSettings};
use ahash::AHashMap;
use lode_core::{
    AsyncOperation, Context, OperationError, OperationKey, OperationRuntime, Resource,
    ResourceLocation,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

type SharedBundle = Rc<RefCell<VirtualBundle>>;

enum PendingChange {
    Activate(String, SharedBundle),
    Deactivate(String),
}

struct ManagerInner {
    runtime: OperationRuntime,
    local_load_speed: f64,
    remote_load_speed: f64,
    bundles: AHashMap<String, SharedBundle>,
    active: RefCell<BTreeMap<String, SharedBundle>>,
    pending: RefCell<Vec<PendingChange>>,
    updating: Cell<bool>,
    tick: Cell<u64>,
}

/// Simulates bundle downloads so loading code can be exercised with
/// realistic timings without building real bundles.
///
/// Each [`update`](Self::update) runs four phases:
/// 1. count the loading bundles of each bandwidth class,
/// 2. split each class's speed equally between its loads,
/// 3. advance every load, completing the ones that reached full size,
/// 4. apply the loads and unloads requested during phase 3.
///
/// Cloning the manager is cheap; clones drive the same simulation.
#[derive(Clone)]
pub struct VirtualBundleManager {
    inner: Rc<ManagerInner>,
}

impl VirtualBundleManager {
    /// Builds a manager from `settings`.
    ///
    /// Returns `None` when no settings are available, which disables the
    /// simulation layer. `name_converter` expands variables in the configured
    /// bundle names; locations address bundles by the expanded name.
    pub fn create(
        settings: Option<VirtualBundleSettings>,
        runtime: OperationRuntime,
        name_converter: impl Fn(&str) -> String,
    ) -> Option<Self> {
        let Some(settings) = settings else {
            log::info!("Virtual bundle simulation disabled: no settings");
            return None;
        };

        let mut bundles = AHashMap::with_capacity(settings.bundles.len());
        for desc in &settings.bundles {
            let name = name_converter(&desc.name);
            if bundles.contains_key(&name) {
                log::warn!("Virtual bundle '{name}' is declared twice, keeping the first");
                continue;
            }
            let bundle = Rc::new(RefCell::new(VirtualBundle::new(name.clone(), desc)));
            bundles.insert(name, bundle);
        }
        log::info!(
            "Virtual bundle simulation enabled: {} bundles, local {} B/s, remote {} B/s",
            bundles.len(),
            settings.local_load_speed,
            settings.remote_load_speed
        );

        Some(Self {
            inner: Rc::new(ManagerInner {
                runtime,
                local_load_speed: settings.speed_of(BundleMode::Local) as f64,
                remote_load_speed: settings.speed_of(BundleMode::Remote) as f64,
                bundles,
                active: RefCell::new(BTreeMap::new()),
                pending: RefCell::new(Vec::new()),
                updating: Cell::new(false),
                tick: Cell::new(0),
            }),
        })
    }

    /// The runtime the manager creates operations in.
    pub fn runtime(&self) -> &OperationRuntime {
        &self.inner.runtime
    }

    /// Starts loading the bundle named by `location`'s internal id.
    ///
    /// Unknown bundles yield an operation that fails with
    /// [`OperationError::UnknownResource`]. A bundle that is already loaded
    /// completes on the next flush.
    pub fn load_async(&self, location: &ResourceLocation) -> AsyncOperation<Resource> {
        let id = location.internal_id();
        let Some(bundle) = self.inner.bundles.get(id) else {
            log::error!("Unable to load virtual bundle '{location}': unknown bundle");
            let context: Context = Rc::new(location.clone());
            let error = OperationError::UnknownResource { id: id.to_string() };
            return self.inner.runtime.completed(
                Some(context),
                Some(OperationKey::from(location.name())),
                None,
                Some(error),
            );
        };

        if self.inner.updating.get() {
            self.inner
                .pending
                .borrow_mut()
                .push(PendingChange::Activate(id.to_string(), bundle.clone()));
        } else {
            self.inner
                .active
                .borrow_mut()
                .insert(id.to_string(), bundle.clone());
        }
        bundle
            .borrow_mut()
            .start_load(&self.inner.runtime, location, self.inner.tick.get())
    }

    /// Unloads the bundle named by `location`'s internal id.
    ///
    /// Returns whether the bundle was loaded or loading. Unknown bundles log
    /// a warning and return `false`.
    pub fn unload(&self, location: &ResourceLocation) -> bool {
        let id = location.internal_id();
        let Some(bundle) = self.inner.bundles.get(id) else {
            log::warn!("Unable to unload virtual bundle '{location}': unknown bundle");
            return false;
        };

        if self.inner.updating.get() {
            self.inner
                .pending
                .borrow_mut()
                .push(PendingChange::Deactivate(id.to_string()));
        } else {
            self.inner.active.borrow_mut().remove(id);
        }
        let (was_active, settled) = bundle.borrow_mut().unload();
        if let Some(settled) = settled {
            settled.finish();
        }
        was_active
    }

    /// Advances every active load by `delta_seconds`.
    ///
    /// A negative or non-finite delta is treated as zero, so progress never
    /// goes backwards.
    pub fn update(&self, delta_seconds: f32) {
        let delta_seconds = if delta_seconds.is_finite() && delta_seconds >= 0.0 {
            f64::from(delta_seconds)
        } else {
            log::warn!("Virtual bundle tick with invalid delta {delta_seconds}, using 0");
            0.0
        };
        let tick = self.inner.tick.get() + 1;
        self.inner.tick.set(tick);

        let snapshot: Vec<SharedBundle> = self.inner.active.borrow().values().cloned().collect();

        let (mut local, mut remote) = (0u32, 0u32);
        for bundle in &snapshot {
            bundle
                .borrow()
                .count_bandwidth_usage(&mut local, &mut remote);
        }

        let local_share = self.inner.local_load_speed / f64::from(local.max(1));
        let remote_share = self.inner.remote_load_speed / f64::from(remote.max(1));
        log::trace!(
            "Virtual bundle tick {tick}: {local} local loads at {local_share:.1} B/s, \
             {remote} remote loads at {remote_share:.1} B/s"
        );

        self.inner.updating.set(true);
        for bundle in &snapshot {
            let settled = {
                let mut bundle = bundle.borrow_mut();
                let share = match bundle.mode() {
                    BundleMode::Local => local_share,
                    BundleMode::Remote => remote_share,
                };
                bundle.advance(share, delta_seconds, tick)
            };
            if let Some(settled) = settled {
                settled.finish();
            }
        }
        self.inner.updating.set(false);

        self.apply_pending_changes();
    }

    fn apply_pending_changes(&self) {
        let changes = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if changes.is_empty() {
            return;
        }
        let mut active = self.inner.active.borrow_mut();
        for change in changes {
            match change {
                PendingChange::Activate(id, bundle) => {
                    active.insert(id, bundle);
                }
                PendingChange::Deactivate(id) => {
                    active.remove(&id);
                }
            }
        }
    }

    /// Number of bundles taking part in the simulation.
    pub fn active_count(&self) -> usize {
        self.inner.active.borrow().len()
    }

    /// Number of loads and unloads waiting for the end of the current tick.
    pub fn pending_change_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Whether `id` names a configured bundle.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.bundles.contains_key(id)
    }

    /// State of the bundle `id`, if it is configured.
    pub fn bundle_state(&self, id: &str) -> Option<BundleState> {
        self.inner.bundles.get(id).map(|bundle| bundle.borrow().state())
    }

    /// Bytes loaded so far for the bundle `id`.
    pub fn loaded_bytes(&self, id: &str) -> Option<f64> {
        self.inner
            .bundles
            .get(id)
            .map(|bundle| bundle.borrow().loaded_bytes())
    }

    /// Load progress of the bundle `id` in `[0, 1]`.
    pub fn bundle_progress(&self, id: &str) -> Option<f32> {
        self.inner
            .bundles
            .get(id)
            .map(|bundle| bundle.borrow().progress())
    }
}
