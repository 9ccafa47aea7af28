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

use crate::asset_bundle::AssetBundle;
use crate::settings::{BundleMode, VirtualBundleDesc};
use lode_core::{
    AsyncOperation, Context, OperationError, OperationKey, OperationRuntime, ProgressTracker,
    Resource, ResourceLocation,
};
use std::rc::Rc;

/// Load state of a virtual bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    /// Not requested, or unloaded since.
    Unloaded,
    /// Drawing bandwidth until its full size is loaded.
    Loading,
    /// Fully loaded; later requests complete right away.
    Loaded,
}

struct Waiter {
    operation: AsyncOperation<Resource>,
    progress: ProgressTracker,
}

/// Operations to finish once the bundle is no longer borrowed.
pub(crate) enum Settled {
    Loaded(Vec<AsyncOperation<Resource>>, Resource),
    Unloaded(Vec<AsyncOperation<Resource>>, String),
}

impl Settled {
    pub(crate) fn finish(self) {
        match self {
            Settled::Loaded(operations, resource) => {
                for operation in operations.into_iter().filter(AsyncOperation::is_valid) {
                    operation.complete(Some(resource.clone()));
                }
            }
            Settled::Unloaded(operations, id) => {
                for operation in operations.into_iter().filter(AsyncOperation::is_valid) {
                    operation.set_failed(OperationError::Unloaded { id: id.clone() });
                    operation.invoke_completion_event();
                }
            }
        }
    }
}

/// A bundle whose loading time is simulated from its size and the bandwidth
/// it is given each tick.
pub(crate) struct VirtualBundle {
    name: String,
    size: u64,
    mode: BundleMode,
    loaded_bytes: f64,
    state: BundleState,
    started_tick: u64,
    resource: Option<Resource>,
    waiters: Vec<Waiter>,
}

impl VirtualBundle {
    pub(crate) fn new(name: String, desc: &VirtualBundleDesc) -> Self {
        Self {
            name,
            size: desc.size,
            mode: desc.mode,
            loaded_bytes: 0.0,
            state: BundleState::Unloaded,
            started_tick: 0,
            resource: None,
            waiters: Vec::new(),
        }
    }

    pub(crate) fn mode(&self) -> BundleMode {
        self.mode
    }

    pub(crate) fn state(&self) -> BundleState {
        self.state
    }

    pub(crate) fn loaded_bytes(&self) -> f64 {
        self.loaded_bytes
    }

    pub(crate) fn progress(&self) -> f32 {
        match self.state {
            BundleState::Loaded => 1.0,
            _ if self.size == 0 => 0.0,
            _ => (self.loaded_bytes / self.size as f64) as f32,
        }
    }

    /// Starts (or joins) a load of this bundle. `tick` is the last tick the
    /// manager started; a load started during that tick first advances on the
    /// next one.
    pub(crate) fn start_load(
        &mut self,
        runtime: &OperationRuntime,
        location: &ResourceLocation,
        tick: u64,
    ) -> AsyncOperation<Resource> {
        let context: Context = Rc::new(location.clone());
        let key = Some(OperationKey::from(location.name()));
        if let (BundleState::Loaded, Some(resource)) = (self.state, &self.resource) {
            log::debug!("Virtual bundle '{}' is already loaded", self.name);
            return runtime.completed(Some(context), key, Some(resource.clone()), None);
        }

        if self.state == BundleState::Unloaded {
            log::debug!(
                "Virtual bundle '{}' starts loading ({} bytes, {:?})",
                self.name,
                self.size,
                self.mode
            );
            self.state = BundleState::Loading;
            self.loaded_bytes = 0.0;
            self.started_tick = tick;
        }
        let (operation, progress) = runtime.create_tracked::<Resource>();
        operation.start(Some(context), key);
        progress.set(self.progress());
        self.waiters.push(Waiter {
            operation: operation.clone(),
            progress,
        });
        operation
    }

    /// Adds this bundle's load to the per-class counters.
    pub(crate) fn count_bandwidth_usage(&self, local: &mut u32, remote: &mut u32) {
        if self.state != BundleState::Loading {
            return;
        }
        match self.mode {
            BundleMode::Local => *local += 1,
            BundleMode::Remote => *remote += 1,
        }
    }

    /// Advances the load by `bandwidth * delta_seconds` bytes during `tick`.
    ///
    /// Loads started during `tick` itself are left untouched. Returns the
    /// operations to complete when the bundle finished loading.
    pub(crate) fn advance(
        &mut self,
        bandwidth: f64,
        delta_seconds: f64,
        tick: u64,
    ) -> Option<Settled> {
        if self.state != BundleState::Loading || self.started_tick >= tick {
            return None;
        }
        let size = self.size as f64;
        self.loaded_bytes = (self.loaded_bytes + bandwidth * delta_seconds).min(size);
        if self.loaded_bytes < size {
            let progress = self.progress();
            for waiter in &self.waiters {
                waiter.progress.set(progress);
            }
            return None;
        }

        log::debug!("Virtual bundle '{}' finished loading", self.name);
        self.state = BundleState::Loaded;
        let resource: Resource = Rc::new(AssetBundle::simulated(self.name.clone(), self.size));
        self.resource = Some(resource.clone());
        let operations = self
            .waiters
            .drain(..)
            .map(|waiter| {
                waiter.progress.set(1.0);
                waiter.operation
            })
            .collect();
        Some(Settled::Loaded(operations, resource))
    }

    /// Drops the bundle's data. Loads still in flight are failed.
    ///
    /// Returns whether the bundle was loaded or loading.
    pub(crate) fn unload(&mut self) -> (bool, Option<Settled>) {
        let was_active = self.state != BundleState::Unloaded;
        self.state = BundleState::Unloaded;
        self.loaded_bytes = 0.0;
        self.resource = None;
        if self.waiters.is_empty() {
            return (was_active, None);
        }
        log::warn!(
            "Virtual bundle '{}' unloaded with {} loads in flight",
            self.name,
            self.waiters.len()
        );
        let operations = self
            .waiters
            .drain(..)
            .map(|waiter| waiter.operation)
            .collect();
        (
            was_active,
            Some(Settled::Unloaded(operations, self.name.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::OperationStatus;

    fn bundle(size: u64) -> VirtualBundle {
        VirtualBundle::new(
            "ui".into(),
            &VirtualBundleDesc {
                name: "ui".into(),
                size,
                mode: BundleMode::Local,
            },
        )
    }

    fn location() -> ResourceLocation {
        ResourceLocation::new("ui", "ui", "test", Vec::new()).unwrap()
    }

    #[test]
    fn advances_until_full_size() {
        let runtime = OperationRuntime::new();
        let mut bundle = bundle(100);
        let op = bundle.start_load(&runtime, &location(), 0).retain();

        assert!(bundle.advance(40.0, 1.0, 1).is_none());
        assert!((op.percent_complete() - 0.4).abs() < 1e-6);

        let settled = bundle.advance(100.0, 1.0, 2).expect("bundle should finish");
        assert_eq!(bundle.loaded_bytes(), 100.0);
        settled.finish();
        assert_eq!(op.status(), OperationStatus::Succeeded);
        let resource = op.result().unwrap();
        let loaded = resource.downcast_ref::<AssetBundle>().unwrap();
        assert!(loaded.simulated);
        assert_eq!(loaded.size, 100);
        op.release();
    }

    #[test]
    fn load_started_during_a_tick_waits_for_the_next() {
        let runtime = OperationRuntime::new();
        let mut bundle = bundle(100);
        bundle.start_load(&runtime, &location(), 3);

        assert!(bundle.advance(50.0, 1.0, 3).is_none());
        assert_eq!(bundle.loaded_bytes(), 0.0);
        assert!(bundle.advance(50.0, 1.0, 4).is_none());
        assert_eq!(bundle.loaded_bytes(), 50.0);
    }

    #[test]
    fn only_loading_bundles_use_bandwidth() {
        let runtime = OperationRuntime::new();
        let mut bundle = bundle(10);
        let (mut local, mut remote) = (0, 0);
        bundle.count_bandwidth_usage(&mut local, &mut remote);
        assert_eq!(local, 0);

        bundle.start_load(&runtime, &location(), 0);
        bundle.count_bandwidth_usage(&mut local, &mut remote);
        assert_eq!((local, remote), (1, 0));

        if let Some(settled) = bundle.advance(10.0, 1.0, 1) {
            settled.finish();
        }
        bundle.count_bandwidth_usage(&mut local, &mut remote);
        assert_eq!((local, remote), (1, 0));
    }

    #[test]
    fn unloading_fails_loads_in_flight() {
        let runtime = OperationRuntime::new();
        let mut bundle = bundle(10);
        let op = bundle.start_load(&runtime, &location(), 0).retain();

        let (was_active, settled) = bundle.unload();
        assert!(was_active);
        settled.expect("a load was in flight").finish();
        assert_eq!(op.error(), Some(OperationError::Unloaded { id: "ui".into() }));
        assert_eq!(bundle.state(), BundleState::Unloaded);
        op.release();
    }
}
