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

use super::manager::VirtualBundleManager;
use crate::asset_bundle::ASSET_BUNDLE_PROVIDER_ID;
use lode_core::{AsyncOperation, OperationRuntime, Resource, ResourceLocation, ResourceProvider};

/// Serves asset bundles from the [`VirtualBundleManager`].
pub struct VirtualBundleProvider {
    manager: VirtualBundleManager,
}

impl VirtualBundleProvider {
    /// Wraps `manager`; ticking the provider ticks the simulation.
    pub fn new(manager: VirtualBundleManager) -> Self {
        Self { manager }
    }

    /// The simulation this provider loads from.
    pub fn manager(&self) -> &VirtualBundleManager {
        &self.manager
    }
}

impl ResourceProvider for VirtualBundleProvider {
    fn provider_id(&self) -> &str {
        ASSET_BUNDLE_PROVIDER_ID
    }

    fn provide(
        &self,
        _runtime: &OperationRuntime,
        location: &ResourceLocation,
        _dependencies: &[Resource],
    ) -> AsyncOperation<Resource> {
        self.manager.load_async(location)
    }

    fn release(&self, location: &ResourceLocation) -> bool {
        self.manager.unload(location)
    }

    fn update(&self, delta_seconds: f32) {
        self.manager.update(delta_seconds);
    }
}
