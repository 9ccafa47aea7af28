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

//! Loads asset bundles from a directory on disk.

use crate::asset_bundle::{AssetBundle, ASSET_BUNDLE_PROVIDER_ID};
use ahash::AHashMap;
use lode_core::{
    AsyncOperation, Context, OperationError, OperationKey, OperationRuntime, Resource,
    ResourceLocation, ResourceProvider,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Reads bundles from files under a root directory. A location's internal id
/// is the bundle's path relative to the root.
///
/// Loaded bundles are cached until released.
pub struct BundleFileProvider {
    root: PathBuf,
    loaded: RefCell<AHashMap<String, Resource>>,
}

impl BundleFileProvider {
    /// Creates a provider reading bundles under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            loaded: RefCell::new(AHashMap::new()),
        }
    }

    /// The directory bundles are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of bundles currently cached.
    pub fn loaded_count(&self) -> usize {
        self.loaded.borrow().len()
    }

    fn read_bundle(&self, id: &str) -> Result<Resource, OperationError> {
        if let Some(resource) = self.loaded.borrow().get(id) {
            return Ok(resource.clone());
        }
        let path = self.root.join(id);
        let bytes = std::fs::read(&path).map_err(|e| OperationError::Provider {
            message: format!("Failed to read bundle from '{:?}': {}", path, e),
        })?;
        log::debug!("Read bundle '{}' ({} bytes)", id, bytes.len());
        let resource: Resource = Rc::new(AssetBundle::from_bytes(id, bytes));
        self.loaded
            .borrow_mut()
            .insert(id.to_string(), resource.clone());
        Ok(resource)
    }
}

impl ResourceProvider for BundleFileProvider {
    fn provider_id(&self) -> &str {
        ASSET_BUNDLE_PROVIDER_ID
    }

    fn provide(
        &self,
        runtime: &OperationRuntime,
        location: &ResourceLocation,
        _dependencies: &[Resource],
    ) -> AsyncOperation<Resource> {
        let context: Context = Rc::new(location.clone());
        let key = Some(OperationKey::from(location.name()));
        match self.read_bundle(location.internal_id()) {
            Ok(resource) => runtime.completed(Some(context), key, Some(resource), None),
            Err(error) => {
                log::error!("{error}");
                runtime.completed(Some(context), key, None, Some(error))
            }
        }
    }

    fn release(&self, location: &ResourceLocation) -> bool {
        self.loaded
            .borrow_mut()
            .remove(location.internal_id())
            .is_some()
    }
}
