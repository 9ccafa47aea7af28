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

//! Asset bundle providers for `lode-core`: a file-backed provider and, with
//! the `simulation` feature, a virtual bundle simulator that models download
//! bandwidth.

#![warn(missing_docs)]

pub mod asset_bundle;
pub mod file_provider;
pub mod settings;
#[cfg(feature = "simulation")]
pub mod simulation;

pub use asset_bundle::{AssetBundle, ASSET_BUNDLE_PROVIDER_ID};
pub use file_provider::BundleFileProvider;
pub use settings::{
    expand_name_variables, BundleMode, SettingsError, VirtualBundleDesc, VirtualBundleSettings,
};
#[cfg(feature = "simulation")]
pub use simulation::{BundleState, VirtualBundleManager, VirtualBundleProvider};

use lode_core::{OperationRuntime, ResourceProvider};
use std::path::Path;
use std::rc::Rc;

/// Picks the asset bundle provider.
///
/// With the `simulation` feature and `settings` present, bundles are served
/// by the virtual bundle simulator. Otherwise they are read from `root`.
pub fn default_bundle_provider(
    runtime: &OperationRuntime,
    root: impl AsRef<Path>,
    settings: Option<VirtualBundleSettings>,
) -> Rc<dyn ResourceProvider> {
    #[cfg(feature = "simulation")]
    {
        let simulated = VirtualBundleManager::create(settings, runtime.clone(), str::to_string);
        if let Some(manager) = simulated {
            return Rc::new(VirtualBundleProvider::new(manager));
        }
    }
    #[cfg(not(feature = "simulation"))]
    let _ = (runtime, settings);

    Rc::new(BundleFileProvider::new(root))
}
