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

//! The resource type produced by the bundle providers.

/// Provider id shared by the file-backed and the simulated bundle provider,
/// so locations do not change when the simulation layer is switched on.
pub const ASSET_BUNDLE_PROVIDER_ID: &str = "lode.AssetBundleProvider";

/// A loaded asset bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
    /// The bundle name the location resolved to.
    pub name: String,
    /// Size of the bundle in bytes.
    pub size: u64,
    /// Bundle contents. Empty for simulated bundles.
    pub bytes: Vec<u8>,
    /// Whether the bundle came from the bandwidth simulator.
    pub simulated: bool,
}

impl AssetBundle {
    /// A bundle read from storage.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            bytes,
            simulated: false,
        }
    }

    /// A simulated bundle with no contents.
    pub fn simulated(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            bytes: Vec::new(),
            simulated: true,
        }
    }
}
