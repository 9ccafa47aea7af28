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

//! Configuration of the virtual bundle simulator.
//!
//! Settings are stored as RON:
//!
//! ```ron
//! (
//!     local_load_speed: 10485760,
//!     remote_load_speed: 102400,
//!     bundles: [
//!         (name: "{Platform}/characters", size: 4194304, mode: Remote),
//!         (name: "{Platform}/ui", size: 65536),
//!     ],
//! )
//! ```

use ahash::AHashMap;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Where a virtual bundle is loaded from. Decides which bandwidth pool it
/// draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundleMode {
    /// Bundle shipped with the application.
    #[default]
    Local,
    /// Bundle fetched over the network.
    Remote,
}

/// One bundle known to the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualBundleDesc {
    /// Bundle name, possibly containing `{Variable}` placeholders.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Bandwidth pool the bundle draws from. Defaults to local.
    #[serde(default)]
    pub mode: BundleMode,
}

/// Errors found while validating [`VirtualBundleSettings`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// Two bundles share a name.
    #[error("virtual bundle '{name}' is declared more than once")]
    DuplicateBundle {
        /// The repeated name.
        name: String,
    },
    /// A bandwidth pool has no bandwidth.
    #[error("{mode:?} load speed must be greater than zero")]
    ZeroSpeed {
        /// The pool with a zero speed.
        mode: BundleMode,
    },
}

/// Bandwidth and bundle table of the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualBundleSettings {
    /// Bytes per second shared by all local loads.
    pub local_load_speed: u64,
    /// Bytes per second shared by all remote loads.
    pub remote_load_speed: u64,
    /// Bundles known to the simulator.
    pub bundles: Vec<VirtualBundleDesc>,
}

impl Default for VirtualBundleSettings {
    fn default() -> Self {
        Self {
            local_load_speed: Self::DEFAULT_LOCAL_LOAD_SPEED,
            remote_load_speed: Self::DEFAULT_REMOTE_LOAD_SPEED,
            bundles: Vec::new(),
        }
    }
}

impl VirtualBundleSettings {
    /// 10 MiB per second.
    pub const DEFAULT_LOCAL_LOAD_SPEED: u64 = 10 * 1024 * 1024;
    /// 100 KiB per second.
    pub const DEFAULT_REMOTE_LOAD_SPEED: u64 = 100 * 1024;

    /// Parses and validates settings from RON text.
    pub fn from_ron_str(text: &str) -> anyhow::Result<Self> {
        let settings: Self =
            ron::from_str(text).context("Failed to parse virtual bundle settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist, which leaves the
    /// simulation layer disabled.
    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No virtual bundle settings at {:?}", path);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read settings file {:?}", path))
            }
        };
        let settings = Self::from_ron_str(&text).with_context(|| format!("In {:?}", path))?;
        log::info!(
            "Loaded {} virtual bundles from {:?}",
            settings.bundles.len(),
            path
        );
        Ok(Some(settings))
    }

    /// Writes the settings to `path` as pretty-printed RON.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize virtual bundle settings")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
    }

    /// Checks speeds are non-zero and bundle names are unique.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.local_load_speed == 0 {
            return Err(SettingsError::ZeroSpeed {
                mode: BundleMode::Local,
            });
        }
        if self.remote_load_speed == 0 {
            return Err(SettingsError::ZeroSpeed {
                mode: BundleMode::Remote,
            });
        }
        let mut seen = ahash::AHashSet::with_capacity(self.bundles.len());
        for bundle in &self.bundles {
            if !seen.insert(bundle.name.as_str()) {
                return Err(SettingsError::DuplicateBundle {
                    name: bundle.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load speed of the given bandwidth pool.
    pub fn speed_of(&self, mode: BundleMode) -> u64 {
        match mode {
            BundleMode::Local => self.local_load_speed,
            BundleMode::Remote => self.remote_load_speed,
        }
    }
}

/// Replaces every `{Name}` in `name` with its value from `variables`.
///
/// Unknown variables and unmatched braces are kept as written.
pub fn expand_name_variables(name: &str, variables: &AHashMap<String, String>) -> String {
    let mut expanded = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find('}') {
            Some(close) => {
                let variable = &tail[1..close];
                match variables.get(variable) {
                    Some(value) => expanded.push_str(value),
                    None => expanded.push_str(&tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                expanded.push_str(tail);
                rest = "";
            }
        }
    }
    expanded.push_str(rest);
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables() -> AHashMap<String, String> {
        let mut variables = AHashMap::new();
        variables.insert("Platform".to_string(), "linux".to_string());
        variables
    }

    #[test]
    fn expands_known_variables() {
        assert_eq!(
            expand_name_variables("{Platform}/ui", &variables()),
            "linux/ui"
        );
    }

    #[test]
    fn keeps_unknown_variables_and_stray_braces() {
        assert_eq!(
            expand_name_variables("{Build}/{Platform}/a{b", &variables()),
            "{Build}/linux/a{b"
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings = VirtualBundleSettings::from_ron_str("(bundles: [(name: \"ui\", size: 10)])")
            .unwrap();
        assert_eq!(
            settings.local_load_speed,
            VirtualBundleSettings::DEFAULT_LOCAL_LOAD_SPEED
        );
        assert_eq!(
            settings.remote_load_speed,
            VirtualBundleSettings::DEFAULT_REMOTE_LOAD_SPEED
        );
        assert_eq!(settings.bundles[0].mode, BundleMode::Local);
    }

    #[test]
    fn rejects_duplicate_bundles() {
        let settings = VirtualBundleSettings {
            bundles: vec![
                VirtualBundleDesc {
                    name: "ui".into(),
                    size: 1,
                    mode: BundleMode::Local,
                },
                VirtualBundleDesc {
                    name: "ui".into(),
                    size: 2,
                    mode: BundleMode::Remote,
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::DuplicateBundle { name: "ui".into() })
        );
    }

    #[test]
    fn rejects_zero_speed() {
        let result = VirtualBundleSettings::from_ron_str("(remote_load_speed: 0)");
        assert!(result.is_err());
    }
}
