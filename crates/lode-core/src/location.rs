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

//! Resource locations: where a resource lives and how to load it.

use crate::error::LocationError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

#[derive(Debug)]
struct LocationData {
    name: String,
    internal_id: String,
    provider_id: String,
    dependencies: Vec<ResourceLocation>,
}

/// Describes a loadable resource: its address, the id its provider uses to
/// find the data, the provider that loads it, and the locations that must be
/// loaded first.
///
/// Locations are cheap to clone. Two locations are equal when their internal
/// ids are equal.
#[derive(Debug, Clone)]
pub struct ResourceLocation(Rc<LocationData>);

impl ResourceLocation {
    /// Builds a location.
    ///
    /// # Errors
    /// Fails if `internal_id` or `provider_id` is empty.
    pub fn new(
        name: impl Into<String>,
        internal_id: impl Into<String>,
        provider_id: impl Into<String>,
        dependencies: Vec<ResourceLocation>,
    ) -> Result<Self, LocationError> {
        let name = name.into();
        let internal_id = internal_id.into();
        let provider_id = provider_id.into();
        if internal_id.is_empty() {
            return Err(LocationError::MissingInternalId { name });
        }
        if provider_id.is_empty() {
            return Err(LocationError::MissingProviderId { name });
        }
        Ok(Self(Rc::new(LocationData {
            name,
            internal_id,
            provider_id,
            dependencies,
        })))
    }

    /// The address of the location.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The id the provider uses to find the data, e.g. a path or bundle name.
    pub fn internal_id(&self) -> &str {
        &self.0.internal_id
    }

    /// The id of the provider that loads this location.
    pub fn provider_id(&self) -> &str {
        &self.0.provider_id
    }

    /// Locations that must be loaded before this one, in order.
    pub fn dependencies(&self) -> &[ResourceLocation] {
        &self.0.dependencies
    }

    /// `true` if the location has at least one dependency.
    pub fn has_dependencies(&self) -> bool {
        !self.0.dependencies.is_empty()
    }
}

impl PartialEq for ResourceLocation {
    fn eq(&self, other: &Self) -> bool {
        self.internal_id() == other.internal_id()
    }
}

impl Eq for ResourceLocation {}

impl Hash for ResourceLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.internal_id().hash(state);
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ids_are_rejected() {
        assert_eq!(
            ResourceLocation::new("door", "", "p", Vec::new()).unwrap_err(),
            LocationError::MissingInternalId {
                name: "door".into()
            }
        );
        assert_eq!(
            ResourceLocation::new("door", "door.bundle", "", Vec::new()).unwrap_err(),
            LocationError::MissingProviderId {
                name: "door".into()
            }
        );
    }

    #[test]
    fn equality_uses_the_internal_id() {
        let a = ResourceLocation::new("a", "shared", "p1", Vec::new()).unwrap();
        let b = ResourceLocation::new("b", "shared", "p2", Vec::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "a");
    }

    #[test]
    fn dependencies_keep_their_order() {
        let dep1 = ResourceLocation::new("d1", "d1", "p", Vec::new()).unwrap();
        let dep2 = ResourceLocation::new("d2", "d2", "p", Vec::new()).unwrap();
        let root = ResourceLocation::new("r", "r", "p", vec![dep1.clone(), dep2.clone()]).unwrap();
        assert!(root.has_dependencies());
        assert_eq!(root.dependencies(), &[dep1, dep2]);
        assert!(!root.dependencies()[0].has_dependencies());
    }
}
