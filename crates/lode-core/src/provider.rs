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

//! The contract between the resource manager and the code that actually
//! produces resources.

use crate::location::ResourceLocation;
use crate::operation::AsyncOperation;
use crate::runtime::OperationRuntime;
use std::any::Any;
use std::rc::Rc;

/// A loaded resource, type-erased so providers of different resource types
/// share one registry. Typed access goes through
/// [`ResourceManager::load`](crate::manager::ResourceManager::load).
pub type Resource = Rc<dyn Any>;

/// Produces resources for the locations that name it.
///
/// Providers are shared behind `Rc` and called with `&self`; a provider that
/// tracks state uses interior mutability.
pub trait ResourceProvider {
    /// The id locations use to select this provider.
    fn provider_id(&self) -> &str;

    /// Whether this provider can load `location`.
    fn can_provide(&self, location: &ResourceLocation) -> bool {
        location.provider_id() == self.provider_id()
    }

    /// Starts loading `location`.
    ///
    /// `dependencies` holds the loaded dependencies of the location, in the
    /// order the location lists them. Failures are reported through the
    /// returned operation, never by panicking.
    fn provide(
        &self,
        runtime: &OperationRuntime,
        location: &ResourceLocation,
        dependencies: &[Resource],
    ) -> AsyncOperation<Resource>;

    /// Releases a resource previously provided for `location`.
    fn release(&self, _location: &ResourceLocation) -> bool {
        false
    }

    /// Advances time-driven work. Called once per tick.
    fn update(&self, _delta_seconds: f32) {}
}
