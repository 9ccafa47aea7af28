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

//! The resource manager resolves a location's dependency graph and routes
//! every node to the provider that loads it.

use crate::error::OperationError;
use crate::location::ResourceLocation;
use crate::operation::{AsyncOperation, Context, OperationKey};
use crate::provider::{Resource, ResourceProvider};
use crate::runtime::OperationRuntime;
use ahash::AHashMap;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::rc::Rc;

struct ManagerInner {
    runtime: OperationRuntime,
    providers: RefCell<AHashMap<String, Rc<dyn ResourceProvider>>>,
}

/// Entry point for loading resources.
///
/// Cloning the manager is cheap; clones share the same provider registry and
/// runtime.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Rc<ManagerInner>,
}

impl ResourceManager {
    /// Creates a manager with no providers.
    pub fn new(runtime: OperationRuntime) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                runtime,
                providers: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// The runtime operations are created in.
    pub fn runtime(&self) -> &OperationRuntime {
        &self.inner.runtime
    }

    /// Registers `provider` under its provider id, replacing any provider
    /// registered under the same id.
    pub fn register_provider(&self, provider: Rc<dyn ResourceProvider>) {
        let provider_id = provider.provider_id().to_string();
        log::info!("ResourceManager: registering provider '{provider_id}'");
        if self
            .inner
            .providers
            .borrow_mut()
            .insert(provider_id.clone(), provider)
            .is_some()
        {
            log::warn!("ResourceManager: provider '{provider_id}' was replaced");
        }
    }

    /// Looks up a provider by id.
    pub fn provider(&self, provider_id: &str) -> Option<Rc<dyn ResourceProvider>> {
        self.inner.providers.borrow().get(provider_id).cloned()
    }

    fn resolve_provider(&self, location: &ResourceLocation) -> Option<Rc<dyn ResourceProvider>> {
        self.provider(location.provider_id())
            .filter(|provider| provider.can_provide(location))
    }

    /// Loads `location` and everything it depends on.
    ///
    /// Dependencies are loaded in parallel through a group; the location's
    /// own provider is chained after them and receives their results in
    /// order. If a dependency fails the load fails with
    /// [`OperationError::DependencyFailed`].
    pub fn load_erased(&self, location: &ResourceLocation) -> AsyncOperation<Resource> {
        let runtime = &self.inner.runtime;
        let key = Some(OperationKey::from(location.name()));
        let context: Context = Rc::new(location.clone());

        let Some(provider) = self.resolve_provider(location) else {
            log::warn!(
                "ResourceManager: no provider '{}' for location '{}'",
                location.provider_id(),
                location
            );
            let error = OperationError::ProviderNotFound {
                provider_id: location.provider_id().to_string(),
                location: location.to_string(),
            };
            return runtime.completed(Some(context), key, None, Some(error));
        };

        if !location.has_dependencies() {
            let operation = provider.provide(runtime, location, &[]);
            if !operation.is_valid() {
                log::error!(
                    "ResourceManager: provider '{}' returned a recycled operation for '{}'",
                    location.provider_id(),
                    location
                );
                let error = OperationError::InvalidOperation;
                return runtime.completed(Some(context), key, None, Some(error));
            }
            operation.set_key(key);
            return operation;
        }

        log::debug!(
            "ResourceManager: loading {} dependencies of '{}'",
            location.dependencies().len(),
            location
        );
        let manager = self.clone();
        let dependencies = runtime.group(
            key.clone(),
            location.dependencies(),
            None,
            move |dependency| manager.load_erased(dependency),
        );

        let provider_runtime = runtime.clone();
        let target = location.clone();
        runtime.chain(
            Some(context),
            key,
            dependencies,
            move |loaded: Option<Vec<Option<Resource>>>| {
                match loaded.and_then(|slots| slots.into_iter().collect::<Option<Vec<_>>>()) {
                    Some(resolved) => provider.provide(&provider_runtime, &target, &resolved),
                    None => {
                        log::warn!("ResourceManager: a dependency of '{target}' failed to load");
                        let error = OperationError::DependencyFailed {
                            location: target.to_string(),
                        };
                        provider_runtime.completed(None, None, None, Some(error))
                    }
                }
            },
        )
    }

    /// Loads `location` as a `T`.
    ///
    /// Fails with [`OperationError::TypeMismatch`] if the provider produced a
    /// different type.
    pub fn load<T: Any>(&self, location: &ResourceLocation) -> AsyncOperation<Rc<T>> {
        let erased = self.load_erased(location);
        let runtime = self.inner.runtime.clone();
        let target = location.clone();
        self.inner.runtime.chain(
            Some(Rc::new(location.clone())),
            Some(OperationKey::from(location.name())),
            erased,
            move |resource: Option<Resource>| {
                match resource.map(|resource| resource.downcast::<T>()) {
                    Some(Ok(typed)) => runtime.completed(None, None, Some(typed), None),
                    Some(Err(_)) => {
                        let error = OperationError::TypeMismatch {
                            location: target.to_string(),
                            expected: type_name::<T>(),
                        };
                        runtime.completed(None, None, None, Some(error))
                    }
                    None => runtime.completed(None, None, None, None),
                }
            },
        )
    }

    /// Asks the provider of `location` to release what it loaded.
    pub fn release(&self, location: &ResourceLocation) -> bool {
        match self.resolve_provider(location) {
            Some(provider) => provider.release(location),
            None => {
                log::warn!("ResourceManager: cannot release '{location}', no provider");
                false
            }
        }
    }

    /// Ticks every provider, then flushes the deferred queue.
    pub fn update(&self, delta_seconds: f32) {
        let providers: Vec<Rc<dyn ResourceProvider>> =
            self.inner.providers.borrow().values().cloned().collect();
        for provider in providers {
            provider.update(delta_seconds);
        }
        self.inner.runtime.run_pending();
    }
}
