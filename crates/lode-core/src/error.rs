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

//! Error types carried by operation handles and location construction.

use thiserror::Error;

/// The error channel of an operation.
///
/// Failures inside the operation graph never unwind across operation
/// boundaries: they are stored on the handle as a terminal `Failed` status plus
/// one of these values. The type is `Clone` so composite operations can copy a
/// child's error onto themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// A handle was used after it had been recycled into the pool.
    #[error("invalid operation state: handle used after release")]
    InvalidOperation,
    /// A location or bundle identifier could not be resolved.
    #[error("unknown resource '{id}'")]
    UnknownResource {
        /// The identifier that failed to resolve.
        id: String,
    },
    /// No provider is registered under the id a location asks for.
    #[error("no provider '{provider_id}' registered for location '{location}'")]
    ProviderNotFound {
        /// The provider id requested by the location.
        provider_id: String,
        /// The location's display name.
        location: String,
    },
    /// A completion callback returned an error or panicked.
    #[error("completion callback failed: {message}")]
    CallbackFault {
        /// The rendered error or panic payload.
        message: String,
    },
    /// The operation completed without producing a result.
    #[error("operation completed without a result")]
    NullResult,
    /// A dependency of a location failed to load.
    #[error("dependency of '{location}' failed to load")]
    DependencyFailed {
        /// The location whose dependency failed.
        location: String,
    },
    /// The resource was unloaded while its load was still in flight.
    #[error("resource '{id}' was unloaded before its load completed")]
    Unloaded {
        /// The identifier of the unloaded resource.
        id: String,
    },
    /// A provider returned a resource of a different type than requested.
    #[error("resource at '{location}' is not a {expected}")]
    TypeMismatch {
        /// The location's display name.
        location: String,
        /// The requested type name.
        expected: &'static str,
    },
    /// A provider-specific failure, such as an I/O error.
    #[error("provider error: {message}")]
    Provider {
        /// A description of the failure.
        message: String,
    },
}

/// Raised when a [`ResourceLocation`](crate::location::ResourceLocation) is built
/// from malformed input. This is a programmer error and is reported immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The internal id was empty.
    #[error("location '{name}' has no internal id")]
    MissingInternalId {
        /// The name of the location being built.
        name: String,
    },
    /// The provider id was empty.
    #[error("location '{name}' has no provider id")]
    MissingProviderId {
        /// The name of the location being built.
        name: String,
    },
}
