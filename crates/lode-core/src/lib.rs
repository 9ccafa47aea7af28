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

//! # Lode Core
//!
//! The operation engine of the Lode resource system: composable handles to
//! possibly-pending results, the pool they are recycled into, and the
//! primitives that chain and group them.
//!
//! Everything is single-threaded and cooperative. An operation is completed
//! either inline by its provider or on a later tick, never on another thread;
//! reentrancy (a callback releasing its own operation, a load requested from
//! inside a completion callback) is the hazard the API is built around.

#![warn(missing_docs)]

pub mod compose;
pub mod deferred;
pub mod error;
pub mod location;
pub mod manager;
pub mod operation;
pub mod pool;
pub mod provider;
pub mod runtime;

pub use error::{LocationError, OperationError};
pub use location::ResourceLocation;
pub use manager::ResourceManager;
pub use operation::{
    AsyncOperation, CallbackResult, Context, Operation, OperationKey, OperationStatus,
    ProgressTracker, SubscriptionId,
};
pub use pool::PoolSettings;
pub use provider::{Resource, ResourceProvider};
pub use runtime::OperationRuntime;
