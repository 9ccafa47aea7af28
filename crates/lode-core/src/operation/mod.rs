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

//! The operation handle abstraction.
//!
//! An operation represents a possibly-pending result. It is created by a
//! provider or a composition primitive, started, completed exactly once, and
//! finally recycled into the runtime's reuse pool. Handles carry the generation
//! of the state they were issued for, so a handle kept past its release turns
//! into a fail-fast invalid handle instead of silently observing a reused state.
//!
//! Two views exist over the same state:
//! - [`AsyncOperation<T>`]: the typed handle used by callers and providers.
//! - [`Operation`]: the untyped contract used to compose operations of
//!   different result types (a chain's dependency, a group's children).

pub(crate) mod handle;
mod progress;

pub use handle::*;
pub use progress::ProgressTracker;

use crate::error::OperationError;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Opaque, caller-defined data attached to an operation.
pub type Context = Rc<dyn Any>;

/// The result of a completion callback. An `Err` is converted into a
/// [`OperationError::CallbackFault`] on the operation that dispatched it.
pub type CallbackResult = anyhow::Result<()>;

/// The completion state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationStatus {
    /// Still pending.
    #[default]
    None,
    /// Completed with a result.
    Succeeded,
    /// Completed with an error.
    Failed,
}

/// Identifies the operation a handle was issued for.
///
/// Two handles compare equal only if they point at the same state *and* were
/// issued for the same reuse cycle of that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId {
    address: usize,
    generation: u64,
}

/// Returned by completion subscriptions; used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returned when subscribing on an invalid handle.
    pub const INVALID: SubscriptionId = SubscriptionId(0);
}

/// The identifier an operation was requested under, usually a location's
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey(Rc<str>);

impl OperationKey {
    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationKey {
    fn from(value: &str) -> Self {
        Self(Rc::from(value))
    }
}

impl From<String> for OperationKey {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An untyped completion callback.
pub type UntypedCallback = Box<dyn FnOnce(&dyn Operation) -> CallbackResult>;

/// The common contract of every operation, independent of its result type.
///
/// Composition primitives hold their children through this trait so that a
/// chain can depend on any operation variant and a group can aggregate
/// progress uniformly.
pub trait Operation {
    /// Identity of the operation this handle was issued for.
    fn id(&self) -> OperationId;
    /// `false` once the operation has been recycled. Never logs.
    fn is_valid(&self) -> bool;
    /// The current status.
    fn status(&self) -> OperationStatus;
    /// Whether the operation reached a terminal state.
    fn is_done(&self) -> bool;
    /// Progress in `[0, 1]`.
    fn percent_complete(&self) -> f32;
    /// The captured error, if the operation failed.
    fn error(&self) -> Option<OperationError>;
    /// The attached context.
    fn context(&self) -> Option<Context>;
    /// The key the operation was requested under.
    fn key(&self) -> Option<OperationKey>;
    /// Replaces the key, propagating it to pending children.
    fn set_key(&self, key: Option<OperationKey>);
    /// A type-erased copy of the result.
    fn result_any(&self) -> Option<Box<dyn Any>>;
    /// Registers an untyped completion callback.
    fn on_completed_untyped(&self, callback: UntypedCallback) -> SubscriptionId;
    /// Removes a pending completion callback.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
    /// Takes ownership of the operation; it will not be recycled on completion.
    fn retain_untyped(&self);
    /// Gives the operation back; it is recycled once done.
    fn release(&self);
    /// Clones the handle behind a new box.
    fn boxed_clone(&self) -> Box<dyn Operation>;
}

/// Progress of an operation that may already have been recycled.
///
/// Children are released as soon as they complete, so a recycled child counts
/// as finished.
pub(crate) fn settled_progress(operation: &dyn Operation) -> f32 {
    if operation.is_valid() {
        operation.percent_complete()
    } else {
        1.0
    }
}
