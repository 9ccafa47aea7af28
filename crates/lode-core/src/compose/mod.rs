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

//! Composition primitives built on top of [`AsyncOperation`](crate::operation::AsyncOperation).
//!
//! - [`completed`](crate::runtime::OperationRuntime::completed): an operation
//!   whose result is known up front.
//! - [`chain`](crate::runtime::OperationRuntime::chain): runs a continuation
//!   on the result of a dependency.
//! - [`group`](crate::runtime::OperationRuntime::group): fans out over a list
//!   of locations and fans the results back in, positionally.

mod chain;
mod completed;
mod group;

pub use group::GroupCallback;
