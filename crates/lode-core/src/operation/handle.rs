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

use super::{
    settled_progress, CallbackResult, Context, Operation, OperationId, OperationKey,
    OperationStatus, ProgressTracker, SubscriptionId, UntypedCallback,
};
use crate::error::OperationError;
use crate::runtime::RuntimeInner;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// A typed completion callback.
pub type TypedCallback<T> = Box<dyn FnOnce(&AsyncOperation<T>) -> CallbackResult>;

enum Callback<T: 'static> {
    Typed(TypedCallback<T>),
    Untyped(UntypedCallback),
}

/// How an operation derives its progress and completion.
pub(crate) enum Composition {
    /// Done once a status is set; progress is 0 or 1.
    Leaf,
    /// Progress is reported by an external producer.
    Tracked(ProgressTracker),
    /// Two-phase progress over a dependency and the operation derived from it.
    Chain {
        dependency: Option<Box<dyn Operation>>,
        dependent: Option<Box<dyn Operation>>,
    },
    /// Done once every child reported in, whatever their status.
    Group {
        children: Vec<Box<dyn Operation>>,
        completed: usize,
    },
}

/// Children snapshot taken so progress can be computed without holding a borrow.
enum ProgressView {
    Chain {
        dependency: Option<Box<dyn Operation>>,
        dependent: Option<Box<dyn Operation>>,
    },
    Group(Vec<Box<dyn Operation>>),
}

pub(crate) type SharedState<T> = Rc<RefCell<OperationState<T>>>;

type Detached<T> = (Option<T>, Option<Context>, Vec<(SubscriptionId, Callback<T>)>, Composition);

pub(crate) struct OperationState<T: 'static> {
    pub(crate) generation: u64,
    pub(crate) pooled: bool,
    pub(crate) status: OperationStatus,
    pub(crate) result: Option<T>,
    pub(crate) error: Option<OperationError>,
    pub(crate) context: Option<Context>,
    pub(crate) key: Option<OperationKey>,
    pub(crate) composition: Composition,
    release_on_completion: bool,
    inside_completion_event: bool,
    completion_dispatched: bool,
    callbacks: Vec<(SubscriptionId, Callback<T>)>,
    next_subscription: u64,
    runtime: Weak<RuntimeInner>,
}

impl<T: 'static> OperationState<T> {
    pub(crate) fn new(runtime: Weak<RuntimeInner>) -> Self {
        Self {
            generation: 0,
            pooled: false,
            status: OperationStatus::None,
            result: None,
            error: None,
            context: None,
            key: None,
            composition: Composition::Leaf,
            release_on_completion: true,
            inside_completion_event: false,
            completion_dispatched: false,
            callbacks: Vec::new(),
            next_subscription: 1,
            runtime,
        }
    }

    fn is_done(&self) -> bool {
        match &self.composition {
            Composition::Group {
                children,
                completed,
            } => *completed == children.len(),
            _ => self.status != OperationStatus::None,
        }
    }

    /// Clears the operation for reuse. The returned values are dropped by the
    /// caller once the borrow on the state has been released.
    fn reset(&mut self) -> Detached<T> {
        self.status = OperationStatus::None;
        self.error = None;
        self.key = None;
        self.release_on_completion = true;
        self.completion_dispatched = false;
        (
            self.result.take(),
            self.context.take(),
            mem::take(&mut self.callbacks),
            mem::replace(&mut self.composition, Composition::Leaf),
        )
    }
}

/// A handle to a possibly-pending result of type `T`.
///
/// Cloning a handle is cheap and does not create a new operation. The handle
/// stays valid until the operation is recycled; after that every accessor logs
/// an error and returns a neutral default (`None`, `0.0`, `false`).
///
/// # Ownership
///
/// By default an operation recycles itself right after its completion
/// callbacks ran. A caller that wants to read the result later calls
/// [`retain`](Self::retain) and must then call [`release`](Self::release)
/// exactly once.
pub struct AsyncOperation<T: 'static> {
    state: SharedState<T>,
    generation: u64,
}

impl<T: 'static> Clone for AsyncOperation<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            generation: self.generation,
        }
    }
}

impl<T: 'static> AsyncOperation<T> {
    pub(crate) fn attach(state: SharedState<T>) -> Self {
        let generation = state.borrow().generation;
        Self { state, generation }
    }

    pub(crate) fn shared_state(&self) -> &SharedState<T> {
        &self.state
    }
}

impl<T: Clone + 'static> AsyncOperation<T> {
    /// Identity of the operation this handle was issued for.
    pub fn id(&self) -> OperationId {
        OperationId {
            address: Rc::as_ptr(&self.state) as *const () as usize,
            generation: self.generation,
        }
    }

    /// `false` once the operation has been recycled.
    pub fn is_valid(&self) -> bool {
        let state = self.state.borrow();
        !state.pooled && state.generation == self.generation
    }

    fn validate(&self) -> bool {
        if self.is_valid() {
            true
        } else {
            log::error!("INVALID OPERATION STATE: {self}");
            false
        }
    }

    /// Assigns the context and key of a freshly created operation.
    pub fn start(&self, context: Option<Context>, key: Option<OperationKey>) -> &Self {
        if self.validate() {
            let mut state = self.state.borrow_mut();
            state.context = context;
            state.key = key;
        }
        self
    }

    /// The current status.
    pub fn status(&self) -> OperationStatus {
        if !self.validate() {
            return OperationStatus::None;
        }
        self.state.borrow().status
    }

    /// A copy of the result. Only meaningful once the operation is done.
    pub fn result(&self) -> Option<T> {
        if !self.validate() {
            return None;
        }
        self.state.borrow().result.clone()
    }

    /// The error captured when the operation failed.
    pub fn error(&self) -> Option<OperationError> {
        if !self.validate() {
            return None;
        }
        self.state.borrow().error.clone()
    }

    /// The attached context.
    pub fn context(&self) -> Option<Context> {
        if !self.validate() {
            return None;
        }
        self.state.borrow().context.clone()
    }

    pub(crate) fn set_context(&self, context: Option<Context>) {
        if self.validate() {
            self.state.borrow_mut().context = context;
        }
    }

    /// The key the operation was requested under.
    pub fn key(&self) -> Option<OperationKey> {
        if !self.validate() {
            return None;
        }
        self.state.borrow().key.clone()
    }

    /// Replaces the key.
    ///
    /// A chain forwards the key to its dependency while the dependency is still
    /// pending; a group forwards it to all of its children.
    pub fn set_key(&self, key: Option<OperationKey>) {
        if !self.validate() {
            return;
        }
        let targets: Vec<Box<dyn Operation>> = {
            let mut state = self.state.borrow_mut();
            state.key = key.clone();
            match &state.composition {
                Composition::Chain {
                    dependency: Some(dependency),
                    ..
                } => vec![dependency.boxed_clone()],
                Composition::Group { children, .. } => {
                    children.iter().map(|child| child.boxed_clone()).collect()
                }
                _ => Vec::new(),
            }
        };
        for target in targets.into_iter().filter(|target| target.is_valid()) {
            target.set_key(key.clone());
        }
    }

    /// Whether the operation reached a terminal state.
    ///
    /// Groups are done once every child reported in, regardless of failures.
    pub fn is_done(&self) -> bool {
        if !self.validate() {
            return false;
        }
        self.state.borrow().is_done()
    }

    /// The terminal status, or `None` while the operation is pending.
    pub fn poll(&self) -> Option<OperationStatus> {
        if self.is_done() {
            Some(self.status())
        } else {
            None
        }
    }

    /// Progress in `[0, 1]`.
    ///
    /// Leaves report 0 or 1. A chain reports half of its dependency's progress
    /// until the dependent operation exists, then `0.5 + 0.5 * dependent`.
    /// A group reports the mean of its children.
    pub fn percent_complete(&self) -> f32 {
        if !self.validate() {
            return 0.0;
        }
        let view = {
            let state = self.state.borrow();
            if state.is_done() {
                return 1.0;
            }
            match &state.composition {
                Composition::Leaf => return 0.0,
                Composition::Tracked(tracker) => return tracker.get(),
                Composition::Chain {
                    dependency,
                    dependent,
                } => ProgressView::Chain {
                    dependency: dependency.as_ref().map(|operation| operation.boxed_clone()),
                    dependent: dependent.as_ref().map(|operation| operation.boxed_clone()),
                },
                Composition::Group { children, .. } => ProgressView::Group(
                    children.iter().map(|child| child.boxed_clone()).collect(),
                ),
            }
        };

        match view {
            ProgressView::Chain {
                dependent: Some(dependent),
                ..
            } => 0.5 + 0.5 * settled_progress(dependent.as_ref()),
            ProgressView::Chain {
                dependency: Some(dependency),
                ..
            } => 0.5 * settled_progress(dependency.as_ref()),
            ProgressView::Chain { .. } => 0.0,
            ProgressView::Group(children) if children.is_empty() => 1.0,
            ProgressView::Group(children) => {
                let total: f32 = children
                    .iter()
                    .map(|child| settled_progress(child.as_ref()))
                    .sum();
                total / children.len() as f32
            }
        }
    }

    /// Sets the result. `Some` succeeds, `None` fails with
    /// [`OperationError::NullResult`] unless an error was already recorded.
    ///
    /// Group results are written by the group itself; calling this on a group
    /// has no effect.
    pub fn set_result(&self, value: Option<T>) {
        if !self.validate() {
            return;
        }
        let mut state = self.state.borrow_mut();
        if matches!(state.composition, Composition::Group { .. }) {
            return;
        }
        match value {
            Some(value) => {
                state.result = Some(value);
                state.status = OperationStatus::Succeeded;
                state.error = None;
            }
            None => {
                state.result = None;
                state.status = OperationStatus::Failed;
                if state.error.is_none() {
                    state.error = Some(OperationError::NullResult);
                }
            }
        }
    }

    /// Fails the operation with `error`.
    pub fn set_failed(&self, error: OperationError) {
        if !self.validate() {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.result = None;
        state.status = OperationStatus::Failed;
        state.error = Some(error);
    }

    /// Sets the result and fires the completion event.
    pub fn complete(&self, value: Option<T>) {
        self.set_result(value);
        self.invoke_completion_event();
    }

    /// Registers a completion callback.
    ///
    /// If the completion event already fired, the callback is queued on the
    /// runtime's deferred queue instead of running inline, so it is observed
    /// only after the current call stack returns.
    pub fn on_completed<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnOnce(&AsyncOperation<T>) -> CallbackResult + 'static,
    {
        self.subscribe(Callback::Typed(Box::new(callback)))
    }

    fn subscribe(&self, callback: Callback<T>) -> SubscriptionId {
        if !self.validate() {
            return SubscriptionId::INVALID;
        }
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        if !state.completion_dispatched {
            state.callbacks.push((id, callback));
            return id;
        }
        let runtime = state.runtime.upgrade();
        drop(state);

        match runtime {
            Some(runtime) => {
                let operation = self.clone();
                runtime
                    .deferred
                    .push(Box::new(move || operation.dispatch_late(callback)));
            }
            None => log::warn!("Operation runtime is gone, dropping completion callback of {self}"),
        }
        id
    }

    /// Removes a callback that has not fired yet.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        if !self.validate() {
            return false;
        }
        let mut state = self.state.borrow_mut();
        let before = state.callbacks.len();
        state.callbacks.retain(|(subscription, _)| *subscription != id);
        state.callbacks.len() != before
    }

    fn dispatch_late(&self, callback: Callback<T>) {
        if !self.validate() {
            return;
        }
        self.run_callback(callback);
    }

    /// Fires every registered callback once, in registration order.
    ///
    /// A callback that returns an error or panics is logged and turns the
    /// operation into `Failed` with a [`OperationError::CallbackFault`]; the
    /// remaining callbacks still run. Releasing the operation from inside a
    /// callback only takes effect once the whole list has run.
    pub fn invoke_completion_event(&self) {
        if !self.validate() {
            return;
        }
        let callbacks = {
            let mut state = self.state.borrow_mut();
            state.inside_completion_event = true;
            state.completion_dispatched = true;
            mem::take(&mut state.callbacks)
        };

        for (_, callback) in callbacks {
            self.run_callback(callback);
        }

        if !self.is_valid() {
            return;
        }
        let release = {
            let mut state = self.state.borrow_mut();
            state.inside_completion_event = false;
            state.release_on_completion
        };
        if release {
            self.recycle();
        }
    }

    fn run_callback(&self, callback: Callback<T>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match callback {
            Callback::Typed(callback) => callback(self),
            Callback::Untyped(callback) => callback(self),
        }));
        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => format!("{error:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        log::error!("Completion callback of {self} failed: {message}");
        if self.is_valid() {
            let mut state = self.state.borrow_mut();
            state.status = OperationStatus::Failed;
            state.error = Some(OperationError::CallbackFault { message });
        }
    }

    /// Takes ownership: the operation is no longer recycled on completion.
    pub fn retain(&self) -> Self {
        if self.validate() {
            self.state.borrow_mut().release_on_completion = false;
        }
        self.clone()
    }

    /// Gives the operation back to the runtime.
    ///
    /// The operation is recycled immediately if it is done and not inside its
    /// completion event, otherwise as soon as its completion event finishes.
    /// Releasing an already recycled handle is a logged no-op.
    pub fn release(&self) {
        if !self.is_valid() {
            log::warn!("Ignoring release of an already recycled operation: {self}");
            return;
        }
        let recycle_now = {
            let mut state = self.state.borrow_mut();
            state.release_on_completion = true;
            !state.inside_completion_event && state.is_done()
        };
        if recycle_now {
            self.recycle();
        }
    }

    /// Clears status, result, error, context, key, callbacks and children so
    /// the same handle can run a new operation.
    pub fn reset_status(&self) {
        if !self.validate() {
            return;
        }
        let detached = self.state.borrow_mut().reset();
        drop(detached);
    }

    pub(crate) fn set_composition(&self, composition: Composition) {
        if self.validate() {
            self.state.borrow_mut().composition = composition;
        }
    }

    fn recycle(&self) {
        let (detached, runtime) = {
            let mut state = self.state.borrow_mut();
            if state.pooled || state.generation != self.generation {
                return;
            }
            state.generation += 1;
            state.inside_completion_event = false;
            (state.reset(), state.runtime.upgrade())
        };
        drop(detached);

        match runtime {
            Some(runtime) => {
                runtime.pool.borrow_mut().release(Rc::clone(&self.state));
            }
            None => log::trace!("Operation runtime is gone, discarding recycled operation"),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

impl<T: Clone + 'static> Operation for AsyncOperation<T> {
    fn id(&self) -> OperationId {
        AsyncOperation::id(self)
    }

    fn is_valid(&self) -> bool {
        AsyncOperation::is_valid(self)
    }

    fn status(&self) -> OperationStatus {
        AsyncOperation::status(self)
    }

    fn is_done(&self) -> bool {
        AsyncOperation::is_done(self)
    }

    fn percent_complete(&self) -> f32 {
        AsyncOperation::percent_complete(self)
    }

    fn error(&self) -> Option<OperationError> {
        AsyncOperation::error(self)
    }

    fn context(&self) -> Option<Context> {
        AsyncOperation::context(self)
    }

    fn key(&self) -> Option<OperationKey> {
        AsyncOperation::key(self)
    }

    fn set_key(&self, key: Option<OperationKey>) {
        AsyncOperation::set_key(self, key)
    }

    fn result_any(&self) -> Option<Box<dyn Any>> {
        AsyncOperation::result(self).map(|result| Box::new(result) as Box<dyn Any>)
    }

    fn on_completed_untyped(&self, callback: UntypedCallback) -> SubscriptionId {
        self.subscribe(Callback::Untyped(callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        AsyncOperation::unsubscribe(self, id)
    }

    fn retain_untyped(&self) {
        AsyncOperation::retain(self);
    }

    fn release(&self) {
        AsyncOperation::release(self)
    }

    fn boxed_clone(&self) -> Box<dyn Operation> {
        Box::new(self.clone())
    }
}

impl<T: 'static> fmt::Display for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let valid = !state.pooled && state.generation == self.generation;
        write!(
            f,
            "AsyncOperation<{}> key = {}, status = {:?}, valid = {}, release_on_completion = {}",
            type_name::<T>(),
            state.key.as_ref().map(OperationKey::as_str).unwrap_or("<none>"),
            state.status,
            valid,
            state.release_on_completion
        )
    }
}

impl<T: 'static> fmt::Debug for AsyncOperation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::OperationRuntime;
    use std::cell::Cell;

    #[test]
    fn set_result_decides_the_status() {
        let runtime = OperationRuntime::new();
        let op = runtime.create::<String>();
        op.set_result(Some("x".to_string()));
        assert_eq!(op.status(), OperationStatus::Succeeded);
        assert_eq!(op.result().as_deref(), Some("x"));
        assert_eq!(op.error(), None);

        let op = runtime.create::<String>();
        op.set_result(None);
        assert_eq!(op.status(), OperationStatus::Failed);
        assert_eq!(op.error(), Some(OperationError::NullResult));
    }

    #[test]
    fn pending_leaf_reports_zero_progress() {
        let runtime = OperationRuntime::new();
        let op = runtime.create::<u8>();
        assert_eq!(op.percent_complete(), 0.0);
        assert_eq!(op.poll(), None);
        op.set_result(Some(1));
        assert_eq!(op.percent_complete(), 1.0);
        assert_eq!(op.poll(), Some(OperationStatus::Succeeded));
    }

    #[test]
    fn recycled_handle_degrades_to_defaults() {
        let runtime = OperationRuntime::new();
        let op = runtime.create::<u8>();
        op.start(None, Some("a".into()));
        op.complete(Some(1));

        assert!(!op.is_valid());
        assert_eq!(op.status(), OperationStatus::None);
        assert_eq!(op.result(), None);
        assert_eq!(op.key(), None);
        assert!(!op.is_done());
        assert_eq!(op.percent_complete(), 0.0);
        assert_eq!(op.on_completed(|_| Ok(())), SubscriptionId::INVALID);
    }

    #[test]
    fn display_reports_state() {
        let runtime = OperationRuntime::new();
        let op = runtime.create::<u8>();
        op.start(None, Some("door".into()));
        let text = op.to_string();
        assert!(text.contains("key = door"));
        assert!(text.contains("valid = true"));
    }

    #[test]
    fn unsubscribed_callback_never_runs() {
        let runtime = OperationRuntime::new();
        let op = runtime.create::<u8>();
        let hits = Rc::new(Cell::new(0));
        let sink = hits.clone();
        let id = op.on_completed(move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        assert!(op.unsubscribe(id));
        assert!(!op.unsubscribe(id));
        op.complete(Some(1));
        assert_eq!(hits.get(), 0);
    }
}
