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

use crate::error::OperationError;
use crate::operation::handle::{panic_message, Composition};
use crate::operation::{AsyncOperation, Context, Operation, OperationKey, OperationStatus};
use crate::runtime::OperationRuntime;
use std::panic::{self, AssertUnwindSafe};

impl OperationRuntime {
    /// Runs `continuation` on the result of `dependency` and completes with the
    /// result of the operation it returns.
    ///
    /// The continuation receives `None` when the dependency failed; if the
    /// returned operation then fails without an error of its own, the chain
    /// reports the dependency's error. The dependency is released as soon as
    /// it completed.
    pub fn chain<T, D, F>(
        &self,
        context: Option<Context>,
        key: Option<OperationKey>,
        dependency: AsyncOperation<D>,
        continuation: F,
    ) -> AsyncOperation<T>
    where
        T: Clone + 'static,
        D: Clone + 'static,
        F: FnOnce(Option<D>) -> AsyncOperation<T> + 'static,
    {
        let chain = self.create::<T>();
        chain.start(context, key);
        if !dependency.is_valid() {
            log::error!("Chain {chain} was given an already recycled dependency");
            chain.set_failed(OperationError::InvalidOperation);
            self.fire_later(&chain);
            return chain;
        }
        chain.set_composition(Composition::Chain {
            dependency: Some(dependency.boxed_clone()),
            dependent: None,
        });

        let this = chain.clone();
        dependency.on_completed(move |dependency| {
            this.on_dependency_completed(dependency, continuation);
            Ok(())
        });
        chain
    }
}

impl<T: Clone + 'static> AsyncOperation<T> {
    fn on_dependency_completed<D, F>(&self, dependency: &AsyncOperation<D>, continuation: F)
    where
        D: Clone + 'static,
        F: FnOnce(Option<D>) -> AsyncOperation<T>,
    {
        if !self.is_valid() {
            log::warn!("Chain was recycled before its dependency completed: {dependency}");
            dependency.release();
            return;
        }
        let upstream_error = match dependency.status() {
            OperationStatus::Succeeded => None,
            _ => dependency.error(),
        };
        self.replace_chain_link(|dependency, _| *dependency = None);

        let result = dependency.result();
        let dependent = match panic::catch_unwind(AssertUnwindSafe(|| continuation(result))) {
            Ok(dependent) => dependent,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Chain continuation of {self} panicked: {message}");
                dependency.release();
                self.set_failed(OperationError::CallbackFault { message });
                self.invoke_completion_event();
                return;
            }
        };

        if !dependent.is_valid() {
            log::error!("Chain continuation of {self} returned an already recycled operation");
            dependency.release();
            self.set_failed(OperationError::InvalidOperation);
            self.invoke_completion_event();
            return;
        }

        if dependent.context().is_none() {
            dependent.set_context(self.context());
        }
        dependent.set_key(self.key());
        dependency.release();

        let link = dependent.boxed_clone();
        self.replace_chain_link(move |_, dependent| *dependent = Some(link));

        let this = self.clone();
        dependent.on_completed(move |dependent| {
            this.on_dependent_completed(dependent, upstream_error);
            Ok(())
        });
    }

    fn on_dependent_completed(
        &self,
        dependent: &AsyncOperation<T>,
        upstream_error: Option<OperationError>,
    ) {
        if !self.is_valid() {
            log::warn!("Chain was recycled before its dependent operation completed: {dependent}");
            return;
        }
        self.set_result(dependent.result());
        if dependent.status() != OperationStatus::Succeeded {
            let error = match (dependent.error(), upstream_error) {
                (None | Some(OperationError::NullResult), Some(upstream)) => upstream,
                (Some(error), _) => error,
                (None, None) => OperationError::NullResult,
            };
            self.set_failed(error);
        }
        self.invoke_completion_event();
    }

    fn replace_chain_link(
        &self,
        update: impl FnOnce(&mut Option<Box<dyn Operation>>, &mut Option<Box<dyn Operation>>),
    ) {
        let mut state = self.shared_state().borrow_mut();
        if let Composition::Chain {
            dependency,
            dependent,
        } = &mut state.composition
        {
            update(dependency, dependent);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OperationError;
    use crate::operation::{OperationKey, OperationStatus};
    use crate::runtime::OperationRuntime;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn progress_is_split_in_two_phases() {
        let runtime = OperationRuntime::new();
        let (dependency, progress) = runtime.create_tracked::<u32>();
        let dependent = runtime.create::<String>();

        let next = dependent.clone();
        let chain = runtime
            .chain(None, None, dependency.clone(), move |_| next)
            .retain();

        progress.set(0.4);
        assert!((chain.percent_complete() - 0.2).abs() < 1e-6);

        dependency.complete(Some(7));
        assert!((chain.percent_complete() - 0.5).abs() < 1e-6);

        dependent.complete(Some("done".to_string()));
        assert_eq!(chain.status(), OperationStatus::Succeeded);
        assert_eq!(chain.result().as_deref(), Some("done"));
        assert_eq!(chain.percent_complete(), 1.0);
        chain.release();
    }

    #[test]
    fn continuation_receives_the_dependency_result() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.completed(None, None, Some(20u32), None);
        let inner = runtime.clone();
        let chain = runtime
            .chain(None, None, dependency, move |value| {
                inner.completed(None, None, value.map(|v| v + 1), None)
            })
            .retain();

        runtime.run_until_idle();
        assert_eq!(chain.result(), Some(21));
        chain.release();
    }

    #[test]
    fn dependency_error_surfaces_on_the_chain() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.completed::<u32>(
            None,
            None,
            None,
            Some(OperationError::UnknownResource { id: "missing".into() }),
        );
        let inner = runtime.clone();
        let chain = runtime
            .chain(None, None, dependency, move |value: Option<u32>| {
                assert!(value.is_none());
                inner.completed::<u32>(None, None, None, None)
            })
            .retain();

        runtime.run_until_idle();
        assert_eq!(chain.status(), OperationStatus::Failed);
        assert_eq!(
            chain.error(),
            Some(OperationError::UnknownResource { id: "missing".into() })
        );
        chain.release();
    }

    #[test]
    fn key_reaches_the_pending_dependency_and_the_dependent() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.create::<u32>().retain();
        let seen = Rc::new(RefCell::new(None));

        let inner = runtime.clone();
        let chain = runtime.chain(None, None, dependency.clone(), move |_| {
            inner.completed(None, None, Some(1u8), None)
        });
        let sink = seen.clone();
        chain.on_completed(move |chain| {
            *sink.borrow_mut() = chain.key();
            Ok(())
        });

        chain.set_key(Some(OperationKey::from("prefab/door")));
        assert_eq!(dependency.key(), Some(OperationKey::from("prefab/door")));

        dependency.complete(Some(5));
        runtime.run_until_idle();
        assert_eq!(*seen.borrow(), Some(OperationKey::from("prefab/door")));
    }

    #[test]
    fn panicking_continuation_fails_the_chain() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.completed(None, None, Some(1u8), None);
        let chain = runtime
            .chain::<u8, u8, _>(None, None, dependency, |_| panic!("no continuation"))
            .retain();

        runtime.run_until_idle();
        assert_eq!(chain.status(), OperationStatus::Failed);
        assert!(matches!(
            chain.error(),
            Some(OperationError::CallbackFault { .. })
        ));
        chain.release();
    }

    #[test]
    fn continuation_returning_a_recycled_operation_fails_the_chain() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.completed(None, None, Some(1u8), None);
        let inner = runtime.clone();
        let chain = runtime
            .chain(None, None, dependency, move |_| {
                let dependent = inner.create::<u8>();
                dependent.complete(Some(2));
                dependent
            })
            .retain();

        runtime.run_until_idle();
        assert_eq!(chain.poll(), Some(OperationStatus::Failed));
        assert_eq!(chain.error(), Some(OperationError::InvalidOperation));
        chain.release();
    }

    #[test]
    fn recycled_dependency_fails_the_chain_on_the_next_flush() {
        let runtime = OperationRuntime::new();
        let dependency = runtime.create::<u8>();
        dependency.complete(Some(1));
        let chain = runtime
            .chain::<u8, u8, _>(None, None, dependency, |_| unreachable!())
            .retain();

        assert!(chain.is_valid());
        assert_eq!(chain.status(), OperationStatus::Failed);
        assert_eq!(runtime.pending_count(), 1);
        runtime.run_pending();
        assert_eq!(chain.error(), Some(OperationError::InvalidOperation));
        chain.release();
    }
}
