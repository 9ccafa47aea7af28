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
use crate::location::ResourceLocation;
use crate::operation::handle::{panic_message, Composition};
use crate::operation::{AsyncOperation, Context, Operation, OperationKey, OperationStatus};
use crate::runtime::OperationRuntime;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Observes every child of a group as it completes, before the group records
/// its result.
pub type GroupCallback<T> = Box<dyn FnMut(&AsyncOperation<T>)>;

impl OperationRuntime {
    /// Starts one child per location through `factory` and completes once
    /// every child reported in.
    ///
    /// The result holds one slot per location, in location order. The group
    /// is done when all children completed, whatever their status; its status
    /// is the first failure reported by a child, while the slots of the
    /// children that succeeded are still filled. An empty group succeeds on
    /// the next flush.
    pub fn group<T, F>(
        &self,
        key: Option<OperationKey>,
        locations: &[ResourceLocation],
        callback: Option<GroupCallback<T>>,
        mut factory: F,
    ) -> AsyncOperation<Vec<Option<T>>>
    where
        T: Clone + 'static,
        F: FnMut(&ResourceLocation) -> AsyncOperation<T>,
    {
        let group = self.create::<Vec<Option<T>>>();
        let context: Context = Rc::new(locations.to_vec());
        group.start(Some(context), key.clone());

        let children: Vec<AsyncOperation<T>> = locations
            .iter()
            .map(|location| {
                let child = factory(location);
                if key.is_some() && child.is_valid() {
                    child.set_key(key.clone());
                }
                child
            })
            .collect();

        // A child recycled before the group saw it can never report in.
        let recycled = children.iter().filter(|child| !child.is_valid()).count();
        if recycled > 0 {
            log::error!("Group {group} was given {recycled} already recycled children");
        }

        let done = {
            let mut state = group.shared_state().borrow_mut();
            state.result = Some((0..children.len()).map(|_| None).collect());
            state.composition = Composition::Group {
                children: children.iter().map(|child| child.boxed_clone()).collect(),
                completed: recycled,
            };
            if recycled > 0 {
                state.status = OperationStatus::Failed;
                state.error = Some(OperationError::InvalidOperation);
            } else if children.is_empty() {
                state.status = OperationStatus::Succeeded;
            }
            recycled == children.len()
        };

        if done {
            self.fire_later(&group);
            return group;
        }

        let callback = Rc::new(RefCell::new(callback));
        for child in children.iter().filter(|child| child.is_valid()) {
            let group = group.clone();
            let callback = Rc::clone(&callback);
            child.on_completed(move |child| {
                group.on_child_completed(child, &callback);
                Ok(())
            });
        }
        group
    }
}

impl<T: Clone + 'static> AsyncOperation<Vec<Option<T>>> {
    fn on_child_completed(
        &self,
        child: &AsyncOperation<T>,
        callback: &RefCell<Option<GroupCallback<T>>>,
    ) {
        let external = callback.borrow_mut().take();
        if let Some(mut external) = external {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| external(child))) {
                log::error!(
                    "Group callback of {self} panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
            *callback.borrow_mut() = Some(external);
        }

        if !self.is_valid() {
            log::warn!("Group was recycled before its child completed: {child}");
            child.release();
            return;
        }

        let child_id = child.id();
        let status = child.status();
        let error = child.error();
        let result = child.result();

        let done = {
            let mut guard = self.shared_state().borrow_mut();
            let state = &mut *guard;
            match &mut state.composition {
                Composition::Group {
                    children,
                    completed,
                } => {
                    *completed += 1;
                    if let Some(slot) = children.iter().position(|op| op.id() == child_id) {
                        if let Some(results) = state.result.as_mut() {
                            results[slot] = result;
                        }
                        if status != OperationStatus::Succeeded
                            && state.status != OperationStatus::Failed
                        {
                            state.status = OperationStatus::Failed;
                            state.error = Some(error.unwrap_or(OperationError::NullResult));
                        }
                    }
                    *completed == children.len()
                }
                _ => false,
            }
        };

        child.release();

        if done {
            {
                let mut state = self.shared_state().borrow_mut();
                if state.status != OperationStatus::Failed {
                    state.status = OperationStatus::Succeeded;
                }
            }
            self.invoke_completion_event();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OperationError;
    use crate::location::ResourceLocation;
    use crate::operation::{AsyncOperation, OperationStatus};
    use crate::runtime::OperationRuntime;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn locations(names: &[&str]) -> Vec<ResourceLocation> {
        names
            .iter()
            .map(|name| ResourceLocation::new(*name, *name, "test.Provider", Vec::new()).unwrap())
            .collect()
    }

    #[test]
    fn mixed_outcomes_keep_successful_slots() {
        let runtime = OperationRuntime::new();
        let children: Rc<RefCell<Vec<AsyncOperation<String>>>> = Rc::default();
        let sink = children.clone();
        let inner = runtime.clone();
        let group = runtime
            .group(None, &locations(&["a", "b", "c"]), None, move |_| {
                let child = inner.create::<String>();
                sink.borrow_mut().push(child.clone());
                child
            })
            .retain();

        let ops = children.borrow().clone();
        ops[0].complete(Some("a".to_string()));
        ops[1].set_failed(OperationError::UnknownResource { id: "b".into() });
        ops[1].invoke_completion_event();
        assert!(!group.is_done());
        assert_eq!(group.status(), OperationStatus::Failed);
        ops[2].complete(Some("c".to_string()));

        assert!(group.is_done());
        assert_eq!(group.status(), OperationStatus::Failed);
        assert_eq!(
            group.error(),
            Some(OperationError::UnknownResource { id: "b".into() })
        );
        assert_eq!(
            group.result(),
            Some(vec![Some("a".to_string()), None, Some("c".to_string())])
        );
        group.release();
    }

    #[test]
    fn only_the_first_failure_is_reported() {
        let runtime = OperationRuntime::new();
        let inner = runtime.clone();
        let group = runtime
            .group(None, &locations(&["x", "y"]), None, move |location| {
                inner.completed::<u8>(
                    None,
                    None,
                    None,
                    Some(OperationError::UnknownResource {
                        id: location.internal_id().to_string(),
                    }),
                )
            })
            .retain();

        runtime.run_until_idle();
        assert_eq!(
            group.error(),
            Some(OperationError::UnknownResource { id: "x".into() })
        );
        group.release();
    }

    #[test]
    fn progress_is_the_mean_of_the_children() {
        let runtime = OperationRuntime::new();
        let trackers = Rc::new(RefCell::new(Vec::new()));
        let sink = trackers.clone();
        let inner = runtime.clone();
        let group = runtime.group(None, &locations(&["a", "b"]), None, move |_| {
            let (op, progress) = inner.create_tracked::<u8>();
            sink.borrow_mut().push(progress);
            op
        });

        trackers.borrow()[0].set(0.5);
        trackers.borrow()[1].set(0.25);
        assert!((group.percent_complete() - 0.375).abs() < 1e-6);
    }

    #[test]
    fn external_callback_sees_every_child() {
        let runtime = OperationRuntime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let inner = runtime.clone();
        let _group = runtime.group::<u32, _>(
            None,
            &locations(&["a", "b"]),
            Some(Box::new(move |child: &AsyncOperation<u32>| {
                sink.borrow_mut().push(child.result())
            })),
            move |location| {
                let value = location.internal_id().len() as u32;
                inner.completed(None, None, Some(value), None)
            },
        );

        runtime.run_until_idle();
        assert_eq!(*seen.borrow(), vec![Some(1), Some(1)]);
    }

    #[test]
    fn recycled_child_fails_the_group() {
        let runtime = OperationRuntime::new();
        let pending = Rc::new(RefCell::new(Vec::new()));
        let sink = pending.clone();
        let inner = runtime.clone();
        let group = runtime
            .group(None, &locations(&["inline", "later"]), None, move |location| {
                let child = inner.create::<u8>();
                if location.internal_id() == "inline" {
                    child.complete(Some(1));
                } else {
                    sink.borrow_mut().push(child.clone());
                }
                child
            })
            .retain();

        assert!(!group.is_done());
        assert_eq!(group.status(), OperationStatus::Failed);
        let later = pending.borrow()[0].clone();
        later.complete(Some(2));

        assert!(group.is_done());
        assert_eq!(group.error(), Some(OperationError::InvalidOperation));
        assert_eq!(group.result(), Some(vec![None, Some(2)]));
        group.release();
    }

    #[test]
    fn group_of_only_recycled_children_fails_on_the_next_flush() {
        let runtime = OperationRuntime::new();
        let inner = runtime.clone();
        let group = runtime
            .group(None, &locations(&["a"]), None, move |_| {
                let child = inner.create::<u8>();
                child.complete(Some(1));
                child
            })
            .retain();

        assert!(group.is_done());
        runtime.run_pending();
        assert_eq!(group.poll(), Some(OperationStatus::Failed));
        assert_eq!(group.error(), Some(OperationError::InvalidOperation));
        group.release();
    }

    #[test]
    fn empty_group_succeeds_on_the_next_flush() {
        let runtime = OperationRuntime::new();
        let group = runtime
            .group::<u8, _>(None, &[], None, |_| unreachable!())
            .retain();

        assert!(group.is_done());
        assert_eq!(group.percent_complete(), 1.0);
        runtime.run_pending();
        assert_eq!(group.status(), OperationStatus::Succeeded);
        assert_eq!(group.result(), Some(Vec::new()));
        group.release();
    }

    #[test]
    fn reset_status_clears_results_and_children() {
        let runtime = OperationRuntime::new();
        let inner = runtime.clone();
        let group = runtime
            .group(None, &locations(&["a"]), None, move |_| {
                inner.completed(None, None, Some(3u8), None)
            })
            .retain();
        runtime.run_until_idle();
        assert_eq!(group.result(), Some(vec![Some(3)]));

        group.reset_status();
        assert_eq!(group.status(), OperationStatus::None);
        assert_eq!(group.result(), None);
        assert!(!group.is_done());
        group.release();
    }
}
