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
use crate::operation::{AsyncOperation, Context, OperationKey};
use crate::runtime::OperationRuntime;

impl OperationRuntime {
    /// Creates an operation whose outcome is already known.
    ///
    /// The status is set immediately, with `error` taking precedence over
    /// `value`. The completion event fires on the next flush of the deferred
    /// queue, never inline.
    pub fn completed<T: Clone + 'static>(
        &self,
        context: Option<Context>,
        key: Option<OperationKey>,
        value: Option<T>,
        error: Option<OperationError>,
    ) -> AsyncOperation<T> {
        let operation = self.create::<T>();
        operation.start(context, key);
        match error {
            Some(error) => operation.set_failed(error),
            None => operation.set_result(value),
        }

        self.fire_later(&operation);
        operation
    }

    /// Fires the completion event of `operation` on the next flush, so the
    /// caller gets a live handle back before it can be recycled.
    pub(crate) fn fire_later<T: Clone + 'static>(&self, operation: &AsyncOperation<T>) {
        let pending = operation.clone();
        self.defer(move || {
            if pending.is_valid() {
                pending.invoke_completion_event();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OperationError;
    use crate::operation::OperationStatus;
    use crate::runtime::OperationRuntime;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn completion_fires_on_the_next_flush() {
        let runtime = OperationRuntime::new();
        let op = runtime.completed(None, Some("answer".into()), Some(42u32), None);
        assert_eq!(op.status(), OperationStatus::Succeeded);

        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();
        op.on_completed(move |op| {
            sink.set(op.result());
            Ok(())
        });
        assert_eq!(seen.get(), None);

        runtime.run_pending();
        assert_eq!(seen.get(), Some(42));
    }

    #[test]
    fn error_takes_precedence_over_value() {
        let runtime = OperationRuntime::new();
        let op = runtime
            .completed(
                None,
                None,
                Some(1u8),
                Some(OperationError::UnknownResource { id: "x".into() }),
            )
            .retain();

        runtime.run_pending();
        assert_eq!(op.status(), OperationStatus::Failed);
        assert_eq!(op.result(), None);
        assert!(matches!(
            op.error(),
            Some(OperationError::UnknownResource { .. })
        ));
        op.release();
    }

    #[test]
    fn released_before_flush_skips_completion() {
        let runtime = OperationRuntime::new();
        let op = runtime.completed(None, None, Some(1u8), None);
        op.release();
        assert!(!op.is_valid());
        assert_eq!(runtime.run_pending(), 1);
        assert_eq!(runtime.pooled_count::<u8>(), 1);
    }
}
