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

use std::cell::Cell;
use std::rc::Rc;

/// A progress cell shared between a long-running producer and the operation
/// reporting on its behalf.
///
/// The producer writes, the operation's `percent_complete` reads. Values are
/// clamped to `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker(Rc<Cell<f32>>);

impl ProgressTracker {
    /// Creates a tracker at zero progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records new progress.
    pub fn set(&self, value: f32) {
        self.0.set(value.clamp(0.0, 1.0));
    }

    /// The last recorded progress.
    pub fn get(&self) -> f32 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped() {
        let tracker = ProgressTracker::new();
        tracker.set(1.5);
        assert_eq!(tracker.get(), 1.0);
        tracker.set(-2.0);
        assert_eq!(tracker.get(), 0.0);
    }

    #[test]
    fn clones_share_the_same_cell() {
        let tracker = ProgressTracker::new();
        let reader = tracker.clone();
        tracker.set(0.25);
        assert_eq!(reader.get(), 0.25);
    }
}
