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

//! Zero-delay deferral of actions to the next flush of the runtime.

/// An action queued for the next flush.
pub type DeferredAction = Box<dyn FnOnce()>;

/// A FIFO of actions that must not run inline.
///
/// Actions queued while a flush is running are kept for the next flush, so a
/// flush always terminates even if actions keep re-queuing work.
#[derive(Debug)]
pub struct DeferredQueue {
    sender: flume::Sender<DeferredAction>,
    receiver: flume::Receiver<DeferredAction>,
}

impl DeferredQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Queues an action.
    pub fn push(&self, action: DeferredAction) {
        if self.sender.send(action).is_err() {
            log::error!("Failed to queue deferred action: receiver disconnected");
        }
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Runs the actions that were queued before this call and returns how many
    /// ran.
    pub fn run_pending(&self) -> usize {
        let queued = self.receiver.len();
        let mut ran = 0;
        for _ in 0..queued {
            match self.receiver.try_recv() {
                Ok(action) => {
                    action();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        if ran > 0 {
            log::trace!("Ran {ran} deferred actions");
        }
        ran
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn actions_run_in_fifo_order() {
        let queue = DeferredQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.push(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn actions_queued_during_a_flush_wait_for_the_next_one() {
        let queue = Rc::new(DeferredQueue::new());
        let hits = Rc::new(RefCell::new(0));

        let inner_queue = queue.clone();
        let inner_hits = hits.clone();
        queue.push(Box::new(move || {
            *inner_hits.borrow_mut() += 1;
            let hits = inner_hits.clone();
            inner_queue.push(Box::new(move || *hits.borrow_mut() += 10));
        }));

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*hits.borrow(), 11);
    }
}
