use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// First-in-first-out delivery of items that may be pushed while an earlier item is still being
/// delivered.
///
/// The outermost [`push()`][Self::push] delivers its item and then everything pushed from within
/// the delivery callbacks, in push order, before returning. Nested pushes only enqueue. This
/// keeps every observer of a stream seeing the same events in the same order even when an
/// observer sends events, stops a run or starts a new one from inside its callback.
pub(crate) struct DeliveryQueue<T> {
    pending: RefCell<VecDeque<T>>,

    draining: Cell<bool>,
}

impl<T> DeliveryQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            pending: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        }
    }

    /// Enqueues `item` and, unless a delivery is already in progress further up the stack,
    /// delivers queued items with `deliver` until the queue is empty.
    pub(crate) fn push(&self, item: T, mut deliver: impl FnMut(T)) {
        self.pending.borrow_mut().push_back(item);

        if self.draining.replace(true) {
            return;
        }

        // Reset even if a callback panics, so that the queue stays usable afterwards.
        let _draining = scopeguard::guard(&self.draining, |draining| draining.set(false));

        loop {
            // The borrow must end before delivery, as delivery may push more items.
            let next = self.pending.borrow_mut().pop_front();

            let Some(next) = next else {
                break;
            };

            deliver(next);
        }
    }

    #[cfg(test)]
    fn is_draining(&self) -> bool {
        self.draining.get()
    }
}
