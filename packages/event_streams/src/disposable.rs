//! Cancelable cleanup handles.
//!
//! Every type here is idempotent: disposing zero, one or many times has the same effect as
//! disposing once, and disposal may be requested reentrantly from within a cleanup action.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::{Bag, BagToken};

/// One unit of cleanup that can be requested at most once.
///
/// Disposing releases whatever the disposable stands for (a subscription, a producer's resources,
/// a pending operation). Dropping a disposable without disposing it does not release anything.
pub trait Disposable: fmt::Debug {
    /// Releases the resource. Calling this again after the first time has no effect.
    fn dispose(&self);

    /// Whether [`dispose()`][Self::dispose] has been called.
    fn is_disposed(&self) -> bool;
}

/// A type-erased disposable, as returned by stream producers.
pub type BoxedDisposable = Box<dyn Disposable>;

impl<D> Disposable for Box<D>
where
    D: Disposable + ?Sized,
{
    fn dispose(&self) {
        (**self).dispose();
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

impl<D> Disposable for Rc<D>
where
    D: Disposable + ?Sized,
{
    fn dispose(&self) {
        (**self).dispose();
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }
}

/// A disposable that runs a closure the first time it is disposed.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use event_streams::{ActionDisposable, Disposable};
///
/// let runs = Rc::new(Cell::new(0));
/// let disposable = ActionDisposable::new({
///     let runs = Rc::clone(&runs);
///     move || runs.set(runs.get() + 1)
/// });
///
/// disposable.dispose();
/// disposable.dispose();
///
/// assert_eq!(runs.get(), 1);
/// ```
pub struct ActionDisposable {
    action: RefCell<Option<Box<dyn FnOnce()>>>,
    disposed: Cell<bool>,
}

impl ActionDisposable {
    /// Creates a disposable that runs `action` when first disposed.
    #[must_use]
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: RefCell::new(Some(Box::new(action))),
            disposed: Cell::new(false),
        }
    }

    /// Creates a disposable that does nothing when disposed.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            action: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    /// Creates a disposable that reports itself as already disposed.
    #[must_use]
    pub fn disposed() -> Self {
        Self {
            action: RefCell::new(None),
            disposed: Cell::new(true),
        }
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        // The borrow must end before the action runs, as the action may reach back to us.
        let action = self.action.borrow_mut().take();

        if let Some(action) = action {
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl fmt::Debug for ActionDisposable {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

/// Holds at most one inner disposable at a time.
///
/// Assigning a new inner disposable disposes the previous one. Once the serial disposable itself
/// is disposed, its current inner disposable is disposed and any inner disposable assigned later
/// is disposed immediately on assignment.
///
/// This is how streams tie a producer's resources to their lifetime: the producer may return its
/// disposable after the stream has already terminated (e.g. a producer that completes
/// synchronously), in which case the resources are released on the spot.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
///
/// use event_streams::{ActionDisposable, Disposable, SerialDisposable};
///
/// let serial = SerialDisposable::new();
///
/// let first = Rc::new(ActionDisposable::empty());
/// serial.set(Some(Box::new(Rc::clone(&first))));
/// serial.set(None);
/// assert!(first.is_disposed());
///
/// serial.dispose();
///
/// let late = Rc::new(ActionDisposable::empty());
/// serial.set(Some(Box::new(Rc::clone(&late))));
/// assert!(late.is_disposed());
/// ```
pub struct SerialDisposable {
    inner: RefCell<Option<BoxedDisposable>>,
    disposed: Cell<bool>,
}

impl SerialDisposable {
    /// Creates a serial disposable with no inner disposable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(None),
            disposed: Cell::new(false),
        }
    }

    /// Replaces the inner disposable, disposing the previous one.
    ///
    /// If this serial disposable has already been disposed, `next` is disposed immediately.
    pub fn set(&self, next: Option<BoxedDisposable>) {
        if self.disposed.get() {
            if let Some(next) = next {
                next.dispose();
            }

            return;
        }

        let previous = self.inner.replace(next);

        if let Some(previous) = previous {
            previous.dispose();
        }
    }

    /// Whether an inner disposable is currently held.
    #[must_use]
    pub fn has_inner(&self) -> bool {
        self.inner.borrow().is_some()
    }
}

impl Default for SerialDisposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for SerialDisposable {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let inner = self.inner.take();

        if let Some(inner) = inner {
            inner.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl fmt::Debug for SerialDisposable {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("disposed", &self.disposed.get())
            .field("has_inner", &self.has_inner())
            .finish_non_exhaustive()
    }
}

/// Owns any number of disposables and disposes all of them together.
///
/// Members can be detached again by the token returned when they were added. Members added after
/// the composite was disposed are disposed immediately.
pub struct CompositeDisposable {
    members: RefCell<Bag<BoxedDisposable>>,
    disposed: Cell<bool>,
}

impl CompositeDisposable {
    /// Creates an empty composite disposable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Bag::new()),
            disposed: Cell::new(false),
        }
    }

    /// Adds a member, returning the token that can detach it again.
    ///
    /// Returns [`None`] if the composite has already been disposed, in which case `member` has
    /// been disposed by this call.
    pub fn add(&self, member: BoxedDisposable) -> Option<BagToken> {
        if self.disposed.get() {
            member.dispose();
            return None;
        }

        Some(self.members.borrow_mut().insert(member))
    }

    /// Detaches a member without disposing it, returning it to the caller.
    pub fn remove(&self, token: BagToken) -> Option<BoxedDisposable> {
        self.members.borrow_mut().remove(token)
    }

    /// The number of members not yet disposed or detached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    /// Whether the composite has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }
}

impl Default for CompositeDisposable {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<BoxedDisposable> for CompositeDisposable {
    fn from_iter<I: IntoIterator<Item = BoxedDisposable>>(iter: I) -> Self {
        let composite = Self::new();

        for member in iter {
            composite.add(member);
        }

        composite
    }
}

impl Disposable for CompositeDisposable {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        let members = mem::take(&mut *self.members.borrow_mut());

        for member in members {
            member.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl fmt::Debug for CompositeDisposable {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("disposed", &self.disposed.get())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(ActionDisposable: Send, Sync);
    assert_not_impl_any!(SerialDisposable: Send, Sync);
    assert_not_impl_any!(CompositeDisposable: Send, Sync);

    fn counting() -> (Rc<Cell<usize>>, ActionDisposable) {
        let count = Rc::new(Cell::new(0));
        let disposable = ActionDisposable::new({
            let count = Rc::clone(&count);
            move || count.set(count.get() + 1)
        });

        (count, disposable)
    }

    #[test]
    fn action_runs_once() {
        let (count, disposable) = counting();

        assert!(!disposable.is_disposed());
        assert_eq!(count.get(), 0);

        disposable.dispose();
        disposable.dispose();

        assert!(disposable.is_disposed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn action_dispose_is_reentrant() {
        let count = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Rc<ActionDisposable>>>> = Rc::new(RefCell::new(None));

        let disposable = Rc::new(ActionDisposable::new({
            let count = Rc::clone(&count);
            let slot = Rc::clone(&slot);
            move || {
                count.set(count.get() + 1);

                // Dispose ourselves again from inside the action.
                let me = slot.borrow_mut().take();
                if let Some(me) = me {
                    me.dispose();
                }
            }
        }));

        *slot.borrow_mut() = Some(Rc::clone(&disposable));
        disposable.dispose();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dropping_does_not_dispose() {
        let (count, disposable) = counting();
        drop(disposable);

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn empty_and_disposed_constructors() {
        let empty = ActionDisposable::empty();
        assert!(!empty.is_disposed());
        empty.dispose();
        assert!(empty.is_disposed());

        assert!(ActionDisposable::disposed().is_disposed());
    }

    #[test]
    fn serial_disposes_previous_on_replace() {
        let (first_count, first) = counting();
        let (second_count, second) = counting();

        let serial = SerialDisposable::new();
        serial.set(Some(Box::new(first)));
        assert!(serial.has_inner());

        serial.set(Some(Box::new(second)));
        assert_eq!(first_count.get(), 1);
        assert_eq!(second_count.get(), 0);

        serial.dispose();
        assert_eq!(second_count.get(), 1);
        assert!(!serial.has_inner());
    }

    #[test]
    fn serial_disposes_late_assignment_immediately() {
        let serial = SerialDisposable::new();
        serial.dispose();

        let (count, late) = counting();
        serial.set(Some(Box::new(late)));

        assert_eq!(count.get(), 1);
        assert!(!serial.has_inner());
    }

    #[test]
    fn serial_dispose_is_idempotent() {
        let (count, inner) = counting();

        let serial = SerialDisposable::default();
        serial.set(Some(Box::new(inner)));

        serial.dispose();
        serial.dispose();

        assert!(serial.is_disposed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn composite_disposes_all_members_once() {
        let (a_count, a) = counting();
        let (b_count, b) = counting();

        let composite: CompositeDisposable =
            [Box::new(a) as BoxedDisposable, Box::new(b)].into_iter().collect();
        assert_eq!(composite.len(), 2);

        composite.dispose();
        composite.dispose();

        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);
        assert!(composite.is_empty());
    }

    #[test]
    fn composite_removed_member_is_not_disposed() {
        let (count, member) = counting();

        let composite = CompositeDisposable::new();
        let token = composite.add(Box::new(member)).unwrap();

        let detached = composite.remove(token).unwrap();
        composite.dispose();

        assert_eq!(count.get(), 0);
        assert!(!detached.is_disposed());
    }

    #[test]
    fn composite_disposes_late_member_immediately() {
        let composite = CompositeDisposable::new();
        composite.dispose();

        let (count, late) = counting();
        assert!(composite.add(Box::new(late)).is_none());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn shared_disposable_delegates() {
        let (count, inner) = counting();
        let shared = Rc::new(inner);

        let boxed: BoxedDisposable = Box::new(Rc::clone(&shared));
        boxed.dispose();

        assert!(shared.is_disposed());
        assert!(boxed.is_disposed());
        assert_eq!(count.get(), 1);
    }
}
