//! Producers behind the `value`/`error`/`values`/`empty`/`never` factories.
//!
//! They are `Fn` so that deferred streams can run them once per `start()`; hot streams simply
//! run them once.

use crate::{BoxedDisposable, Observer};

pub(crate) fn value<V, E>(value: V) -> impl Fn(Observer<V, E>) -> Option<BoxedDisposable>
where
    V: Clone,
{
    move |observer| {
        observer.send_next(value.clone());
        observer.send_completed();
        None
    }
}

pub(crate) fn error<V, E>(error: E) -> impl Fn(Observer<V, E>) -> Option<BoxedDisposable>
where
    E: Clone,
{
    move |observer| {
        observer.send_failed(error.clone());
        None
    }
}

pub(crate) fn values<V, E, I>(values: I) -> impl Fn(Observer<V, E>) -> Option<BoxedDisposable>
where
    I: IntoIterator<Item = V> + Clone,
{
    move |observer| {
        emit_all(&observer, values.clone());
        None
    }
}

/// Emits each value and then completes, stopping as soon as the observer closes, e.g. because an
/// observer downstream stopped the run in reaction to one of the values.
pub(crate) fn emit_all<V, E>(observer: &Observer<V, E>, values: impl IntoIterator<Item = V>) {
    for value in values {
        if observer.is_closed() {
            return;
        }

        observer.send_next(value);
    }

    observer.send_completed();
}

pub(crate) fn empty<V, E>() -> impl Fn(Observer<V, E>) -> Option<BoxedDisposable> {
    |observer| {
        observer.send_completed();
        None
    }
}

pub(crate) fn never<V, E>() -> impl Fn(Observer<V, E>) -> Option<BoxedDisposable> {
    |_| None
}
