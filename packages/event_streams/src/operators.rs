//! Transformations of streams into derived streams.
//!
//! A hot operator creates a new [`Stream`] whose producer attaches one observer to the source,
//! so every derived stream is fed by the source's single production run. A deferred operator is
//! the hot operator applied to every run via [`DeferredStream::lift()`], so per-run state such as
//! the accumulator of [`reduce()`][DeferredStream::reduce] starts over on every run.

use std::cell::RefCell;
use std::rc::Rc;

use crate::{BoxedDisposable, DeferredStream, Event, Observer, Stream};

impl<V, E> Stream<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a stream fed by one observer attached to this stream. `adapt` receives the
    /// observer of the new stream and returns the observer to attach here.
    fn derive<U, F>(&self, adapt: impl FnOnce(Observer<U, F>) -> Observer<V, E>) -> Stream<U, F>
    where
        U: Clone + 'static,
        F: Clone + 'static,
    {
        Stream::new(|downstream| {
            let detach: BoxedDisposable = Box::new(self.add(adapt(downstream)));
            Some(detach)
        })
    }

    /// A stream of `f` applied to every value of this stream.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// use event_streams::Stream;
    ///
    /// let (numbers, input) = Stream::<i32, ()>::pipe();
    /// let labels = numbers.map(|n| format!("#{n}"));
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// labels.observe_next({
    ///     let seen = Rc::clone(&seen);
    ///     move |label| seen.borrow_mut().push(label)
    /// });
    ///
    /// input.send_next(1);
    /// input.send_next(2);
    ///
    /// assert_eq!(*seen.borrow(), vec!["#1", "#2"]);
    /// ```
    #[must_use]
    pub fn map<U>(&self, f: impl Fn(V) -> U + 'static) -> Stream<U, E>
    where
        U: Clone + 'static,
    {
        self.derive(move |downstream| {
            Observer::new(move |event: Event<V, E>| downstream.send(event.map(&f)))
        })
    }

    /// A stream of this stream's events with `f` applied to the error of `Failed`.
    #[must_use]
    pub fn map_error<F>(&self, f: impl Fn(E) -> F + 'static) -> Stream<V, F>
    where
        F: Clone + 'static,
    {
        self.derive(move |downstream| {
            Observer::new(move |event: Event<V, E>| downstream.send(event.map_error(&f)))
        })
    }

    /// A stream of the values of this stream for which `predicate` holds. Terminal events pass
    /// through unchanged.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&V) -> bool + 'static) -> Self {
        self.flat_map(move |value| predicate(&value).then_some(value))
    }

    /// A stream of `f` applied to every value of this stream, leaving out values for which `f`
    /// returns [`None`].
    #[must_use]
    pub fn flat_map<U>(&self, f: impl Fn(V) -> Option<U> + 'static) -> Stream<U, E>
    where
        U: Clone + 'static,
    {
        self.derive(move |downstream| {
            Observer::new(move |event: Event<V, E>| {
                if let Some(event) = event.flat_map(&f) {
                    downstream.send(event);
                }
            })
        })
    }

    /// A stream of running accumulations: every value of this stream is combined into the
    /// accumulator, starting from `initial`, and the updated accumulator is emitted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// use event_streams::Stream;
    ///
    /// let (numbers, input) = Stream::<i32, ()>::pipe();
    /// let totals = numbers.reduce(0, |total, n| total + n);
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// totals.observe_next({
    ///     let seen = Rc::clone(&seen);
    ///     move |total| seen.borrow_mut().push(total)
    /// });
    ///
    /// for n in [1, 2, 3] {
    ///     input.send_next(n);
    /// }
    ///
    /// assert_eq!(*seen.borrow(), vec![1, 3, 6]);
    /// ```
    #[must_use]
    pub fn reduce<U>(&self, initial: U, combine: impl Fn(U, V) -> U + 'static) -> Stream<U, E>
    where
        U: Clone + 'static,
    {
        self.derive(move |downstream| {
            let accumulator = RefCell::new(initial);

            Observer::new(move |event: Event<V, E>| {
                let event = event.map(|value| {
                    let current = accumulator.borrow().clone();
                    let next = combine(current, value);
                    *accumulator.borrow_mut() = next.clone();
                    next
                });

                downstream.send(event);
            })
        })
    }

    /// Splits this stream in two: values for which `predicate` holds go to the first stream,
    /// all other values to the second. Terminal events go to both.
    ///
    /// Both streams are fed by a single observer attached to this stream, which is detached once
    /// they terminate.
    #[must_use]
    pub fn partition(&self, predicate: impl Fn(&V) -> bool + 'static) -> (Self, Self) {
        let (right, right_input) = Self::pipe();

        let left = self.derive(move |left_input| {
            Observer::new(move |event: Event<V, E>| match event {
                Event::Next(value) => {
                    if predicate(&value) {
                        left_input.send_next(value);
                    } else {
                        right_input.send_next(value);
                    }
                }
                terminal => {
                    left_input.send(terminal.clone());
                    right_input.send(terminal);
                }
            })
        });

        (left, right)
    }
}

impl<V, E> DeferredStream<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    /// A deferred stream of `f` applied to every value of this stream.
    #[must_use]
    pub fn map<U>(&self, f: impl Fn(V) -> U + 'static) -> DeferredStream<U, E>
    where
        U: Clone + 'static,
    {
        let f = Rc::new(f);

        self.lift(move |stream| {
            let f = Rc::clone(&f);
            stream.map(move |value| f(value))
        })
    }

    /// A deferred stream of this stream's events with `f` applied to the error of `Failed`.
    #[must_use]
    pub fn map_error<F>(&self, f: impl Fn(E) -> F + 'static) -> DeferredStream<V, F>
    where
        F: Clone + 'static,
    {
        let f = Rc::new(f);

        self.lift(move |stream| {
            let f = Rc::clone(&f);
            stream.map_error(move |error| f(error))
        })
    }

    /// A deferred stream of the values of this stream for which `predicate` holds.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&V) -> bool + 'static) -> Self {
        let predicate = Rc::new(predicate);

        self.lift(move |stream| {
            let predicate = Rc::clone(&predicate);
            stream.filter(move |value| predicate(value))
        })
    }

    /// A deferred stream of `f` applied to every value of this stream, leaving out values for
    /// which `f` returns [`None`].
    #[must_use]
    pub fn flat_map<U>(&self, f: impl Fn(V) -> Option<U> + 'static) -> DeferredStream<U, E>
    where
        U: Clone + 'static,
    {
        let f = Rc::new(f);

        self.lift(move |stream| {
            let f = Rc::clone(&f);
            stream.flat_map(move |value| f(value))
        })
    }

    /// A deferred stream of running accumulations, starting from `initial` on every run.
    #[must_use]
    pub fn reduce<U>(
        &self,
        initial: U,
        combine: impl Fn(U, V) -> U + 'static,
    ) -> DeferredStream<U, E>
    where
        U: Clone + 'static,
    {
        let combine = Rc::new(combine);

        self.lift(move |stream| {
            let combine = Rc::clone(&combine);
            stream.reduce(initial.clone(), move |accumulator, value| {
                combine(accumulator, value)
            })
        })
    }

    /// Splits this stream in two deferred streams: values for which `predicate` holds go to the
    /// first, all other values to the second. Terminal events go to both.
    ///
    /// Each of the two is started and stopped on its own, running this stream's producer
    /// independently.
    #[must_use]
    pub fn partition(&self, predicate: impl Fn(&V) -> bool + 'static) -> (Self, Self) {
        let predicate = Rc::new(predicate);

        let left = self.filter({
            let predicate = Rc::clone(&predicate);
            move |value| predicate(value)
        });
        let right = self.filter(move |value| !predicate(value));

        (left, right)
    }
}
