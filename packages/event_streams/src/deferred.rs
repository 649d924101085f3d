use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::delivery::DeliveryQueue;
use crate::observer::Sink;
use crate::{
    ActionDisposable, AlreadyRunning, Bag, BoxedDisposable, CompositeDisposable, Disposable,
    Event, Observer, SerialDisposable, Stream, producers,
};

type Producer<V, E> = dyn Fn(Observer<V, E>) -> Option<BoxedDisposable>;

/// A cold stream whose producer only runs between [`start()`][Self::start] and
/// [`stop()`][Self::stop], and which can be restarted.
///
/// Constructing a deferred stream does not run anything. Each `start()` invokes the producer
/// afresh with a new observer and fans the events of that run out to every attached observer.
/// A run ends when the producer emits a terminal event or when `stop()` is called, in which case
/// the attached observers receive `Interrupted`. Either way, the resources the producer returned
/// for that run are disposed and the stream goes back to idle, ready for another `start()`.
///
/// Observers stay attached across runs, so an attached observer sees the events of every run,
/// each sequence ending with its own terminal event. No state carries over from one run to the
/// next; operators applied via [`lift()`][Self::lift] (and the operators built on it) set up
/// fresh state for every run.
///
/// Events sent while another event of this stream is being delivered are queued behind it, across
/// runs too: a run started from a terminal callback delivers its events after that terminal
/// event has reached every observer.
///
/// Calling `start()` while a run is active does nothing; use [`try_start()`][Self::try_start]
/// to detect this. Dropping the last handle to a running deferred stream interrupts its observers
/// and disposes the run's resources.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// use event_streams::DeferredStream;
///
/// let stream = DeferredStream::<i32, ()>::values(vec![1, 2, 3]).reduce(0, |sum, v| sum + v);
///
/// let sums = Rc::new(RefCell::new(Vec::new()));
/// stream.observe_next({
///     let sums = Rc::clone(&sums);
///     move |sum| sums.borrow_mut().push(sum)
/// });
///
/// stream.start();
/// stream.start();
///
/// // Every run starts from a fresh accumulator.
/// assert_eq!(*sums.borrow(), vec![1, 3, 6, 1, 3, 6]);
/// ```
pub struct DeferredStream<V, E> {
    core: Rc<DeferredCore<V, E>>,
}

struct DeferredCore<V, E> {
    observers: RefCell<Bag<Observer<V, E>>>,

    producer: Rc<Producer<V, E>>,

    /// `Some` while running, `None` while idle.
    run: RefCell<Option<Run>>,

    next_run_id: Cell<u64>,

    /// Shared by all runs, so that a run started from a callback delivers after the one before.
    pending: DeliveryQueue<Event<V, E>>,
}

struct Run {
    id: u64,

    /// Interrupts the run's observer and releases the run's resources.
    cancel: ActionDisposable,

    resources: Rc<SerialDisposable>,
}

impl<V, E> DeferredCore<V, E> {
    /// Returns to idle if `run_id` is still the current run.
    fn end_run(&self, run_id: u64) {
        let ended = {
            let mut run = self.run.borrow_mut();

            if run.as_ref().is_some_and(|run| run.id == run_id) {
                run.take()
            } else {
                None
            }
        };

        drop(ended);
    }
}

impl<V, E> Drop for DeferredCore<V, E> {
    fn drop(&mut self) {
        let Some(run) = self.run.get_mut().take() else {
            return;
        };

        debug!(run_id = run.id, "deferred stream dropped while running");

        // The run's observer can no longer reach us, so interrupt the observers directly.
        for observer in mem::take(self.observers.get_mut()) {
            observer.send_interrupted();
        }

        run.resources.dispose();
    }
}

/// The observer a producer emits into during one run.
struct RunSink<V, E> {
    core: Weak<DeferredCore<V, E>>,

    run_id: u64,

    closed: Cell<bool>,

    resources: Rc<SerialDisposable>,
}

impl<V, E> Sink<V, E> for RunSink<V, E>
where
    V: Clone,
    E: Clone,
{
    fn receive(&self, event: Event<V, E>) {
        if self.closed.get() {
            trace!(
                run_id = self.run_id,
                kind = event.kind_name(),
                "dropped event sent after run ended"
            );
            return;
        }

        let Some(core) = self.core.upgrade() else {
            return;
        };

        let terminal = event.is_terminal();

        if terminal {
            self.closed.set(true);

            // Back to idle on acceptance, so observers may restart from their terminal callback.
            // The new run's events are queued behind this terminal event.
            core.end_run(self.run_id);

            debug!(
                run_id = self.run_id,
                kind = event.kind_name(),
                "deferred stream run ended"
            );
        }

        core.pending.push(event, |event| Observer::broadcast(&core.observers, &event));

        if terminal {
            self.resources.dispose();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get() || self.core.strong_count() == 0
    }
}

impl<V, E> DeferredStream<V, E>
where
    V: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates an idle deferred stream that runs `producer` on every [`start()`][Self::start].
    ///
    /// Whatever the producer returns is disposed when that run ends.
    pub fn new(producer: impl Fn(Observer<V, E>) -> Option<BoxedDisposable> + 'static) -> Self {
        Self {
            core: Rc::new(DeferredCore {
                observers: RefCell::new(Bag::new()),
                producer: Rc::new(producer),
                run: RefCell::new(None),
                next_run_id: Cell::new(0),
                pending: DeliveryQueue::new(),
            }),
        }
    }

    /// A deferred stream that emits `value` and completes on every run.
    #[must_use]
    pub fn value(value: V) -> Self {
        Self::new(producers::value(value))
    }

    /// A deferred stream that fails with `error` on every run.
    #[must_use]
    pub fn error(error: E) -> Self {
        Self::new(producers::error(error))
    }

    /// A deferred stream that emits every item of `values` and completes on every run.
    ///
    /// If the run is stopped while the values are being emitted (e.g. by an observer calling
    /// [`stop()`][Self::stop] in reaction to one of them), the remaining values are skipped.
    #[must_use]
    pub fn values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = V> + Clone + 'static,
    {
        Self::new(producers::values(values))
    }

    /// A deferred stream that completes without emitting anything on every run.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(producers::empty())
    }

    /// A deferred stream whose runs never emit anything and only end when stopped.
    #[must_use]
    pub fn never() -> Self {
        Self::new(producers::never())
    }

    /// Starts a run, unless one is already active, in which case this does nothing.
    pub fn start(&self) {
        if self.try_start().is_err() {
            trace!("ignored start of a deferred stream that is already running");
        }
    }

    /// Starts a run.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyRunning`] if a run is already active; the active run is not affected.
    pub fn try_start(&self) -> Result<(), AlreadyRunning> {
        if self.is_running() {
            return Err(AlreadyRunning::new());
        }

        let run_id = self.core.next_run_id.get();
        self.core.next_run_id.set(run_id.wrapping_add(1));

        let resources = Rc::new(SerialDisposable::new());

        let observer = Observer::from_sink(Rc::new(RunSink {
            core: Rc::downgrade(&self.core),
            run_id,
            closed: Cell::new(false),
            resources: Rc::clone(&resources),
        }));

        let cancel = ActionDisposable::new({
            let observer = observer.clone();
            let resources = Rc::clone(&resources);

            move || {
                observer.send_interrupted();
                resources.dispose();
            }
        });

        // Registered before the producer runs, so that the producer (or an observer reacting to
        // its first events) can already stop the run.
        *self.core.run.borrow_mut() = Some(Run {
            id: run_id,
            cancel,
            resources: Rc::clone(&resources),
        });

        debug!(run_id, "deferred stream run started");

        let producer = Rc::clone(&self.core.producer);
        resources.set((*producer)(observer));

        Ok(())
    }

    /// Attaches an observer and starts a run, returning a disposable that detaches the observer.
    ///
    /// If a run is already active, the observer joins it.
    pub fn start_with(&self, observer: Observer<V, E>) -> ActionDisposable {
        let detach = self.add(observer);
        self.start();
        detach
    }

    /// Attaches an observer, returning a disposable that detaches it again.
    ///
    /// The observer receives the events of the current run (if any) and of every later run until
    /// detached. Disposing the returned disposable affects only this one attachment.
    pub fn add(&self, observer: Observer<V, E>) -> ActionDisposable {
        let token = self.core.observers.borrow_mut().insert(observer);
        let core = Rc::downgrade(&self.core);

        ActionDisposable::new(move || {
            if let Some(core) = core.upgrade() {
                let detached = core.observers.borrow_mut().remove(token);
                drop(detached);
            }
        })
    }

    /// Attaches a callback for every event.
    pub fn observe(&self, action: impl Fn(Event<V, E>) + 'static) -> ActionDisposable {
        self.add(Observer::new(action))
    }

    /// Attaches a callback for `Next` values only.
    pub fn observe_next(&self, action: impl Fn(V) + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if let Event::Next(value) = event {
                action(value);
            }
        })
    }

    /// Attaches a callback for `Failed` only.
    pub fn observe_failed(&self, action: impl Fn(E) + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if let Event::Failed(error) = event {
                action(error);
            }
        })
    }

    /// Attaches a callback for `Completed` only.
    pub fn observe_completed(&self, action: impl Fn() + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if matches!(event, Event::Completed) {
                action();
            }
        })
    }

    /// Attaches a callback for `Interrupted` only.
    pub fn observe_interrupted(&self, action: impl Fn() + 'static) -> ActionDisposable {
        self.observe(move |event| {
            if matches!(event, Event::Interrupted) {
                action();
            }
        })
    }

    /// Derives a deferred stream by transforming, on every run, a hot stream carrying that run's
    /// events.
    ///
    /// Each run of the derived stream creates a fresh [`Stream::pipe()`], applies `transform`
    /// to it, forwards the transformed stream to the derived stream's observers and then runs
    /// this stream's producer into the pipe. The derived stream therefore has exactly one
    /// production run of the source per run of its own, and any state `transform` sets up is
    /// private to that run. Starting or stopping the derived stream does not affect this stream.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// use event_streams::DeferredStream;
    ///
    /// let words = DeferredStream::<&str, ()>::values(["a", "bb", "ccc"]);
    /// let lengths = words.lift(|stream| stream.map(str::len));
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// lengths.observe_next({
    ///     let seen = Rc::clone(&seen);
    ///     move |len| seen.borrow_mut().push(len)
    /// });
    /// lengths.start();
    ///
    /// assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    /// ```
    #[must_use]
    pub fn lift<U, F>(
        &self,
        transform: impl Fn(&Stream<V, E>) -> Stream<U, F> + 'static,
    ) -> DeferredStream<U, F>
    where
        U: Clone + 'static,
        F: Clone + 'static,
    {
        let upstream = Rc::clone(&self.core.producer);

        DeferredStream::new(move |downstream| {
            let (piped, input) = Stream::pipe();

            // Once this run ends, the source sees a closed observer and can stop emitting.
            let run_observer = downstream.clone();
            let detach = transform(&piped).add(downstream);

            let interrupt_pipe = ActionDisposable::new({
                let input = input.clone();
                move || input.send_interrupted()
            });

            let teardown = CompositeDisposable::new();

            let source_input = input.until(move || run_observer.is_closed());

            if let Some(upstream_resources) = (*upstream)(source_input) {
                teardown.add(upstream_resources);
            }

            teardown.add(Box::new(interrupt_pipe));
            teardown.add(Box::new(detach));

            Some(Box::new(teardown))
        })
    }
}

impl<V, E> DeferredStream<V, E> {
    /// Ends the active run, if any: attached observers receive `Interrupted`, the run's resources
    /// are disposed and the stream returns to idle. Observers stay attached.
    pub fn stop(&self) {
        let run = self.core.run.borrow_mut().take();

        if let Some(run) = run {
            debug!(run_id = run.id, "stopping deferred stream run");
            run.cancel.dispose();
        }
    }

    /// Whether a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.run.borrow().is_some()
    }

    /// The number of observers currently attached.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.core.observers.borrow().len()
    }
}

impl<V, E> Clone for DeferredStream<V, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<V, E> fmt::Debug for DeferredStream<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("running", &self.is_running())
            .field("observer_count", &self.observer_count())
            .finish_non_exhaustive()
    }
}
