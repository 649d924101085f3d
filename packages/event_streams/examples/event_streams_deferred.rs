//! Example demonstrating a deferred stream that is started, stopped and restarted.
//!
//! Every run invokes the producer afresh, so the running total starts from zero each time.

use event_streams::{ActionDisposable, BoxedDisposable, DeferredStream};

fn main() {
    let ticks = DeferredStream::<u32, ()>::new(|observer| {
        println!("Producer started");

        for tick in 1..=3 {
            observer.send_next(tick);
        }

        // Keep the run open until it is stopped.
        Some(Box::new(ActionDisposable::new(|| println!("Producer resources released")))
            as BoxedDisposable)
    });

    let totals = ticks.reduce(0, |total, tick| total + tick);

    totals.observe_next(|total| println!("Total so far: {total}"));
    totals.observe_interrupted(|| println!("Run stopped"));

    println!("First run:");
    totals.start();
    totals.stop();

    println!("Second run:");
    totals.start();

    if let Err(error) = totals.try_start() {
        println!("Could not start again: {error}");
    }

    totals.stop();
}
