//! Example demonstrating a hot stream driven by hand and fanned out through operators.
//!
//! Stream diagnostics are logged via `tracing`; this example prints all of them to stderr.

use event_streams::{Event, Stream};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();

    let (readings, sensor) = Stream::<i32, String>::pipe();

    let (valid, invalid) = readings.partition(|reading| *reading >= 0);
    let running_total = valid.reduce(0, |total, reading| total + reading);

    running_total.observe(|event| match event {
        Event::Next(total) => println!("Running total: {total}"),
        Event::Failed(error) => println!("Sensor failed: {error}"),
        Event::Completed => println!("Sensor finished"),
        Event::Interrupted => println!("Sensor was interrupted"),
    });

    invalid.observe_next(|reading| println!("Rejected reading: {reading}"));

    for reading in [4, -1, 6, 3] {
        sensor.send_next(reading);
    }
    sensor.send_completed();

    // The stream has terminated, so late observers are interrupted right away.
    readings.observe_interrupted(|| println!("Late observer was interrupted"));
}
