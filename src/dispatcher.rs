//! The event dispatcher thread.
//!
//! A single worker drains the event queue in arrival order and fires the
//! periodic tick. It blocks on the queue with the time left until the next
//! tick as timeout, so an idle pipeline does not poll.

use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::event::{DispatchMessage, Event};

/// Receiver of dispatched work. Implementations take the pipeline lock.
pub(crate) trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, event: Event);
    fn tick(&self);
}

/// Starts the dispatcher thread.
///
/// The thread holds only a weak reference to `target`, so dropping the
/// pipeline is never blocked by its own dispatcher.
pub(crate) fn spawn<T: Dispatch>(
    target: Weak<T>,
    events: Receiver<DispatchMessage>,
    tick_interval: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("omx-events".into())
        .spawn(move || run(&target, &events, tick_interval))
}

fn run<T: Dispatch>(target: &Weak<T>, events: &Receiver<DispatchMessage>, tick_interval: Duration) {
    tracing::debug!(?tick_interval, "event dispatcher started");
    let mut next_tick = Instant::now() + tick_interval;

    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        match events.recv_timeout(timeout) {
            Ok(DispatchMessage::Event(event)) => {
                let Some(target) = target.upgrade() else {
                    break;
                };
                tracing::trace!(?event, "dispatching event");
                target.dispatch(event);
            }
            Ok(DispatchMessage::Stop) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if now >= next_tick {
            let Some(target) = target.upgrade() else {
                break;
            };
            target.tick();
            next_tick += tick_interval;
            if next_tick <= now {
                // Fell behind; skip the missed ticks.
                next_tick = now + tick_interval;
            }
        }
    }

    tracing::debug!("event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRole;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        ticks: Mutex<u32>,
    }

    impl Dispatch for Recorder {
        fn dispatch(&self, event: Event) {
            self.events.lock().push(event);
        }

        fn tick(&self) {
            *self.ticks.lock() += 1;
        }
    }

    #[test]
    fn test_events_dispatched_in_order_until_stop() {
        let target = Arc::new(Recorder::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn(Arc::downgrade(&target), rx, Duration::from_secs(60)).unwrap();

        for port in [131, 191, 11] {
            tx.send(DispatchMessage::Event(Event::PortSettingsChanged { port }))
                .unwrap();
        }
        tx.send(DispatchMessage::Stop).unwrap();
        // Queued after the sentinel; never dispatched.
        tx.send(DispatchMessage::Event(Event::EndOfStream { port: 90 }))
            .unwrap();
        handle.join().unwrap();

        assert_eq!(
            *target.events.lock(),
            vec![
                Event::PortSettingsChanged { port: 131 },
                Event::PortSettingsChanged { port: 191 },
                Event::PortSettingsChanged { port: 11 },
            ]
        );
    }

    #[test]
    fn test_ticks_fire_while_idle() {
        let target = Arc::new(Recorder::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn(Arc::downgrade(&target), rx, Duration::from_millis(10)).unwrap();

        std::thread::sleep(Duration::from_millis(80));
        tx.send(DispatchMessage::Stop).unwrap();
        handle.join().unwrap();

        assert!(*target.ticks.lock() >= 2);
    }

    #[test]
    fn test_closed_queue_ends_loop() {
        let target = Arc::new(Recorder::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn(Arc::downgrade(&target), rx, Duration::from_secs(60)).unwrap();

        tx.send(DispatchMessage::Event(Event::BufferEmptied {
            role: ComponentRole::AudioRender,
        }))
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        assert_eq!(target.events.lock().len(), 1);
    }

    #[test]
    fn test_dropped_target_ends_loop() {
        let target = Arc::new(Recorder::default());
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn(Arc::downgrade(&target), rx, Duration::from_secs(60)).unwrap();
        drop(target);

        tx.send(DispatchMessage::Event(Event::EndOfStream { port: 90 }))
            .unwrap();
        handle.join().unwrap();
    }
}
