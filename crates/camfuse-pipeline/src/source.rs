//! Source drivers.
//!
//! A [`Poll`] implementation is the acquisition seam: each call returns one
//! new item or `None` when the device has nothing ready. A [`SourceDriver`]
//! polls it continuously on a dedicated thread; a [`PeriodicDriver`] polls
//! it at a fixed, live-retunable rate, dispatching each acquisition on its
//! own thread so a slow device never delays the next tick.

use crate::handle::StageHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Polled producer of raw pipeline items.
pub trait Poll: Send {
    type Item;

    /// Returns one new item, or `None` if nothing is ready this call.
    fn poll(&mut self) -> Option<Self::Item>;

    /// Called once when the driving thread shuts down.
    fn close(&mut self) {}
}

fn publish<T: Clone>(outputs: &[flume::Sender<T>], item: T) {
    for tx in outputs {
        let _ = tx.send(item.clone());
    }
}

/// Drives a [`Poll`] source in a tight loop, publishing every item to all
/// output channels. `stop()` lets the in-flight poll finish and publish
/// before returning.
pub struct SourceDriver {
    inner: StageHandle,
}

impl SourceDriver {
    pub fn spawn<P>(mut poller: P, outputs: Vec<flume::Sender<P::Item>>) -> Self
    where
        P: Poll + 'static,
        P::Item: Clone + Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let thread = thread::spawn(move || {
            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(flume::TryRecvError::Disconnected) => break,
                    Err(flume::TryRecvError::Empty) => {}
                }
                match poller.poll() {
                    Some(item) => publish(&outputs, item),
                    None => thread::yield_now(),
                }
            }
            poller.close();
        });
        Self {
            inner: StageHandle::new(stop_tx, thread),
        }
    }

    /// Signals the driver to halt and joins its thread.
    pub fn stop(&mut self) {
        self.inner.stop();
    }
}

/// Drives a [`Poll`] source at a target period.
///
/// The scheduler thread sleeps one period (interruptible by `stop()`), then
/// dispatches a single poll-and-publish on a fresh thread. Ticks are never
/// delayed by a slow acquisition; drift beyond the device's true capture
/// latency is accepted. `stop()` prevents further dispatch and joins every
/// outstanding dispatch thread, so already-started acquisitions still
/// publish before it returns.
pub struct PeriodicDriver {
    period_nanos: Arc<AtomicU64>,
    inner: StageHandle,
}

impl PeriodicDriver {
    pub fn spawn<P>(poller: P, outputs: Vec<flume::Sender<P::Item>>, period: Duration) -> Self
    where
        P: Poll + 'static,
        P::Item: Clone + Send + 'static,
    {
        let period_nanos = Arc::new(AtomicU64::new(period.as_nanos() as u64));
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let shared = Arc::new(Mutex::new(poller));

        let thread = thread::spawn({
            let period_nanos = Arc::clone(&period_nanos);
            move || {
                let mut dispatched: Vec<thread::JoinHandle<()>> = Vec::new();
                loop {
                    let poller = Arc::clone(&shared);
                    let outputs = outputs.clone();
                    dispatched.push(thread::spawn(move || {
                        let item = match poller.lock() {
                            Ok(mut poller) => poller.poll(),
                            Err(_) => None,
                        };
                        if let Some(item) = item {
                            publish(&outputs, item);
                        }
                    }));

                    let (done, pending): (Vec<_>, Vec<_>) =
                        dispatched.into_iter().partition(|h| h.is_finished());
                    for handle in done {
                        let _ = handle.join();
                    }
                    dispatched = pending;

                    let period = Duration::from_nanos(period_nanos.load(Ordering::Relaxed));
                    match stop_rx.recv_timeout(period) {
                        Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
                        Err(flume::RecvTimeoutError::Timeout) => {}
                    }
                }
                for handle in dispatched {
                    let _ = handle.join();
                }
                if let Ok(mut poller) = shared.lock() {
                    poller.close();
                }
            }
        });

        Self {
            period_nanos,
            inner: StageHandle::new(stop_tx, thread),
        }
    }

    /// Retunes the tick period; takes effect from the next tick, without
    /// restarting acquisition.
    pub fn set_period(&self, period: Duration) {
        self.period_nanos
            .store(period.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Signals the scheduler to halt, then joins it and every outstanding
    /// dispatch thread.
    pub fn stop(&mut self) {
        self.inner.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct QueuePoll {
        items: Arc<Mutex<VecDeque<u32>>>,
    }

    impl Poll for QueuePoll {
        type Item = u32;

        fn poll(&mut self) -> Option<u32> {
            self.items.lock().ok()?.pop_front()
        }
    }

    fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn continuous_driver_publishes_all_items_in_order() {
        let items = Arc::new(Mutex::new((0..50).collect::<VecDeque<u32>>()));
        let (tx, rx) = flume::unbounded();
        let mut driver = SourceDriver::spawn(
            QueuePoll {
                items: Arc::clone(&items),
            },
            vec![tx],
        );

        assert!(wait_for(Duration::from_secs(2), || items
            .lock()
            .unwrap()
            .is_empty()));
        driver.stop();

        let collected: Vec<u32> = rx.try_iter().collect();
        assert_eq!(collected, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn periodic_driver_polls_once_per_tick() {
        let items = Arc::new(Mutex::new((0..5).collect::<VecDeque<u32>>()));
        let (tx, rx) = flume::unbounded();
        let mut driver = PeriodicDriver::spawn(
            QueuePoll {
                items: Arc::clone(&items),
            },
            vec![tx],
            Duration::from_millis(10),
        );

        assert!(wait_for(Duration::from_secs(2), || items
            .lock()
            .unwrap()
            .is_empty()));
        driver.stop();

        let collected: Vec<u32> = rx.try_iter().collect();
        assert_eq!(collected, (0..5).collect::<Vec<u32>>());
    }

    struct SlowPoll {
        fired: bool,
    }

    impl Poll for SlowPoll {
        type Item = u32;

        fn poll(&mut self) -> Option<u32> {
            if self.fired {
                return None;
            }
            self.fired = true;
            thread::sleep(Duration::from_millis(150));
            Some(42)
        }
    }

    #[test]
    fn stop_waits_for_dispatched_acquisition_and_keeps_its_output() {
        let (tx, rx) = flume::unbounded();
        let mut driver =
            PeriodicDriver::spawn(SlowPoll { fired: false }, vec![tx], Duration::from_millis(10));

        // First dispatch is in flight and slower than the stop request.
        thread::sleep(Duration::from_millis(30));
        driver.stop();

        assert_eq!(rx.try_recv(), Ok(42));
    }
}
