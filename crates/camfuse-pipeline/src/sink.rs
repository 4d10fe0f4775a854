//! Terminal sink stage over a dynamic set of input channels.

use crate::handle::StageHandle;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// How long the sink blocks before re-snapshotting its input set, so
/// channels added or removed at runtime are observed promptly.
const MEMBERSHIP_POLL: Duration = Duration::from_millis(50);

/// Terminal consumer of pipeline output.
pub trait Consume: Send {
    type Item;

    /// Called once per batch: one item from each input channel that had
    /// fresh output since the last call.
    fn consume(&mut self, batch: Vec<Self::Item>);

    /// Called once when the sink thread shuts down.
    fn close(&mut self) {}
}

/// Shared, keyed set of input channels feeding one [`SinkDriver`].
///
/// The owner inserts a channel per producer and removes it when the
/// producer is evicted; the running driver picks up membership changes on
/// its next cycle.
pub struct InputSet<T> {
    inner: Arc<Mutex<Vec<(u64, flume::Receiver<T>)>>>,
}

impl<T> Clone for InputSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for InputSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InputSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn insert(&self, key: u64, rx: flume::Receiver<T>) {
        self.lock().push((key, rx));
    }

    pub fn remove(&self, key: u64) {
        self.lock().retain(|(k, _)| *k != key);
    }

    pub fn snapshot(&self) -> Vec<flume::Receiver<T>> {
        self.lock().iter().map(|(_, rx)| rx.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, flume::Receiver<T>)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Wake<T> {
    Item(usize, T),
    Stop,
    Gone,
}

/// Drives a [`Consume`] implementation on its own thread, fanning in from
/// every channel currently registered in the [`InputSet`].
pub struct SinkDriver {
    inner: StageHandle,
}

impl SinkDriver {
    pub fn spawn<S>(inputs: InputSet<S::Item>, mut sink: S) -> Self
    where
        S: Consume + 'static,
        S::Item: Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let thread = thread::spawn(move || {
            'run: loop {
                let receivers = inputs.snapshot();
                if receivers.is_empty() {
                    match stop_rx.recv_timeout(MEMBERSHIP_POLL) {
                        Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break 'run,
                        Err(flume::RecvTimeoutError::Timeout) => continue 'run,
                    }
                }

                let wake = {
                    let mut sel = flume::Selector::new().recv(&stop_rx, |_| Wake::Stop);
                    for (i, rx) in receivers.iter().enumerate() {
                        sel = sel.recv(rx, move |res| match res {
                            Ok(item) => Wake::Item(i, item),
                            Err(_) => Wake::Gone,
                        });
                    }
                    match sel.wait_timeout(MEMBERSHIP_POLL) {
                        Ok(wake) => wake,
                        Err(_) => continue 'run,
                    }
                };
                match wake {
                    Wake::Item(index, item) => {
                        let batch = collect_batch(&receivers, index, item);
                        sink.consume(batch);
                    }
                    // A producer vanished but its channel is not yet
                    // unwired; back off until the owner removes it.
                    Wake::Gone => thread::sleep(Duration::from_millis(1)),
                    Wake::Stop => break 'run,
                }
            }
            // Consume whatever is still queued on the current membership.
            let receivers = inputs.snapshot();
            loop {
                let mut batch = Vec::new();
                for rx in &receivers {
                    if let Ok(item) = rx.try_recv() {
                        batch.push(item);
                    }
                }
                if batch.is_empty() {
                    break;
                }
                sink.consume(batch);
            }
            sink.close();
        });
        Self {
            inner: StageHandle::new(stop_tx, thread),
        }
    }

    /// Signals the sink to halt, consumes queued input, and joins.
    pub fn stop(&mut self) {
        self.inner.stop();
    }
}

fn collect_batch<T>(receivers: &[flume::Receiver<T>], index: usize, item: T) -> Vec<T> {
    let mut slots: Vec<Option<T>> = receivers.iter().map(|_| None).collect();
    slots[index] = Some(item);
    for (i, rx) in receivers.iter().enumerate() {
        if slots[i].is_none() {
            if let Ok(extra) = rx.try_recv() {
                slots[i] = Some(extra);
            }
        }
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collecting {
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Consume for Collecting {
        type Item = u32;

        fn consume(&mut self, batch: Vec<u32>) {
            self.batches.lock().unwrap().push(batch);
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
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
    fn consumes_from_channels_added_at_runtime() {
        let inputs = InputSet::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let mut driver = SinkDriver::spawn(
            inputs.clone(),
            Collecting {
                batches: Arc::clone(&batches),
                closed: Arc::clone(&closed),
            },
        );

        let (tx, rx) = flume::unbounded();
        inputs.insert(1, rx);
        tx.send(11).unwrap();

        assert!(wait_for(Duration::from_secs(2), || !batches
            .lock()
            .unwrap()
            .is_empty()));
        driver.stop();

        assert_eq!(batches.lock().unwrap()[0], vec![11]);
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn removed_channel_is_no_longer_consumed() {
        let inputs = InputSet::new();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        let mut driver = SinkDriver::spawn(
            inputs.clone(),
            Collecting {
                batches: Arc::clone(&batches),
                closed: Arc::clone(&closed),
            },
        );

        let (tx, rx) = flume::unbounded();
        inputs.insert(1, rx.clone());
        tx.send(1).unwrap();
        assert!(wait_for(Duration::from_secs(2), || !batches
            .lock()
            .unwrap()
            .is_empty()));

        inputs.remove(1);
        thread::sleep(2 * MEMBERSHIP_POLL);
        tx.send(2).unwrap();
        thread::sleep(2 * MEMBERSHIP_POLL);

        // The unwired channel still holds the item; the sink never took it.
        assert_eq!(rx.try_recv(), Ok(2));
        driver.stop();
        assert_eq!(batches.lock().unwrap().len(), 1);
    }
}
