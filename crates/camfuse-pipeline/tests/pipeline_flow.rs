//! End-to-end pipeline scenarios: source through worker to sink.

use camfuse_pipeline::{Consume, Identity, InputSet, Poll, SinkDriver, SourceDriver, Worker};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct QueuePoll {
    items: Arc<Mutex<VecDeque<u32>>>,
}

impl Poll for QueuePoll {
    type Item = u32;

    fn poll(&mut self) -> Option<u32> {
        self.items.lock().ok()?.pop_front()
    }
}

struct Collecting {
    seen: Arc<Mutex<Vec<u32>>>,
}

impl Consume for Collecting {
    type Item = Vec<u32>;

    fn consume(&mut self, batch: Vec<Vec<u32>>) {
        let mut seen = self.seen.lock().unwrap();
        for group in batch {
            seen.extend(group);
        }
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn items_flow_through_identity_worker_in_order() {
    let items = Arc::new(Mutex::new((0..200).collect::<VecDeque<u32>>()));
    let (frame_tx, frame_rx) = flume::unbounded();
    let (out_tx, out_rx) = flume::unbounded();

    let mut source = SourceDriver::spawn(
        QueuePoll {
            items: Arc::clone(&items),
        },
        vec![frame_tx],
    );
    let mut worker = Worker::spawn(vec![frame_rx], vec![out_tx], Identity::<Vec<u32>>::new());

    assert!(wait_for(Duration::from_secs(5), || items
        .lock()
        .unwrap()
        .is_empty()));
    source.stop();
    worker.stop();

    let collected: Vec<u32> = out_rx.try_iter().flatten().collect();
    assert_eq!(collected, (0..200).collect::<Vec<u32>>());
}

#[test]
fn full_pipeline_delivers_everything_to_the_sink() {
    let items = Arc::new(Mutex::new((0..100).collect::<VecDeque<u32>>()));
    let (frame_tx, frame_rx) = flume::unbounded();
    let (out_tx, out_rx) = flume::unbounded();

    let inputs = InputSet::new();
    inputs.insert(0, out_rx);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut source = SourceDriver::spawn(
        QueuePoll {
            items: Arc::clone(&items),
        },
        vec![frame_tx],
    );
    let mut worker = Worker::spawn(vec![frame_rx], vec![out_tx], Identity::<Vec<u32>>::new());
    let mut sink = SinkDriver::spawn(
        inputs,
        Collecting {
            seen: Arc::clone(&seen),
        },
    );

    assert!(wait_for(Duration::from_secs(5), || seen.lock().unwrap().len() == 100));
    source.stop();
    worker.stop();
    sink.stop();

    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<u32>>());
}

#[test]
fn sink_drains_prequeued_input_on_stop() {
    let (tx, rx) = flume::unbounded();
    let inputs = InputSet::new();
    inputs.insert(0, rx);
    for i in 0..3u32 {
        tx.send(vec![i]).unwrap();
    }
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut sink = SinkDriver::spawn(
        inputs,
        Collecting {
            seen: Arc::clone(&seen),
        },
    );
    sink.stop();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}
