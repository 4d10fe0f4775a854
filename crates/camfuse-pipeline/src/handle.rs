use std::thread;

/// Stop signal plus join handle for a stage thread.
///
/// `stop()` is idempotent and safe to call from any thread; it returns once
/// the stage thread has exited.
pub(crate) struct StageHandle {
    stop_tx: flume::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StageHandle {
    pub(crate) fn new(stop_tx: flume::Sender<()>, thread: thread::JoinHandle<()>) -> Self {
        Self {
            stop_tx,
            thread: Some(thread),
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.stop_tx.try_send(());
            if thread.join().is_err() {
                log::error!("pipeline stage thread panicked");
            }
        }
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
