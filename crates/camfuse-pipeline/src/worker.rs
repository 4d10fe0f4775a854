//! Worker stage: channels in, chain, channels out.

use crate::chain::Transform;
use crate::handle::StageHandle;
use std::thread;

enum Wake<I> {
    Item(usize, I),
    Stop,
}

/// Applies a transform chain to batches collected from its input channels
/// and publishes each result to every output channel.
///
/// The worker blocks until any input has an item (or stop is signalled),
/// then opportunistically collects one item from each other input to
/// complete the batch — a best-effort join with no cross-channel temporal
/// alignment guarantee. Chain failure drops the batch and the loop carries
/// on. On stop (or when an input disconnects) the worker drains and
/// processes everything still queued before exiting, so items accepted
/// before `stop()` are always published.
pub struct Worker {
    inner: StageHandle,
}

impl Worker {
    pub fn spawn<I, C>(
        inputs: Vec<flume::Receiver<I>>,
        outputs: Vec<flume::Sender<C::Output>>,
        mut chain: C,
    ) -> Self
    where
        I: Send + 'static,
        C: Transform<Input = Vec<I>> + 'static,
        C::Output: Clone + Send + 'static,
    {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let thread = thread::spawn(move || {
            loop {
                let wake = {
                    let mut sel = flume::Selector::new().recv(&stop_rx, |_| Wake::Stop);
                    for (i, rx) in inputs.iter().enumerate() {
                        sel = sel.recv(rx, move |res| match res {
                            Ok(item) => Wake::Item(i, item),
                            Err(_) => Wake::Stop,
                        });
                    }
                    sel.wait()
                };
                match wake {
                    Wake::Item(index, item) => {
                        let batch = collect_batch(&inputs, Some((index, item)));
                        run_chain(&mut chain, batch, &outputs);
                    }
                    Wake::Stop => break,
                }
            }
            // Drain everything still queued, preserving arrival order.
            loop {
                let batch = collect_batch(&inputs, None);
                if batch.is_empty() {
                    break;
                }
                run_chain(&mut chain, batch, &outputs);
            }
        });
        Self {
            inner: StageHandle::new(stop_tx, thread),
        }
    }

    /// Signals the worker to halt, drains queued input, and joins.
    pub fn stop(&mut self) {
        self.inner.stop();
    }
}

/// One item per input channel, skipping channels with nothing ready.
fn collect_batch<I>(inputs: &[flume::Receiver<I>], first: Option<(usize, I)>) -> Vec<I> {
    let mut slots: Vec<Option<I>> = inputs.iter().map(|_| None).collect();
    if let Some((index, item)) = first {
        slots[index] = Some(item);
    }
    for (i, rx) in inputs.iter().enumerate() {
        if slots[i].is_none() {
            if let Ok(item) = rx.try_recv() {
                slots[i] = Some(item);
            }
        }
    }
    slots.into_iter().flatten().collect()
}

fn run_chain<I, C>(chain: &mut C, batch: Vec<I>, outputs: &[flume::Sender<C::Output>])
where
    C: Transform<Input = Vec<I>>,
    C::Output: Clone,
{
    match chain.apply(batch) {
        Ok(result) => {
            for tx in outputs {
                let _ = tx.send(result.clone());
            }
        }
        Err(e) => log::debug!("chain failed, dropping batch: {e}"),
    }
}
