use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use eyre::{Result, WrapErr};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{error, trace};

use crate::cache::SourceIdList;
use crate::format::{AnyData, FormatOps};
use crate::registry::TypeRef;
use crate::source::SourceList;
use crate::ticket::LoadTicket;

pub(crate) type DecodeResult = Result<Vec<Box<dyn AnyData>>>;

/// Decode work shipped to the worker pool: read each contributing
/// source's bytes and decode them. Touches nothing but its own inputs;
/// the oneshot data promise is the only handoff back.
pub(crate) struct DecodeJob {
    path: Arc<str>,
    sources: SourceList,
    ops: FormatOps,
    result: oneshot::Sender<DecodeResult>,
}

impl DecodeJob {
    fn execute(self) {
        let DecodeJob {
            path,
            sources,
            ops,
            result,
        } = self;

        let outcome = decode_sources(&path, &sources, &ops);
        if let Err(error) = &outcome {
            error!(?error, path = %path, "async decode failed");
        }

        let _ = result.send(outcome);
    }
}

pub(crate) fn decode_sources(path: &str, sources: &SourceList, ops: &FormatOps) -> DecodeResult {
    let mut datas = Vec::with_capacity(sources.len());

    for source in sources {
        let bytes = source
            .store()
            .read_bytes(path)
            .wrap_err_with(|| format!("cannot read {} from source {}", path, source.name()))?;
        datas.push(ops.decode(bytes, path)?);
    }

    Ok(datas)
}

/// An async load awaiting completion: the data promise plus everything
/// the pump needs to finish construction on the owning thread.
pub(crate) struct PendingLoad {
    pub ty: TypeRef,
    pub path: Arc<str>,
    pub source_ids: SourceIdList,
    pub data_rx: oneshot::Receiver<DecodeResult>,
    pub ticket: LoadTicket,
}

/// FIFO completion queue for one asset kind. Completions apply strictly
/// in submission order; an unready head blocks the rest of its queue.
#[derive(Default)]
pub(crate) struct PendingQueue {
    queue: VecDeque<PendingLoad>,
}

impl PendingQueue {
    pub fn new() -> PendingQueue {
        PendingQueue::default()
    }

    pub fn push(&mut self, pending: PendingLoad) {
        self.queue.push_back(pending);
    }

    /// Pops the head if its data promise has resolved. `None` means the
    /// queue is empty or the head is still decoding. A dropped promise
    /// (worker shutdown) pops with a `None` result.
    pub fn pop_ready(&mut self) -> Option<(PendingLoad, Option<DecodeResult>)> {
        let head = self.queue.front_mut()?;

        let result = match head.data_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => None,
        };

        self.queue.pop_front().map(|pending| (pending, result))
    }
}

#[derive(Debug)]
pub(crate) struct Workers {
    sender: UnboundedSender<DecodeJob>,
}

impl Workers {
    pub fn submit(
        &self,
        path: Arc<str>,
        sources: SourceList,
        ops: FormatOps,
    ) -> oneshot::Receiver<DecodeResult> {
        trace!(path = %path, "decode job submitted");
        let (tx, rx) = oneshot::channel();
        let _ = self.sender.send(DecodeJob {
            path,
            sources,
            ops,
            result: tx,
        });
        rx
    }
}

/// Spawns the decode worker pool: a dispatch thread owning a tokio
/// runtime, fed by an unbounded job channel. Dropping the returned
/// handle closes the channel and winds the pool down.
pub(crate) fn spawn_workers(threads: usize) -> Workers {
    let (sender, mut receiver) = unbounded_channel::<DecodeJob>();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name_fn(|| {
            static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
            let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
            format!("assets-{}", id)
        })
        .build()
        .expect("failed to create tokio runtime");

    thread::Builder::new()
        .name("assets".into())
        .spawn(move || {
            let rt = &runtime;
            runtime.block_on(async move {
                while let Some(job) = receiver.recv().await {
                    rt.spawn(async move { job.execute() });
                }
            });
        })
        .expect("failed to spawn thread");

    Workers { sender }
}
