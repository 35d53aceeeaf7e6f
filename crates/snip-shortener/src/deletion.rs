//! Asynchronous, owner-scoped deletion of links.
//!
//! Requests are split into chunks and fed into one bounded queue. A fixed
//! pool of workers takes chunks off the queue and soft-deletes them through
//! the store. Every chunk is attempted exactly once; failures are logged and
//! the chunk is dropped.

use crate::error::DeletionError;
use parking_lot::Mutex;
use snip_core::{DeleteRequest, LinkStore};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_WORKERS: usize = 2;

/// Sizing of the deletion pipeline. Zero values are raised to one.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct DeletionConfig {
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    #[builder(default = DEFAULT_WORKERS)]
    pub workers: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting requests.
    Running,
    /// Refusing requests, finishing queued chunks.
    Draining,
    Stopped,
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queued chunk was handed to the store.
    Drained,
    /// The grace period ran out while `aborted` chunks were being deleted.
    /// Those chunks, and whatever was still queued, are lost.
    TimedOut { aborted: usize },
}

pub struct DeletionPipeline {
    sender: Mutex<Option<mpsc::Sender<DeleteRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Mutex<PipelineState>,
    /// Chunks a worker has taken off the queue and not finished.
    in_flight: Arc<AtomicUsize>,
    chunk_size: usize,
}

impl DeletionPipeline {
    /// Spawns the worker pool on the current Tokio runtime.
    pub fn start<S: LinkStore + ?Sized>(store: Arc<S>, config: DeletionConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let queue_capacity = config.queue_capacity.max(1);
        let worker_count = config.workers.max(1);

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&store),
                    Arc::clone(&receiver),
                    Arc::clone(&in_flight),
                ))
            })
            .collect();

        info!(
            chunk_size,
            queue_capacity,
            workers = worker_count,
            "deletion pipeline started"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            state: Mutex::new(PipelineState::Running),
            in_flight,
            chunk_size,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Queues `request` for deletion and returns without waiting.
    ///
    /// The chunks are enqueued by a background task, which waits for room
    /// when the queue is full. Fails only once shutdown has begun.
    pub fn submit(&self, request: DeleteRequest) -> Result<(), DeletionError> {
        let sender = self.sender.lock().clone().ok_or(DeletionError::Closed)?;
        if request.codes.is_empty() {
            return Ok(());
        }

        let owner = request.owner;
        let total = request.codes.len();
        let chunks = request.into_chunks(self.chunk_size);
        debug!(owner = %owner, codes = total, chunks = chunks.len(), "delete request accepted");

        tokio::spawn(async move {
            for chunk in chunks {
                if sender.send(chunk).await.is_err() {
                    warn!(owner = %owner, "deletion queue closed, dropping remaining chunks");
                    return;
                }
            }
        });
        Ok(())
    }

    /// Stops accepting requests and waits up to `grace` for the queue to drain.
    ///
    /// Workers still running when the grace period ends are aborted. Calling
    /// this again after the pipeline stopped returns `Drained` at once.
    pub async fn shutdown(&self, grace: Duration) -> DrainOutcome {
        {
            let mut sender = self.sender.lock();
            *self.state.lock() = PipelineState::Draining;
            sender.take();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        info!(grace_ms = grace.as_millis() as u64, "draining deletion pipeline");

        let joined = tokio::time::timeout(grace, async move {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!(error = %e, "deletion worker failed");
                }
            }
        })
        .await;

        let outcome = match joined {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => {
                let aborted = self.in_flight.load(Ordering::SeqCst);
                for handle in aborts.iter().filter(|h| !h.is_finished()) {
                    handle.abort();
                }
                warn!(aborted, "deletion pipeline did not drain in time");
                DrainOutcome::TimedOut { aborted }
            }
        };

        *self.state.lock() = PipelineState::Stopped;
        info!(?outcome, "deletion pipeline stopped");
        outcome
    }
}

async fn run_worker<S: LinkStore + ?Sized>(
    id: usize,
    store: Arc<S>,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<DeleteRequest>>>,
    in_flight: Arc<AtomicUsize>,
) {
    loop {
        // the lock is released before the chunk is processed
        let next = queue.lock().await.recv().await;
        let Some(chunk) = next else {
            break;
        };

        in_flight.fetch_add(1, Ordering::SeqCst);
        let result = store.delete_batch(&chunk.owner, &chunk.codes).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(deleted) => debug!(
                worker = id,
                owner = %chunk.owner,
                requested = chunk.codes.len(),
                deleted,
                "deleted chunk"
            ),
            Err(e) => error!(
                worker = id,
                owner = %chunk.owner,
                codes = chunk.codes.len(),
                error = %e,
                "failed to delete chunk, dropping it"
            ),
        }
    }
    debug!(worker = id, "deletion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snip_core::store::Result;
    use snip_core::{
        LinkRecord, NewLink, OwnerId, ReadStore, ShortCode, StorageError, StoreStats,
    };
    use snip_storage::MemoryStore;

    #[derive(Default)]
    struct RecordingStore {
        chunks: Mutex<Vec<DeleteRequest>>,
        failing: bool,
        delay: Duration,
    }

    impl RecordingStore {
        fn sizes(&self) -> Vec<usize> {
            let mut sizes: Vec<_> = self.chunks.lock().iter().map(|c| c.codes.len()).collect();
            sizes.sort_unstable();
            sizes
        }
    }

    #[async_trait]
    impl ReadStore for RecordingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn get_all_by_owner(&self, _owner: &OwnerId) -> Result<Vec<LinkRecord>> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    #[async_trait]
    impl LinkStore for RecordingStore {
        async fn save(
            &self,
            _original_url: &str,
            code: &ShortCode,
            _owner: Option<&OwnerId>,
        ) -> Result<ShortCode> {
            Ok(code.clone())
        }

        async fn save_batch(
            &self,
            links: &[NewLink],
            _owner: Option<&OwnerId>,
        ) -> Result<Vec<ShortCode>> {
            Ok(links.iter().map(|link| link.short_code.clone()).collect())
        }

        async fn delete_batch(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<u64> {
            tokio::time::sleep(self.delay).await;
            self.chunks
                .lock()
                .push(DeleteRequest::new(*owner, codes.to_vec()));
            if self.failing {
                return Err(StorageError::Unavailable("store is down".to_string()));
            }
            Ok(codes.len() as u64)
        }
    }

    fn codes(n: usize) -> Vec<ShortCode> {
        (0..n)
            .map(|i| ShortCode::from_url(&format!("https://example.com/{i}")))
            .collect()
    }

    #[tokio::test]
    async fn requests_are_chunked_and_drained() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = DeletionPipeline::start(Arc::clone(&store), DeletionConfig::default());
        let owner = OwnerId::random();

        pipeline
            .submit(DeleteRequest::new(owner, codes(250)))
            .unwrap();
        let outcome = pipeline.shutdown(Duration::from_secs(5)).await;

        assert_eq!(outcome, DrainOutcome::Drained);
        assert_eq!(store.sizes(), vec![50, 100, 100]);
        assert!(store.chunks.lock().iter().all(|chunk| chunk.owner == owner));
    }

    // awaitility sleeps the polling thread, so the workers need another one
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deleted_link_becomes_gone_eventually() {
        let store = Arc::new(MemoryStore::new());
        let owner = OwnerId::random();
        let code = ShortCode::from_url("https://ya.ru");
        store.save("https://ya.ru", &code, Some(&owner)).await.unwrap();
        let pipeline = DeletionPipeline::start(Arc::clone(&store), DeletionConfig::default());

        pipeline
            .submit(DeleteRequest::new(owner, vec![code.clone()]))
            .unwrap();

        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .until_async(|| async {
                matches!(
                    store.get(code.as_str()).await,
                    Err(StorageError::AlreadyDeleted(_))
                )
            })
            .await;
        assert_eq!(pipeline.shutdown(Duration::from_secs(1)).await, DrainOutcome::Drained);
    }

    #[tokio::test]
    async fn failed_chunk_is_tried_once_and_workers_keep_going() {
        let store = Arc::new(RecordingStore {
            failing: true,
            ..Default::default()
        });
        let config = DeletionConfig::builder().chunk_size(10).workers(1).build();
        let pipeline = DeletionPipeline::start(Arc::clone(&store), config);

        pipeline
            .submit(DeleteRequest::new(OwnerId::random(), codes(10)))
            .unwrap();
        pipeline
            .submit(DeleteRequest::new(OwnerId::random(), codes(5)))
            .unwrap();

        assert_eq!(pipeline.shutdown(Duration::from_secs(5)).await, DrainOutcome::Drained);
        assert_eq!(store.sizes(), vec![5, 10]);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pipeline =
            DeletionPipeline::start(Arc::new(RecordingStore::default()), DeletionConfig::default());
        assert_eq!(pipeline.state(), PipelineState::Running);

        pipeline.shutdown(Duration::from_secs(1)).await;

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        let err = pipeline
            .submit(DeleteRequest::new(OwnerId::random(), codes(1)))
            .unwrap_err();
        assert_eq!(err, DeletionError::Closed);
    }

    #[tokio::test]
    async fn second_shutdown_is_a_no_op() {
        let pipeline =
            DeletionPipeline::start(Arc::new(RecordingStore::default()), DeletionConfig::default());

        assert_eq!(pipeline.shutdown(Duration::from_secs(1)).await, DrainOutcome::Drained);
        assert_eq!(pipeline.shutdown(Duration::from_secs(1)).await, DrainOutcome::Drained);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn empty_request_is_accepted() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = DeletionPipeline::start(Arc::clone(&store), DeletionConfig::default());

        pipeline
            .submit(DeleteRequest::new(OwnerId::random(), Vec::new()))
            .unwrap();

        assert_eq!(pipeline.shutdown(Duration::from_secs(1)).await, DrainOutcome::Drained);
        assert!(store.chunks.lock().is_empty());
    }

    #[tokio::test]
    async fn submit_returns_while_queue_is_full() {
        let store = Arc::new(RecordingStore {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let config = DeletionConfig::builder()
            .chunk_size(1)
            .queue_capacity(1)
            .workers(1)
            .build();
        let pipeline = DeletionPipeline::start(Arc::clone(&store), config);

        let started = std::time::Instant::now();
        for _ in 0..5 {
            pipeline
                .submit(DeleteRequest::new(OwnerId::random(), codes(3)))
                .unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        let outcome = pipeline.shutdown(Duration::from_millis(100)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut { aborted: 1 });
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_counts_only_chunks_in_flight() {
        let store = Arc::new(RecordingStore {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let config = DeletionConfig::builder().chunk_size(1).workers(4).build();
        let pipeline = DeletionPipeline::start(Arc::clone(&store), config);

        pipeline
            .submit(DeleteRequest::new(OwnerId::random(), codes(2)))
            .unwrap();
        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .until(|| pipeline.in_flight.load(Ordering::SeqCst) == 2);

        let outcome = pipeline.shutdown(Duration::from_millis(100)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut { aborted: 2 });
    }
}
