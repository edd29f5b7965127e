use super::cancel::StopToken;
use super::channel::RecordChannel;
use super::config::IngestionConfig;
use super::worker::{self, ExitReason, WorkerContext, WorkerReport, WorkerSettings, WorkerSlot};
use crate::error::{IngestError, Result};
use crate::Core::pool::{PooledRecord, RecordPool};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Engine lifecycle: `Stopped -> Running -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

struct WorkerHandle {
    slot: Arc<WorkerSlot>,
    thread: Option<JoinHandle<()>>,
}

struct Lifecycle {
    state: EngineState,
    stop: StopToken,
    workers: Vec<WorkerHandle>,
}

impl Lifecycle {
    /// Signal and join every worker thread still attached.
    fn shutdown(&mut self) {
        self.stop.stop();
        for handle in &mut self.workers {
            if let Some(thread) = handle.thread.take() {
                if thread.join().is_err() {
                    warn!(worker = handle.slot.id(), "ingestion worker panicked");
                    handle
                        .slot
                        .finish(ExitReason::Failed("worker thread panicked".into()));
                }
            }
        }
        self.state = EngineState::Stopped;
    }
}

/// Owns the record pool, the shared queue and the worker threads, and hands
/// ingested records to a consumer.
///
/// All methods take `&self`; the engine may be shared behind an `Arc`.
/// Dropping the engine stops it.
pub struct IngestionEngine {
    config: IngestionConfig,
    settings: Arc<WorkerSettings>,
    pool: RecordPool,
    channel: Arc<RecordChannel>,
    lifecycle: Mutex<Lifecycle>,
}

impl IngestionEngine {
    /// Validate `config` and create a stopped engine. No thread or socket is
    /// created until [`start`](Self::start).
    pub fn new(config: IngestionConfig) -> Result<Self> {
        let addr = config.validate()?;
        let settings = Arc::new(WorkerSettings {
            addr,
            read_buffer_size: config.read_buffer_size,
            recv_buffer_size: config.recv_buffer_size,
            poll_timeout: config.poll_timeout,
            max_frame_len: config.max_frame_len,
            sentinel: config.sentinel.clone(),
        });

        Ok(Self {
            pool: RecordPool::with_batch_size(config.pool_batch_size),
            channel: Arc::new(RecordChannel::new()),
            settings,
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::Stopped,
                stop: StopToken::new(),
                workers: Vec::new(),
            }),
        })
    }

    /// Spawn one worker per configured core.
    ///
    /// Fails with [`IngestError::AlreadyRunning`] if the engine is running.
    /// Reports from a previous run are discarded.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == EngineState::Running {
            return Err(IngestError::AlreadyRunning);
        }

        let stop = StopToken::new();
        lifecycle.stop = stop.clone();
        lifecycle.workers.clear();

        for (id, &core) in self.config.affinity_cores.iter().enumerate() {
            let slot = Arc::new(WorkerSlot::new(id, core));
            let ctx = WorkerContext {
                slot: Arc::clone(&slot),
                settings: Arc::clone(&self.settings),
                pool: self.pool.clone(),
                channel: Arc::clone(&self.channel),
                stop: stop.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("ingest-{id}"))
                .spawn(move || worker::run(ctx));
            match spawned {
                Ok(thread) => lifecycle.workers.push(WorkerHandle {
                    slot,
                    thread: Some(thread),
                }),
                Err(e) => {
                    lifecycle.shutdown();
                    return Err(IngestError::Spawn(e));
                }
            }
        }

        lifecycle.state = EngineState::Running;
        info!(
            addr = %self.settings.addr,
            workers = lifecycle.workers.len(),
            "data ingestion started"
        );
        Ok(())
    }

    /// Signal every worker, join their threads and return to `Stopped`.
    /// Safe to call repeatedly, and on an engine that never started.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == EngineState::Stopped {
            return;
        }
        lifecycle.shutdown();
        info!("data ingestion stopped");
    }

    /// Take the oldest ingested record, if any. Never blocks.
    ///
    /// Dropping the returned handle recycles the record into the pool.
    #[inline]
    pub fn get_data(&self) -> Option<PooledRecord> {
        self.channel.try_recv()
    }

    /// Like [`get_data`](Self::get_data), but waits up to `timeout` for a record.
    pub fn get_data_timeout(&self, timeout: Duration) -> Option<PooledRecord> {
        self.channel.recv_timeout(timeout)
    }

    /// Move every currently visible record into `out`. Returns how many moved.
    pub fn drain_into(&self, out: &mut Vec<PooledRecord>) -> usize {
        let before = out.len();
        while let Some(record) = self.channel.try_recv() {
            out.push(record);
        }
        out.len() - before
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Workers of the current run that have not finished yet.
    pub fn active_workers(&self) -> usize {
        self.lifecycle
            .lock()
            .workers
            .iter()
            .filter(|w| !w.slot.is_finished())
            .count()
    }

    /// Status of each worker of the current (or last) run.
    pub fn worker_reports(&self) -> Vec<WorkerReport> {
        self.lifecycle
            .lock()
            .workers
            .iter()
            .map(|w| w.slot.report())
            .collect()
    }

    /// Approximate number of records waiting for the consumer.
    pub fn queued(&self) -> usize {
        self.channel.len()
    }

    pub fn pool(&self) -> &RecordPool {
        &self.pool
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.settings.addr
    }
}

impl Drop for IngestionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for IngestionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ingestion_engine(self, f)
    }
}
