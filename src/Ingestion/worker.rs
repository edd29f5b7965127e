// Ingestion worker: one pinned thread, one non-blocking connection, one epoll loop

use super::cancel::StopToken;
use super::channel::RecordChannel;
use super::framer::{FeedOutcome, Framer};
use crate::error::{IngestError, Result};
use crate::Core::affinity;
use crate::Core::epoll::{Epoll, Events, Interest};
use crate::Core::pool::{PooledRecord, RecordPool};
use crate::Structs::Record_Structs::now_millis;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SOCKET_TOKEN: u64 = 1;
const MAX_EVENTS: usize = 64;

/// Why a worker's event loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The source sent the sentinel frame.
    Sentinel,
    /// The source closed the connection.
    PeerClosed,
    /// The engine asked the worker to stop.
    Cancelled,
    /// Connection or I/O failure; the message describes it.
    Failed(String),
}

/// Lifecycle of a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Connecting,
    Connected,
    Finished(ExitReason),
}

impl WorkerState {
    pub fn is_finished(&self) -> bool {
        matches!(self, WorkerState::Finished(_))
    }
}

/// Snapshot of one worker, as returned by
/// [`IngestionEngine::worker_reports`](crate::IngestionEngine::worker_reports).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub core: usize,
    /// Whether pinning to `core` succeeded.
    pub pinned: bool,
    pub state: WorkerState,
    pub records: u64,
    pub bytes: u64,
}

/// Status shared between a worker thread and the engine.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    id: usize,
    core: usize,
    pinned: AtomicBool,
    state: Mutex<WorkerState>,
    records: CachePadded<AtomicU64>,
    bytes: CachePadded<AtomicU64>,
}

impl WorkerSlot {
    pub(crate) fn new(id: usize, core: usize) -> Self {
        Self {
            id,
            core,
            pinned: AtomicBool::new(false),
            state: Mutex::new(WorkerState::Starting),
            records: CachePadded::new(AtomicU64::new(0)),
            bytes: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    /// Record the exit reason unless one was already recorded.
    pub(crate) fn finish(&self, reason: ExitReason) {
        let mut state = self.state.lock();
        if !state.is_finished() {
            *state = WorkerState::Finished(reason);
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().is_finished()
    }

    pub(crate) fn report(&self) -> WorkerReport {
        WorkerReport {
            id: self.id,
            core: self.core,
            pinned: self.pinned.load(Ordering::Acquire),
            state: self.state.lock().clone(),
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Per-worker tunables copied out of the engine config.
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub addr: SocketAddr,
    pub read_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub poll_timeout: Duration,
    pub max_frame_len: usize,
    pub sentinel: Vec<u8>,
}

/// Everything a worker thread needs; moved into the thread at spawn.
pub(crate) struct WorkerContext {
    pub slot: Arc<WorkerSlot>,
    pub settings: Arc<WorkerSettings>,
    pub pool: RecordPool,
    pub channel: Arc<RecordChannel>,
    pub stop: StopToken,
}

/// Thread entry point. The outcome, including a panic, lands in the slot.
pub(crate) fn run(ctx: WorkerContext) {
    let slot = Arc::clone(&ctx.slot);
    supervise(&slot, move || {
        let id = ctx.slot.id;
        let core = ctx.slot.core;

        match affinity::pin_current_thread(core) {
            Ok(()) => {
                ctx.slot.pinned.store(true, Ordering::Release);
                info!(worker = id, core, cpu = ?affinity::current_cpu(), "ingestion thread pinned");
            }
            Err(e) => warn!(worker = id, core, error = %e, "failed to pin ingestion thread; running unpinned"),
        }

        match Worker::connect(ctx) {
            Ok(mut worker) => match worker.event_loop() {
                Ok(reason) => reason,
                Err(e) => ExitReason::Failed(e.to_string()),
            },
            Err(e) => ExitReason::Failed(e.to_string()),
        }
    });
}

/// Run `body` and record how it ended in `slot`. A panic is recorded as
/// `ExitReason::Failed`.
fn supervise<F>(slot: &WorkerSlot, body: F)
where
    F: FnOnce() -> ExitReason,
{
    let id = slot.id;
    let reason = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(reason) => reason,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ExitReason::Failed(format!("worker thread panicked: {msg}"))
        }
    };

    match &reason {
        ExitReason::Failed(msg) => error!(worker = id, error = %msg, "ingestion worker failed"),
        other => info!(worker = id, reason = ?other, "ingestion worker stopped"),
    }
    slot.finish(reason);
}

struct Worker {
    ctx: WorkerContext,
    socket: Socket,
    epoll: Epoll,
    events: Events,
    connecting: bool,
    read_buf: Box<[u8]>,
    framer: Framer,
    batch: Vec<PooledRecord>,
    last_stamp: u64,
}

impl Worker {
    /// Open the socket, start a non-blocking connect and register it.
    fn connect(ctx: WorkerContext) -> Result<Self> {
        let settings = Arc::clone(&ctx.settings);
        let addr = settings.addr;
        let id = ctx.slot.id;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if let Err(e) = socket.set_recv_buffer_size(settings.recv_buffer_size) {
            warn!(worker = id, error = %e, "failed to set SO_RCVBUF");
        }

        let connecting = match socket.connect(&addr.into()) {
            Ok(()) => false,
            Err(e)
                if e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                true
            }
            Err(source) => return Err(IngestError::Connect { addr, source }),
        };

        let epoll = Epoll::new()?;
        let interest = if connecting {
            Interest::Writable
        } else {
            Interest::Readable
        };
        epoll.add(socket.as_raw_fd(), interest, SOCKET_TOKEN)?;

        if connecting {
            debug!(worker = id, %addr, "connection in progress");
            ctx.slot.set_state(WorkerState::Connecting);
        } else {
            info!(worker = id, %addr, "connected immediately");
            ctx.slot.set_state(WorkerState::Connected);
        }

        Ok(Self {
            socket,
            epoll,
            events: Events::with_capacity(MAX_EVENTS),
            connecting,
            read_buf: vec![0u8; settings.read_buffer_size].into_boxed_slice(),
            framer: Framer::new(&settings.sentinel, settings.max_frame_len),
            batch: Vec::new(),
            last_stamp: 0,
            ctx,
        })
    }

    fn event_loop(&mut self) -> Result<ExitReason> {
        let timeout = self.ctx.settings.poll_timeout;

        while !self.ctx.stop.is_stopped() {
            let n = self.epoll.wait(&mut self.events, timeout)?;
            for i in 0..n {
                let Some(ready) = self.events.get(i) else {
                    break;
                };
                if ready.token != SOCKET_TOKEN {
                    continue;
                }

                if self.connecting {
                    if !(ready.writable || ready.error || ready.hangup) {
                        continue;
                    }
                    self.finish_connect()?;
                    // Data may already be waiting; drain instead of relying on
                    // the re-armed edge.
                    if let Some(reason) = self.drain()? {
                        return Ok(reason);
                    }
                    continue;
                }

                if ready.readable || ready.error || ready.hangup {
                    if let Some(reason) = self.drain()? {
                        return Ok(reason);
                    }
                }
            }
        }
        Ok(ExitReason::Cancelled)
    }

    /// Resolve a pending non-blocking connect and switch to read interest.
    fn finish_connect(&mut self) -> Result<()> {
        let addr = self.ctx.settings.addr;
        if let Some(source) = self.socket.take_error()? {
            return Err(IngestError::Connect { addr, source });
        }
        self.epoll
            .modify(self.socket.as_raw_fd(), Interest::Readable, SOCKET_TOKEN)?;
        self.connecting = false;
        self.ctx.slot.set_state(WorkerState::Connected);
        info!(worker = self.ctx.slot.id, %addr, "connected to data source");
        Ok(())
    }

    /// Read until the socket would block. Returns an exit reason when the
    /// stream ended.
    fn drain(&mut self) -> Result<Option<ExitReason>> {
        loop {
            if self.ctx.stop.is_stopped() {
                return Ok(Some(ExitReason::Cancelled));
            }
            match (&self.socket).read(&mut self.read_buf) {
                Ok(0) => {
                    info!(worker = self.ctx.slot.id, "data source closed the connection");
                    return Ok(Some(ExitReason::PeerClosed));
                }
                Ok(n) => {
                    if self.ingest(n)? == FeedOutcome::Sentinel {
                        info!(worker = self.ctx.slot.id, "received sentinel; terminating ingestion");
                        return Ok(Some(ExitReason::Sentinel));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Frame the first `n` bytes of the read buffer and publish them as one batch.
    fn ingest(&mut self, n: usize) -> Result<FeedOutcome> {
        let Self {
            ctx,
            read_buf,
            framer,
            batch,
            last_stamp,
            ..
        } = self;

        let outcome = framer.feed(&read_buf[..n], |frame| {
            let stamp = now_millis().max(*last_stamp);
            *last_stamp = stamp;
            let mut record = ctx.pool.acquire();
            record.fill(stamp, frame);
            batch.push(record);
        });

        let published = ctx.channel.publish(batch.drain(..));
        ctx.slot.records.fetch_add(published as u64, Ordering::Relaxed);
        ctx.slot.bytes.fetch_add(n as u64, Ordering::Relaxed);
        outcome
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.epoll.delete(self.socket.as_raw_fd()) {
            debug!(worker = self.ctx.slot.id, error = %e, "epoll deregistration failed");
        }
        // socket and epoll descriptors close when their owners drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_in_worker_body_marks_slot_failed() {
        let slot = WorkerSlot::new(3, 0);
        supervise(&slot, || panic!("segment table corrupted"));

        assert!(slot.is_finished());
        match slot.report().state {
            WorkerState::Finished(ExitReason::Failed(msg)) => {
                assert!(msg.contains("segment table corrupted"), "{msg}");
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn clean_exit_is_recorded() {
        let slot = WorkerSlot::new(0, 0);
        supervise(&slot, || ExitReason::PeerClosed);
        assert_eq!(
            slot.report().state,
            WorkerState::Finished(ExitReason::PeerClosed)
        );
    }
}
