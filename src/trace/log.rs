//! In-memory trace log with a low-priority persistence worker.

use super::error::TraceError;
use super::record::{TraceKind, TraceRecord};
use super::sink::{TraceDocument, TraceSink};
use crate::context::ThreadPriority;
use crate::fault::{Fault, FaultChannel};
use crate::timer::{Clock, Signal};
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Ordered log of structured trace records.
///
/// Appending never blocks on I/O: records are sequenced and timestamped
/// under a single lock, so their scheduler times never go backwards.
/// Persisting hands a snapshot to a background writer. Cloning shares the
/// log.
#[derive(Clone)]
pub struct TraceLog {
    inner: Arc<Inner>,
}

struct Records {
    next_seq: u64,
    dropped: u64,
    entries: VecDeque<TraceRecord>,
}

struct Job {
    name: String,
    records: Vec<TraceRecord>,
}

struct Inner {
    session: Uuid,
    clock: Clock,
    capacity: usize,
    records: Mutex<Records>,
    sink: Arc<dyn TraceSink>,
    jobs: Mutex<VecDeque<Job>>,
    in_flight: Mutex<usize>,
    drained: Condvar,
    wake: Signal,
    terminating: AtomicBool,
    finished: AtomicBool,
    done: Signal,
    faults: FaultChannel,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TraceLog {
    /// Create a log keeping at most `capacity` records, persisting to `sink`.
    pub fn spawn(
        capacity: usize,
        clock: Clock,
        sink: Arc<dyn TraceSink>,
        faults: FaultChannel,
    ) -> io::Result<Self> {
        let inner = Arc::new(Inner {
            session: Uuid::new_v4(),
            clock,
            capacity: capacity.max(1),
            records: Mutex::new(Records {
                next_seq: 0,
                dropped: 0,
                entries: VecDeque::new(),
            }),
            sink,
            jobs: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
            wake: Signal::new(),
            terminating: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            done: Signal::new(),
            faults,
            join: Mutex::new(None),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || run(worker))?;
        *inner.join.lock() = Some(handle);
        info!(session = %inner.session, capacity, priority = ?ThreadPriority::Lowest, "trace log started");
        Ok(Self { inner })
    }

    pub fn session(&self) -> Uuid {
        self.inner.session
    }

    /// Append a record stamped with the current scheduler time.
    pub fn append<I, K, V>(&self, kind: TraceKind, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let tags: Vec<(String, String)> = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut records = self.inner.records.lock();
        let record = TraceRecord {
            seq: records.next_seq,
            kind,
            time: self.inner.clock.now(),
            timestamp: Utc::now(),
            tags,
        };
        records.next_seq += 1;
        if records.entries.len() == self.inner.capacity {
            records.entries.pop_front();
            records.dropped += 1;
        }
        records.entries.push_back(record);
    }

    /// Copy of the retained records, oldest first.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.inner.records.lock().entries.iter().cloned().collect()
    }

    pub fn records_of(&self, kind: TraceKind) -> Vec<TraceRecord> {
        self.inner
            .records
            .lock()
            .entries
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.lock().entries.is_empty()
    }

    /// Records evicted because the log was at capacity.
    pub fn dropped(&self) -> u64 {
        self.inner.records.lock().dropped
    }

    pub fn clear(&self) {
        self.inner.records.lock().entries.clear();
    }

    /// Queue a snapshot of the current records for the writer thread.
    ///
    /// Fails with [`TraceError::Closed`] once the log has been terminated.
    pub fn persist(&self, name: impl Into<String>) -> Result<(), TraceError> {
        if self.inner.terminating.load(Ordering::SeqCst) {
            return Err(TraceError::Closed);
        }
        let job = Job {
            name: name.into(),
            records: self.records(),
        };
        *self.inner.in_flight.lock() += 1;
        self.inner.jobs.lock().push_back(job);
        self.inner.wake.send();
        Ok(())
    }

    /// Save a snapshot on the calling thread.
    pub fn persist_now(&self, name: impl Into<String>) -> Result<(), TraceError> {
        let document = TraceDocument::new(self.inner.session, name, self.records());
        self.inner.sink.save(&document)
    }

    /// Block until every queued snapshot has been written, or `timeout`
    /// elapses. Returns `true` if the writer drained.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self.inner.in_flight.lock();
        while *in_flight > 0 {
            if self
                .inner
                .drained
                .wait_until(&mut in_flight, deadline)
                .timed_out()
            {
                return *in_flight == 0;
            }
        }
        true
    }

    /// Write out queued snapshots, then stop the writer thread.
    pub fn terminate(&self, wait: Option<Duration>) -> Result<(), Fault> {
        self.inner.terminating.store(true, Ordering::SeqCst);
        self.inner.wake.send();
        let Some(timeout) = wait else {
            return Ok(());
        };
        if self.inner.finished.load(Ordering::SeqCst) || self.inner.done.wait_timeout(timeout) {
            self.inner.done.send();
            let handle = self.inner.join.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
            return Ok(());
        }
        let fault = Fault::TerminateTimeout {
            name: "trace-writer".to_string(),
            timeout,
        };
        self.inner.faults.publish(&fault);
        Err(fault)
    }
}

fn run(inner: Arc<Inner>) {
    loop {
        inner.wake.wait();
        loop {
            let next = inner.jobs.lock().pop_front();
            let Some(job) = next else {
                break;
            };
            let document = TraceDocument::new(inner.session, job.name, job.records);
            match inner.sink.save(&document) {
                Ok(()) => debug!(name = %document.name, records = document.records.len(), "trace persisted"),
                Err(e) => error!(name = %document.name, error = %e, "trace persistence failed"),
            }
            let mut in_flight = inner.in_flight.lock();
            *in_flight = in_flight.saturating_sub(1);
            inner.drained.notify_all();
        }
        if inner.terminating.load(Ordering::SeqCst) {
            break;
        }
    }
    inner.finished.store(true, Ordering::SeqCst);
    info!(session = %inner.session, "trace writer exited");
    inner.done.send();
}
