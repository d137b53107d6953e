//! Best-effort debug console.

use crate::fault::{Fault, FaultChannel};
use crate::timer::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Bounded, non-blocking text sink drained by a background writer.
///
/// `write` and `write_line` never block the caller: once `capacity`
/// requests are pending, further text is dropped and the call returns
/// `false`.
#[derive(Clone)]
pub struct DebugSink {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    pending: Mutex<VecDeque<String>>,
    wake: Signal,
    terminating: AtomicBool,
    finished: AtomicBool,
    done: Signal,
    faults: FaultChannel,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DebugSink {
    /// Console writing to standard error.
    pub fn stderr(capacity: usize, faults: FaultChannel) -> io::Result<Self> {
        Self::spawn(capacity, Box::new(io::stderr()), faults)
    }

    pub fn spawn(
        capacity: usize,
        writer: Box<dyn Write + Send>,
        faults: FaultChannel,
    ) -> io::Result<Self> {
        let inner = Arc::new(Inner {
            capacity,
            pending: Mutex::new(VecDeque::new()),
            wake: Signal::new(),
            terminating: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            done: Signal::new(),
            faults,
            join: Mutex::new(None),
        });
        let worker = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("debug-console".to_string())
            .spawn(move || run(worker, writer))?;
        *inner.join.lock() = Some(handle);
        Ok(Self { inner })
    }

    pub fn write(&self, text: impl Into<String>) -> bool {
        self.submit(text.into())
    }

    pub fn write_line(&self, text: impl Into<String>) -> bool {
        let mut line = text.into();
        line.push('\n');
        self.submit(line)
    }

    fn submit(&self, text: String) -> bool {
        if self.inner.terminating.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut pending = self.inner.pending.lock();
            if pending.len() >= self.inner.capacity {
                return false;
            }
            pending.push_back(text);
        }
        self.inner.wake.send();
        true
    }

    /// Requests accepted but not yet written.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Write out pending text, then stop the writer thread.
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
            name: "debug-console".to_string(),
            timeout,
        };
        self.inner.faults.publish(&fault);
        Err(fault)
    }
}

fn run(inner: Arc<Inner>, mut writer: Box<dyn Write + Send>) {
    loop {
        inner.wake.wait();
        loop {
            let next = inner.pending.lock().pop_front();
            let Some(text) = next else {
                break;
            };
            if let Err(e) = writer.write_all(text.as_bytes()) {
                warn!(error = %e, "debug console write failed");
            }
        }
        let _ = writer.flush();
        if inner.terminating.load(Ordering::SeqCst) {
            break;
        }
    }
    inner.finished.store(true, Ordering::SeqCst);
    inner.done.send();
}
