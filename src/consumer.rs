//! Trace consumer engine.
//!
//! A [`Consumer`] owns at most one open [`SessionHandle`] and a
//! [`DispatchSink`]. [`Consumer::consume`] blocks the calling thread, pulling
//! records from the handle and handing each one to the sink in production
//! order, until the stream ends, an error occurs, or [`Consumer::close`] is
//! called from another thread.
//!
//! State machine:
//!
//! ```text
//!   Idle ──open──▶ Idle(handle) ──consume──▶ Consuming ──EOF/error──▶ Idle
//!     │                 │                        │
//!     └──────close──────┴──────────close─────────┴──────────────────▶ Closed
//! ```
//!
//! When `consume` returns the handle has been released, so a caller may
//! re-open and consume again. `Closed` is terminal.

use std::{
    path::Path,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use log::Level;
use metrics::counter;

use crate::config::ConsumerConfig;
use crate::error::{SinkError, TraceError};
use crate::facility::TraceHub;
use crate::record::RawRecord;
use crate::session::{FileReplayHandle, RealTimeHandle, SessionHandle, StopSignal};
use crate::trace_log;

/// Receives every record a consumer pulls, on the consuming thread.
///
/// The record's payload is only valid for the duration of the call;
/// use [`RawRecord::capture`] to keep it. Returning an error stops
/// consumption and makes `consume` fail with `SinkFailure`.
pub trait DispatchSink: Send {
    fn dispatch(&mut self, record: &RawRecord<'_>) -> Result<(), SinkError>;
}

impl<F> DispatchSink for F
where
    F: FnMut(&RawRecord<'_>) -> Result<(), SinkError> + Send,
{
    fn dispatch(&mut self, record: &RawRecord<'_>) -> Result<(), SinkError> {
        self(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Consuming,
    Closed,
}

struct Inner {
    state: ConsumerState,
    handle: Option<Box<dyn SessionHandle>>,
    // Out of `Inner` while a `consume` call owns it.
    sink: Option<Box<dyn DispatchSink>>,
    stop: Option<StopSignal>,
    consuming_thread: Option<ThreadId>,
    close_requested: bool,
}

pub struct Consumer {
    inner: Mutex<Inner>,
    exited: Condvar,
    max_payload_len: usize,
}

impl Consumer {
    pub fn new<S: DispatchSink + 'static>(sink: S) -> Self {
        Self::with_config(sink, &ConsumerConfig::default())
    }

    pub fn with_config<S: DispatchSink + 'static>(sink: S, cfg: &ConsumerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConsumerState::Idle,
                handle: None,
                sink: Some(Box::new(sink)),
                stop: None,
                consuming_thread: None,
                close_requested: false,
            }),
            exited: Condvar::new(),
            max_payload_len: cfg.max_payload_len,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.lock().state
    }

    /// True while a handle is held, whether or not it is being consumed.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        inner.handle.is_some() || inner.state == ConsumerState::Consuming
    }

    /// Open a live session by name. The session does not need to be running
    /// yet; `consume` fails with `NotFound` if it still is not.
    pub fn open_realtime_session(&self, hub: &TraceHub, name: &str) -> Result<(), TraceError> {
        self.open_with(|| Ok(Box::new(RealTimeHandle::open(hub, name)?)))
    }

    /// Open a recorded session file for replay.
    pub fn open_file_session(&self, path: &Path) -> Result<(), TraceError> {
        let max = self.max_payload_len;
        self.open_with(|| Ok(Box::new(FileReplayHandle::open(path, max)?)))
    }

    /// Adopt an already opened handle.
    pub fn open_handle(&self, handle: Box<dyn SessionHandle>) -> Result<(), TraceError> {
        self.open_with(|| Ok(handle))
    }

    fn open_with<F>(&self, open: F) -> Result<(), TraceError>
    where
        F: FnOnce() -> Result<Box<dyn SessionHandle>, TraceError>,
    {
        Self::check_can_open(&self.lock())?;

        // Opening may touch the disk; `state()` and `close()` must not wait on it.
        let mut handle = open()?;
        if !handle.is_open() {
            return Err(TraceError::InvalidState("session handle is not open".into()));
        }

        let mut inner = self.lock();
        if let Err(e) = Self::check_can_open(&inner) {
            drop(inner);
            handle.close();
            return Err(e);
        }
        trace_log!(Level::Debug, "consumer", "Opened {} session", handle.mode());
        inner.handle = Some(handle);
        Ok(())
    }

    fn check_can_open(inner: &Inner) -> Result<(), TraceError> {
        match inner.state {
            ConsumerState::Closed => Err(TraceError::InvalidState("consumer is closed".into())),
            ConsumerState::Consuming => {
                Err(TraceError::AlreadyOpen("consumer is consuming a session".into()))
            }
            ConsumerState::Idle if inner.handle.is_some() => {
                Err(TraceError::AlreadyOpen("consumer already holds a session".into()))
            }
            ConsumerState::Idle => Ok(()),
        }
    }

    /// Pump records from the open session into the sink until the stream
    /// ends, an error occurs, or [`close`](Self::close) is called.
    ///
    /// A close from another thread is a graceful stop and returns `Ok`.
    pub fn consume(&self) -> Result<(), TraceError> {
        let (handle, sink) = {
            let mut inner = self.lock();
            match inner.state {
                ConsumerState::Closed => {
                    return Err(TraceError::InvalidState("consumer is closed".into()));
                }
                ConsumerState::Consuming => {
                    return Err(TraceError::InvalidState("consume is already running".into()));
                }
                ConsumerState::Idle => {}
            }
            let handle = inner
                .handle
                .take()
                .ok_or_else(|| TraceError::InvalidState("no session is open".into()))?;
            let Some(sink) = inner.sink.take() else {
                inner.handle = Some(handle);
                return Err(TraceError::Unexpected("dispatch sink is missing".into()));
            };
            inner.stop = Some(handle.stop_signal());
            inner.consuming_thread = Some(thread::current().id());
            inner.state = ConsumerState::Consuming;
            (handle, sink)
        };
        counter!("trace_consume_calls_total").increment(1);

        let mut run = ConsumeRun { consumer: self, handle: Some(handle), sink: Some(sink) };
        let mode = run.handle.as_ref().map(|h| h.mode());
        trace_log!(Level::Debug, "consumer", "Consuming {:?} session", mode);

        let result = run.pump();
        match &result {
            Ok(n) => {
                trace_log!(Level::Info, "consumer", "Consume finished after {} record(s)", n);
            }
            Err(e) => {
                trace_log!(Level::Warn, "consumer", "Consume failed: {}", e);
            }
        }
        drop(run);
        result.map(|_| ())
    }

    /// Close the consumer. Idempotent.
    ///
    /// If `consume` is running on another thread, its pull is unblocked and
    /// this call waits until the loop has exited. Called from inside the
    /// sink it only requests the stop; the consumer becomes `Closed` as soon
    /// as `consume` returns.
    pub fn close(&self) {
        let mut inner = self.lock();
        loop {
            match inner.state {
                ConsumerState::Closed => return,
                ConsumerState::Idle => {
                    if let Some(mut handle) = inner.handle.take() {
                        handle.close();
                    }
                    inner.state = ConsumerState::Closed;
                    trace_log!(Level::Debug, "consumer", "Consumer closed");
                    return;
                }
                ConsumerState::Consuming => {
                    inner.close_requested = true;
                    if let Some(stop) = &inner.stop {
                        stop.trigger();
                    }
                    if inner.consuming_thread == Some(thread::current().id()) {
                        return;
                    }
                    inner = self
                        .exited
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    // `Inner` is only mutated in short critical sections that cannot panic
    // half-way, so a poisoned lock still holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}

/// One in-flight `consume` call. Dropping it (normally or while unwinding
/// out of a panicking sink) releases the handle and leaves `Consuming`.
struct ConsumeRun<'a> {
    consumer: &'a Consumer,
    handle: Option<Box<dyn SessionHandle>>,
    sink: Option<Box<dyn DispatchSink>>,
}

impl ConsumeRun<'_> {
    fn pump(&mut self) -> Result<u64, TraceError> {
        let (Some(handle), Some(sink)) = (self.handle.as_mut(), self.sink.as_mut()) else {
            return Err(TraceError::Unexpected("consume run lost its session".into()));
        };

        let mut delivered = 0u64;
        while let Some(record) = handle.next_record()? {
            if let Err(e) = sink.dispatch(&record) {
                counter!("trace_sink_failures_total").increment(1);
                return Err(e.into());
            }
            delivered += 1;
            counter!("trace_records_dispatched_total").increment(1);
        }
        Ok(delivered)
    }
}

impl Drop for ConsumeRun<'_> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        let mut inner = self.consumer.lock();
        inner.sink = self.sink.take();
        inner.stop = None;
        inner.consuming_thread = None;
        inner.state = if inner.close_requested {
            trace_log!(Level::Debug, "consumer", "Consumer closed during consume");
            ConsumerState::Closed
        } else {
            ConsumerState::Idle
        };
        drop(inner);
        self.consumer.exited.notify_all();
    }
}
