//! Session handles: the consumer's view of an open trace session.
//!
//! A handle is either attached to a live session ([`realtime`]) or reads a
//! previously recorded file ([`file`]). Both hand out records one at a time
//! through [`SessionHandle::next_record`]; the returned record borrows
//! handle-owned memory that is reused on the next call.
//!
//! Every handle carries a [`StopSignal`]. Triggering it from any thread makes
//! a blocked `next_record` return end-of-stream promptly.

pub mod file;
pub mod realtime;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;

use crate::error::TraceError;
use crate::record::RawRecord;

pub use file::FileReplayHandle;
pub use realtime::RealTimeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionMode {
    RealTime,
    FileReplay,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::RealTime => f.write_str("real-time"),
            SessionMode::FileReplay => f.write_str("file-replay"),
        }
    }
}

/// An open trace session that records can be pulled from.
///
/// Implementations must deliver records in production order and must return
/// `Ok(None)` (end-of-stream) once their [`StopSignal`] has been triggered.
pub trait SessionHandle: Send {
    fn mode(&self) -> SessionMode;

    fn is_open(&self) -> bool;

    /// Signal that unblocks a pending [`next_record`](Self::next_record).
    fn stop_signal(&self) -> StopSignal;

    /// Block until the next record is available.
    ///
    /// `Ok(None)` means the stream ended: the file is exhausted, the live
    /// session was stopped by its controller, or the stop signal fired.
    fn next_record(&mut self) -> Result<Option<RawRecord<'_>>, TraceError>;

    /// Release the underlying session resources. Idempotent.
    fn close(&mut self);
}

/// Cooperative cancellation flag shared between a handle and whoever may stop it.
#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug)]
struct StopInner {
    stopped: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// Set the flag and wake one waiter. Only the first call has an effect.
    pub fn trigger(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.inner.wake_tx.try_send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Channel that becomes ready when the signal is triggered; for `select!`.
    ///
    /// The wake-up is delivered once, so waiters must re-check
    /// [`is_triggered`](Self::is_triggered) before blocking again.
    pub fn waker(&self) -> Receiver<()> {
        self.inner.wake_rx.clone()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
