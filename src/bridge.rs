//! Tokio bridge.
//!
//! `Consumer::consume` blocks, so async callers run it on the blocking pool
//! and receive captured records through an mpsc channel.

use std::sync::Arc;

use log::Level;
use tokio::{
    sync::mpsc,
    task::{self, JoinHandle},
};

use crate::consumer::{Consumer, DispatchSink};
use crate::error::{SinkError, TraceError};
use crate::record::{RawRecord, Record};
use crate::trace_log;

/// Sink that forwards owned copies of records into an async channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Record>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Record>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a channel holding up to `capacity` records.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl DispatchSink for ChannelSink {
    fn dispatch(&mut self, record: &RawRecord<'_>) -> Result<(), SinkError> {
        // blocking_send() parks the consuming thread only, never a Tokio worker
        self.tx
            .blocking_send(record.capture())
            .map_err(|_| SinkError::new("record receiver dropped"))
    }
}

/// Run `consumer.consume()` on Tokio's blocking pool.
///
/// Must be called from within a runtime. Close the consumer to make the
/// task finish early.
pub fn spawn_consumer(consumer: Arc<Consumer>) -> JoinHandle<Result<(), TraceError>> {
    task::spawn_blocking(move || {
        let result = consumer.consume();
        if let Err(e) = &result {
            trace_log!(Level::Error, "bridge", "Blocking consume task ended: {}", e);
        }
        result
    })
}
