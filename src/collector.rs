//! Reference dispatch sink.
//!
//! [`Collector`] captures every dispatched record into an ordered queue that
//! other threads can inspect, and raises a [`Signal`] once the first record
//! has arrived. It is what test harnesses and the CLI hand to a
//! [`Consumer`](crate::consumer::Consumer).

use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Duration,
};

use crate::consumer::DispatchSink;
use crate::error::SinkError;
use crate::record::{RawRecord, Record};

/// Manual-reset event: stays set until [`reset`](Signal::reset).
#[derive(Debug, Clone, Default)]
pub struct Signal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cv.notify_all();
    }

    pub fn reset(&self) {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_set(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until set.
    pub fn wait(&self) {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let _set = cv
            .wait_while(guard, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until set or `timeout` elapses. Returns whether the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (set, _) = cv
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *set
    }
}

/// Ordered, shareable record queue. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    records: Arc<Mutex<Vec<Record>>>,
    sank: Signal,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set when the first record is collected; reset by [`drain`](Self::drain) and [`clear`](Self::clear).
    pub fn sank(&self) -> Signal {
        self.sank.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything collected so far, in dispatch order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Take everything collected so far, in dispatch order.
    pub fn drain(&self) -> Vec<Record> {
        let mut records = self.lock();
        self.sank.reset();
        std::mem::take(&mut *records)
    }

    pub fn clear(&self) {
        let mut records = self.lock();
        self.sank.reset();
        records.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DispatchSink for Collector {
    fn dispatch(&mut self, record: &RawRecord<'_>) -> Result<(), SinkError> {
        let mut records = self.lock();
        records.push(record.capture());
        // Set under the queue lock so a concurrent drain never sees a stale signal.
        self.sank.set();
        Ok(())
    }
}
