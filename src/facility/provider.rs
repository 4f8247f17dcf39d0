//! Trace provider: the emitting side of a session.

use std::sync::atomic::{AtomicU32, Ordering};

use log::Level;

use crate::error::TraceError;
use crate::facility::TraceHub;
use crate::record::{ProviderId, RawRecord, now_micros};
use crate::trace_log;

/// Small per-thread number stamped into records as the thread id.
fn current_thread_tag() -> u32 {
    static NEXT: AtomicU32 = AtomicU32::new(1);
    thread_local! {
        static TAG: u32 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TAG.with(|t| *t)
}

pub struct TraceProvider {
    hub: TraceHub,
    id: ProviderId,
    registered: bool,
}

impl TraceProvider {
    pub fn new(hub: &TraceHub, id: ProviderId) -> Self {
        Self { hub: hub.clone(), id, registered: false }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn register(&mut self) -> Result<(), TraceError> {
        if self.registered {
            return Err(TraceError::AlreadyOpen(format!("provider {} is already registered", self.id)));
        }
        self.registered = true;
        trace_log!(Level::Debug, "provider", "Provider {} registered", self.id);
        Ok(())
    }

    /// Stamp `record` with time, provider id, pid and tid, then hand it to
    /// every session that enabled this provider. A record no session wants
    /// is silently discarded.
    pub fn log(&self, record: &RawRecord<'_>) -> Result<(), TraceError> {
        if !self.registered {
            return Err(TraceError::InvalidState(format!("provider {} is not registered", self.id)));
        }
        let stamped = RawRecord {
            timestamp: now_micros(),
            provider_id: self.id,
            process_id: std::process::id(),
            thread_id: current_thread_tag(),
            ..*record
        };
        self.hub.route(&stamped);
        Ok(())
    }

    pub fn unregister(&mut self) -> Result<(), TraceError> {
        if !self.registered {
            return Err(TraceError::InvalidState(format!("provider {} is not registered", self.id)));
        }
        self.registered = false;
        trace_log!(Level::Debug, "provider", "Provider {} unregistered", self.id);
        Ok(())
    }
}
