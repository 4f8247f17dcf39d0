//! In-process tracing facility.
//!
//! [`TraceHub`] is the registry of running sessions that controllers start
//! and stop, providers log into, and real-time handles attach to. It stands
//! in for the operating system's tracing service so the consumer can be
//! driven end to end without one.
//!
//! Key responsibilities:
//! - Keep named sessions (real-time or file-backed) and their enabled providers.
//! - Route each logged record to every session that enabled its provider.
//! - Enforce one attached consumer per real-time session.
//! - Refuse session control to callers without [`Privilege::Elevated`].

pub mod controller;
pub mod provider;

use std::{
    collections::HashMap,
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::Level;
use metrics::counter;
use serde::Serialize;

use crate::error::TraceError;
use crate::record::{ProviderId, RawRecord, Record, TraceLevel};
use crate::session::SessionMode;
use crate::session::file::FrameWriter;
use crate::trace_log;

pub use controller::TraceController;
pub use provider::TraceProvider;

/// Approximate per-record footprint used to size real-time buffers.
const RECORD_SLOT_BYTES: usize = 64;

/// Privilege of the caller using a hub view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Elevated,
    Standard,
}

/// Statistics reported when a session is flushed or stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProperties {
    pub name: String,
    pub mode: SessionMode,
    pub buffer_size: usize,
    pub records_written: u64,
    pub records_lost: u64,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct Enablement {
    level: TraceLevel,
    flags: u32,
}

impl Enablement {
    fn admits(&self, record: &RawRecord<'_>) -> bool {
        self.level.admits(record.level) && (record.flags == 0 || record.flags & self.flags != 0)
    }
}

enum SessionOutput {
    RealTime {
        tx: Sender<Record>,
        rx: Receiver<Record>,
        attached: bool,
    },
    File(FrameWriter<BufWriter<File>>),
}

struct SessionEntry {
    generation: u64,
    buffer_size: usize,
    providers: HashMap<ProviderId, Enablement>,
    output: SessionOutput,
    records_written: u64,
    records_lost: u64,
    log_file: Option<PathBuf>,
}

impl SessionEntry {
    fn mode(&self) -> SessionMode {
        match self.output {
            SessionOutput::RealTime { .. } => SessionMode::RealTime,
            SessionOutput::File(_) => SessionMode::FileReplay,
        }
    }

    fn properties(&self, name: &str) -> SessionProperties {
        SessionProperties {
            name: name.to_owned(),
            mode: self.mode(),
            buffer_size: self.buffer_size,
            records_written: self.records_written,
            records_lost: self.records_lost,
            log_file: self.log_file.clone(),
        }
    }

    fn deliver(&mut self, name: &str, record: &RawRecord<'_>) {
        let delivered = match &mut self.output {
            SessionOutput::RealTime { tx, .. } => match tx.try_send(record.capture()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            },
            SessionOutput::File(writer) => match writer.write_record(record) {
                Ok(()) => true,
                Err(e) => {
                    trace_log!(Level::Warn, "facility", "Session '{}' write failed: {}", name, e);
                    false
                }
            },
        };
        if delivered {
            self.records_written += 1;
        } else {
            self.records_lost += 1;
            counter!("trace_records_lost_total").increment(1);
        }
    }
}

pub(crate) enum SessionSpec {
    RealTime { buffer_size: usize },
    File { path: PathBuf, writer: FrameWriter<BufWriter<File>> },
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, SessionEntry>,
    next_generation: u64,
}

/// Shared handle to the facility. Clones share the same sessions.
#[derive(Clone)]
pub struct TraceHub {
    registry: Arc<Mutex<Registry>>,
    privilege: Privilege,
}

impl TraceHub {
    /// A fresh facility seen by an elevated caller.
    pub fn new() -> Self {
        Self::with_privilege(Privilege::Elevated)
    }

    pub fn with_privilege(privilege: Privilege) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            privilege,
        }
    }

    /// Same sessions, seen by a caller with a different privilege.
    pub fn as_privilege(&self, privilege: Privilege) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            privilege,
        }
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().sessions.contains_key(name)
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    // The registry stays consistent across a panicking holder: every
    // mutation is a single insert/remove/field update.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn require_elevated(&self, what: &str) -> Result<(), TraceError> {
        match self.privilege {
            Privilege::Elevated => Ok(()),
            Privilege::Standard => Err(TraceError::AccessDenied(format!(
                "{what} requires an elevated caller"
            ))),
        }
    }

    pub(crate) fn start_session(&self, name: &str, spec: SessionSpec) -> Result<u64, TraceError> {
        self.require_elevated("starting a session")?;
        let mut reg = self.lock();
        if reg.sessions.contains_key(name) {
            return Err(TraceError::AlreadyOpen(format!("session '{name}' is already running")));
        }
        reg.next_generation += 1;
        let generation = reg.next_generation;

        let (buffer_size, output, log_file) = match spec {
            SessionSpec::RealTime { buffer_size } => {
                let (tx, rx) = channel::bounded((buffer_size / RECORD_SLOT_BYTES).max(1));
                (buffer_size, SessionOutput::RealTime { tx, rx, attached: false }, None)
            }
            SessionSpec::File { path, writer } => (0, SessionOutput::File(writer), Some(path)),
        };
        reg.sessions.insert(
            name.to_owned(),
            SessionEntry {
                generation,
                buffer_size,
                providers: HashMap::new(),
                output,
                records_written: 0,
                records_lost: 0,
                log_file,
            },
        );
        trace_log!(Level::Info, "facility", "Session '{}' started (generation {})", name, generation);
        Ok(generation)
    }

    /// Remove a session. `generation` guards against stopping a newer session of the same name.
    pub(crate) fn stop_session(
        &self,
        name: &str,
        generation: Option<u64>,
    ) -> Result<SessionProperties, TraceError> {
        self.require_elevated("stopping a session")?;
        let entry = {
            let mut reg = self.lock();
            let current = reg
                .sessions
                .get(name)
                .is_some_and(|e| generation.is_none_or(|g| g == e.generation));
            if current { reg.sessions.remove(name) } else { None }
        }
        .ok_or_else(|| TraceError::NotFound(format!("session '{name}' is not running")))?;

        let props = entry.properties(name);
        if let SessionOutput::File(writer) = entry.output {
            writer.into_inner()?;
        }
        // Dropping a real-time entry drops the only sender; an attached
        // handle drains what is buffered and then sees end-of-stream.
        if props.records_lost > 0 {
            trace_log!(Level::Warn, "facility", "Session '{}' lost {} record(s)", name, props.records_lost);
        }
        trace_log!(Level::Info, "facility", "Session '{}' stopped ({} written)", name, props.records_written);
        Ok(props)
    }

    pub(crate) fn flush_session(&self, name: &str, generation: u64) -> Result<SessionProperties, TraceError> {
        let mut reg = self.lock();
        let entry = Self::entry_mut(&mut reg, name, generation)?;
        if let SessionOutput::File(writer) = &mut entry.output {
            writer.flush()?;
        }
        Ok(entry.properties(name))
    }

    pub(crate) fn enable_provider(
        &self,
        name: &str,
        generation: u64,
        id: ProviderId,
        level: TraceLevel,
        flags: u32,
    ) -> Result<(), TraceError> {
        self.require_elevated("enabling a provider")?;
        let mut reg = self.lock();
        let entry = Self::entry_mut(&mut reg, name, generation)?;
        entry.providers.insert(id, Enablement { level, flags });
        trace_log!(Level::Debug, "facility", "Provider {} enabled on '{}' at {:?}", id, name, level);
        Ok(())
    }

    pub(crate) fn disable_provider(&self, name: &str, generation: u64, id: ProviderId) -> Result<(), TraceError> {
        self.require_elevated("disabling a provider")?;
        let mut reg = self.lock();
        let entry = Self::entry_mut(&mut reg, name, generation)?;
        if entry.providers.remove(&id).is_none() {
            return Err(TraceError::NotFound(format!("provider {id} is not enabled on '{name}'")));
        }
        Ok(())
    }

    pub(crate) fn attach_realtime(&self, name: &str) -> Result<(u64, Receiver<Record>), TraceError> {
        self.require_elevated("attaching to a real-time session")?;
        let mut reg = self.lock();
        let entry = reg
            .sessions
            .get_mut(name)
            .ok_or_else(|| TraceError::NotFound(format!("session '{name}' is not running")))?;
        match &mut entry.output {
            SessionOutput::RealTime { attached: true, .. } => Err(TraceError::AlreadyOpen(format!(
                "session '{name}' already has a consumer"
            ))),
            SessionOutput::RealTime { rx, attached, .. } => {
                *attached = true;
                Ok((entry.generation, rx.clone()))
            }
            SessionOutput::File(_) => Err(TraceError::InvalidState(format!(
                "session '{name}' logs to a file"
            ))),
        }
    }

    pub(crate) fn detach_realtime(&self, name: &str, generation: u64) {
        let mut reg = self.lock();
        if let Ok(entry) = Self::entry_mut(&mut reg, name, generation) {
            if let SessionOutput::RealTime { attached, .. } = &mut entry.output {
                *attached = false;
            }
        }
    }

    /// Deliver a stamped record to every session that enabled its provider.
    pub(crate) fn route(&self, record: &RawRecord<'_>) {
        let mut reg = self.lock();
        for (name, entry) in reg.sessions.iter_mut() {
            let admitted = entry
                .providers
                .get(&record.provider_id)
                .is_some_and(|en| en.admits(record));
            if admitted {
                entry.deliver(name, record);
            }
        }
    }

    fn entry_mut<'r>(
        reg: &'r mut Registry,
        name: &str,
        generation: u64,
    ) -> Result<&'r mut SessionEntry, TraceError> {
        match reg.sessions.get_mut(name) {
            Some(e) if e.generation == generation => Ok(e),
            _ => Err(TraceError::NotFound(format!("session '{name}' is not running"))),
        }
    }
}

impl Default for TraceHub {
    fn default() -> Self {
        Self::new()
    }
}
