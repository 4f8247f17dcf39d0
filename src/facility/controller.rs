//! Session controller: starts, configures and stops one named session.

use std::{fs::File, io::BufWriter, path::Path};

use log::Level;

use crate::error::TraceError;
use crate::facility::{SessionProperties, SessionSpec, TraceHub};
use crate::record::{ProviderId, TraceLevel};
use crate::session::file::FrameWriter;
use crate::trace_log;

struct ActiveSession {
    name: String,
    generation: u64,
}

/// Controls at most one session at a time. Dropping it stops that session.
pub struct TraceController {
    hub: TraceHub,
    session: Option<ActiveSession>,
}

impl TraceController {
    pub fn new(hub: &TraceHub) -> Self {
        Self { hub: hub.clone(), session: None }
    }

    /// Name of the session this controller started, if it is still running.
    pub fn session_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.name.as_str())
    }

    pub fn start_realtime_session(&mut self, name: &str, buffer_size: usize) -> Result<(), TraceError> {
        self.ensure_idle()?;
        let generation = self
            .hub
            .start_session(name, SessionSpec::RealTime { buffer_size })?;
        self.session = Some(ActiveSession { name: name.to_owned(), generation });
        Ok(())
    }

    /// Start a session whose records are written to `path`, truncating it.
    pub fn start_file_session(&mut self, name: &str, path: &Path) -> Result<(), TraceError> {
        self.ensure_idle()?;
        // Checked before touching the file so a refused start leaves nothing behind.
        self.hub.require_elevated("starting a session")?;
        if self.hub.is_running(name) {
            return Err(TraceError::AlreadyOpen(format!("session '{name}' is already running")));
        }

        let writer = FrameWriter::new(BufWriter::new(File::create(path)?))?;
        let generation = self.hub.start_session(
            name,
            SessionSpec::File { path: path.to_path_buf(), writer },
        )?;
        trace_log!(Level::Debug, "controller", "Session '{}' logging to {}", name, path.display());
        self.session = Some(ActiveSession { name: name.to_owned(), generation });
        Ok(())
    }

    pub fn enable_provider(&self, id: ProviderId, level: TraceLevel, flags: u32) -> Result<(), TraceError> {
        let s = self.active()?;
        self.hub.enable_provider(&s.name, s.generation, id, level, flags)
    }

    pub fn disable_provider(&self, id: ProviderId) -> Result<(), TraceError> {
        let s = self.active()?;
        self.hub.disable_provider(&s.name, s.generation, id)
    }

    /// Push buffered records to the session's destination.
    pub fn flush(&self) -> Result<SessionProperties, TraceError> {
        let s = self.active()?;
        self.hub.flush_session(&s.name, s.generation)
    }

    /// Stop the controlled session and report its final properties.
    ///
    /// A consumer attached to a real-time session sees end-of-stream once it
    /// has drained whatever was buffered.
    pub fn stop(&mut self) -> Result<SessionProperties, TraceError> {
        let s = self.active()?;
        let result = self.hub.stop_session(&s.name, Some(s.generation));
        // NotFound means it was already stopped by name; either way it is gone.
        if !matches!(result, Err(TraceError::AccessDenied(_))) {
            self.session = None;
        }
        result
    }

    /// Stop a session by name regardless of which controller started it.
    pub fn stop_session(hub: &TraceHub, name: &str) -> Result<SessionProperties, TraceError> {
        hub.stop_session(name, None)
    }

    fn ensure_idle(&self) -> Result<(), TraceError> {
        match &self.session {
            Some(s) => Err(TraceError::AlreadyOpen(format!(
                "controller already runs session '{}'",
                s.name
            ))),
            None => Ok(()),
        }
    }

    fn active(&self) -> Result<&ActiveSession, TraceError> {
        self.session
            .as_ref()
            .ok_or_else(|| TraceError::InvalidState("controller has no running session".into()))
    }
}

impl Drop for TraceController {
    fn drop(&mut self) {
        if let Some(s) = self.session.take() {
            // NotFound here means someone else already stopped it.
            let _ = self.hub.stop_session(&s.name, Some(s.generation));
        }
    }
}
