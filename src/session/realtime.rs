//! Handle attached to a live, named session.
//!
//! Opening is lazy: the session is looked up on the first pull, so a handle
//! can be opened before its session is started. Pulling from a handle whose
//! session does not exist fails immediately with `NotFound`.

use crossbeam::channel::Receiver;
use crossbeam::select;
use log::Level;

use crate::error::TraceError;
use crate::facility::TraceHub;
use crate::record::{RawRecord, Record};
use crate::session::{SessionHandle, SessionMode, StopSignal};
use crate::trace_log;

enum Attachment {
    Pending,
    Attached { generation: u64, rx: Receiver<Record> },
    Detached,
}

pub struct RealTimeHandle {
    hub: TraceHub,
    name: String,
    attachment: Attachment,
    // Backing storage for the record lent out by `next_record`.
    current: Option<Record>,
    open: bool,
    stop: StopSignal,
}

impl RealTimeHandle {
    pub fn open(hub: &TraceHub, name: &str) -> Result<Self, TraceError> {
        if name.is_empty() {
            return Err(TraceError::NotFound("empty session name".into()));
        }
        Ok(Self {
            hub: hub.clone(),
            name: name.to_owned(),
            attachment: Attachment::Pending,
            current: None,
            open: true,
            stop: StopSignal::new(),
        })
    }

    pub fn session_name(&self) -> &str {
        &self.name
    }

    fn receiver(&mut self) -> Result<Option<Receiver<Record>>, TraceError> {
        if let Attachment::Pending = self.attachment {
            let (generation, rx) = self.hub.attach_realtime(&self.name)?;
            trace_log!(Level::Debug, "session", "Attached to real-time session '{}'", self.name);
            self.attachment = Attachment::Attached { generation, rx };
        }
        match &self.attachment {
            Attachment::Attached { rx, .. } => Ok(Some(rx.clone())),
            _ => Ok(None),
        }
    }

    fn detach(&mut self) {
        if let Attachment::Attached { generation, .. } =
            std::mem::replace(&mut self.attachment, Attachment::Detached)
        {
            self.hub.detach_realtime(&self.name, generation);
            trace_log!(Level::Debug, "session", "Detached from real-time session '{}'", self.name);
        }
    }
}

impl SessionHandle for RealTimeHandle {
    fn mode(&self) -> SessionMode {
        SessionMode::RealTime
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn next_record(&mut self) -> Result<Option<RawRecord<'_>>, TraceError> {
        if !self.open {
            return Err(TraceError::InvalidState("real-time handle is closed".into()));
        }
        if self.stop.is_triggered() {
            self.detach();
            return Ok(None);
        }
        let Some(rx) = self.receiver()? else {
            return Ok(None);
        };

        let waker = self.stop.waker();
        // A disconnected channel means the controller stopped the session
        // and every buffered record has been drained.
        let received = select! {
            recv(rx) -> msg => msg.ok(),
            recv(waker) -> _ => None,
        };

        match received {
            Some(record) => {
                self.current = Some(record);
                Ok(self.current.as_ref().map(Record::as_raw))
            }
            None => {
                self.detach();
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.detach();
            self.current = None;
        }
    }
}

impl Drop for RealTimeHandle {
    fn drop(&mut self) {
        self.close();
    }
}
