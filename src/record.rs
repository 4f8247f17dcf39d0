//! Trace record model.
//!
//! A session hands out [`RawRecord`]s whose payload borrows session-owned
//! memory; that memory is only valid until the session produces the next
//! record. Anything that keeps a record past that point must [`capture`]
//! it into an owned [`Record`], which deep-copies the payload.
//!
//! Recorded files store each record as a prost-encoded [`RecordFrame`].
//!
//! [`capture`]: RawRecord::capture

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TraceError;

/// Stable identifier of a trace provider.
pub type ProviderId = Uuid;

/// Identifier of an event class (the "event type" GUID of a record).
pub type EventType = Uuid;

/// Record severity. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TraceLevel {
    Critical = 1,
    Error = 2,
    Warning = 3,
    Information = 4,
    Verbose = 5,
}

impl TraceLevel {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(TraceLevel::Critical),
            2 => Some(TraceLevel::Error),
            3 => Some(TraceLevel::Warning),
            4 => Some(TraceLevel::Information),
            5 => Some(TraceLevel::Verbose),
            _ => None,
        }
    }

    /// True when a provider enabled at `self` should emit a record at `level`.
    pub fn admits(self, level: TraceLevel) -> bool {
        level <= self
    }
}

/// Current time at the microsecond resolution recorded files keep.
pub fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::<Utc>::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// A record as produced by a session, borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub provider_id: ProviderId,
    pub event_type: EventType,
    pub opcode: u8,
    pub level: TraceLevel,
    pub flags: u32,
    pub process_id: u32,
    pub thread_id: u32,
    pub payload: &'a [u8],
}

impl RawRecord<'static> {
    /// Header-only record; the provider stamps time, provider id, pid and tid when logging.
    pub fn new(event_type: EventType, opcode: u8, level: TraceLevel) -> Self {
        RawRecord {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            provider_id: Uuid::nil(),
            event_type,
            opcode,
            level,
            flags: 0,
            process_id: 0,
            thread_id: 0,
            payload: &[],
        }
    }
}

impl<'a> RawRecord<'a> {
    pub fn with_payload<'b>(self, payload: &'b [u8]) -> RawRecord<'b> {
        RawRecord {
            timestamp: self.timestamp,
            provider_id: self.provider_id,
            event_type: self.event_type,
            opcode: self.opcode,
            level: self.level,
            flags: self.flags,
            process_id: self.process_id,
            thread_id: self.thread_id,
            payload,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Deep-copy into an owned record that no longer aliases session memory.
    pub fn capture(&self) -> Record {
        Record {
            timestamp: self.timestamp,
            provider_id: self.provider_id,
            event_type: self.event_type,
            opcode: self.opcode,
            level: self.level,
            flags: self.flags,
            process_id: self.process_id,
            thread_id: self.thread_id,
            payload: self.payload.to_vec(),
        }
    }
}

/// One captured trace event. Owns its payload exclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub provider_id: ProviderId,
    pub event_type: EventType,
    pub opcode: u8,
    pub level: TraceLevel,
    pub flags: u32,
    pub process_id: u32,
    pub thread_id: u32,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Borrow this record in the form sessions hand out.
    pub fn as_raw(&self) -> RawRecord<'_> {
        RawRecord {
            timestamp: self.timestamp,
            provider_id: self.provider_id,
            event_type: self.event_type,
            opcode: self.opcode,
            level: self.level,
            flags: self.flags,
            process_id: self.process_id,
            thread_id: self.thread_id,
            payload: &self.payload,
        }
    }
}

/// On-disk encoding of one record inside a recorded session file.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RecordFrame {
    #[prost(int64, tag = "1")]
    pub timestamp_micros: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub provider_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub event_type: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub opcode: u32,
    #[prost(uint32, tag = "5")]
    pub level: u32,
    #[prost(uint32, tag = "6")]
    pub flags: u32,
    #[prost(uint32, tag = "7")]
    pub process_id: u32,
    #[prost(uint32, tag = "8")]
    pub thread_id: u32,
    #[prost(bytes = "vec", tag = "9")]
    pub payload: Vec<u8>,
}

impl From<&RawRecord<'_>> for RecordFrame {
    fn from(r: &RawRecord<'_>) -> Self {
        RecordFrame {
            timestamp_micros: r.timestamp.timestamp_micros(),
            provider_id: r.provider_id.as_bytes().to_vec(),
            event_type: r.event_type.as_bytes().to_vec(),
            opcode: u32::from(r.opcode),
            level: r.level as u32,
            flags: r.flags,
            process_id: r.process_id,
            thread_id: r.thread_id,
            payload: r.payload.to_vec(),
        }
    }
}

impl RecordFrame {
    /// View the decoded frame as a raw record borrowing the frame's payload.
    pub fn to_raw(&self) -> Result<RawRecord<'_>, TraceError> {
        let timestamp = DateTime::<Utc>::from_timestamp_micros(self.timestamp_micros)
            .ok_or_else(|| TraceError::Corrupt(format!("timestamp {} out of range", self.timestamp_micros)))?;
        let provider_id = Uuid::from_slice(&self.provider_id)
            .map_err(|e| TraceError::Corrupt(format!("provider id: {e}")))?;
        let event_type = Uuid::from_slice(&self.event_type)
            .map_err(|e| TraceError::Corrupt(format!("event type: {e}")))?;
        let opcode = u8::try_from(self.opcode)
            .map_err(|_| TraceError::Corrupt(format!("opcode {} out of range", self.opcode)))?;
        let level = u8::try_from(self.level)
            .ok()
            .and_then(TraceLevel::from_u8)
            .ok_or_else(|| TraceError::Corrupt(format!("unknown level {}", self.level)))?;

        Ok(RawRecord {
            timestamp,
            provider_id,
            event_type,
            opcode,
            level,
            flags: self.flags,
            process_id: self.process_id,
            thread_id: self.thread_id,
            payload: &self.payload,
        })
    }
}
