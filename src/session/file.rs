//! Recorded session files
//! ----------------------
//! A file session stores records back to back after a short header:
//
//!   ┌──────────────┬────────────┬─────────────────┬──────────────┬─ … ─┐
//!   │ magic "ETRC" │ u16 version│ u32 len │ frame │ u32 len │ frame│     │
//!   └──────────────┴────────────┴─────────────────┴──────────────┴─ … ─┘
//
//! * Lengths are little-endian and count the prost-encoded `RecordFrame`.
//! * End-of-file on a frame boundary is the end of the recording; anything
//!   shorter than a full frame is corruption.
//!
//! [`FrameWriter`] is used by the facility's file sessions, [`FrameReader`]
//! by [`FileReplayHandle`].

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use prost::Message;

use crate::error::TraceError;
use crate::record::{RawRecord, RecordFrame};
use crate::session::{SessionHandle, SessionMode, StopSignal};
use crate::trace_log;

const MAGIC: &[u8; 4] = b"ETRC";
const VERSION: u16 = 1;
/// Upper bound on the non-payload part of an encoded frame.
const FRAME_OVERHEAD: usize = 128;

/// Appends length-prefixed record frames to a writer.
pub struct FrameWriter<W: Write> {
    out: W,
    frames: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Write the file header and return a writer positioned after it.
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        Ok(Self { out, frames: 0 })
    }

    pub fn write_record(&mut self, record: &RawRecord<'_>) -> io::Result<()> {
        let buf = RecordFrame::from(record).encode_to_vec();
        let len = u32::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&buf)?;
        self.frames += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Reads record frames written by [`FrameWriter`].
pub struct FrameReader<R: Read> {
    input: R,
    max_frame_len: usize,
}

impl<R: Read> FrameReader<R> {
    /// Validate the header. `max_payload_len` bounds what a single frame may carry.
    pub fn new(mut input: R, max_payload_len: usize) -> Result<Self, TraceError> {
        let mut header = [0u8; 6];
        input.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => TraceError::Corrupt("missing file header".into()),
            _ => TraceError::from(e),
        })?;
        if &header[..4] != MAGIC {
            return Err(TraceError::Corrupt("bad magic".into()));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(TraceError::Corrupt(format!("unsupported version {version}")));
        }
        Ok(Self {
            input,
            max_frame_len: max_payload_len.saturating_add(FRAME_OVERHEAD),
        })
    }

    /// Next frame, or `None` on a clean end-of-file.
    pub fn read_frame(&mut self) -> Result<Option<RecordFrame>, TraceError> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.input.read(&mut len_buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(TraceError::Corrupt("truncated frame length".into())),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            return Err(TraceError::Corrupt(format!(
                "frame of {len} bytes exceeds limit of {}",
                self.max_frame_len
            )));
        }

        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        Ok(Some(RecordFrame::decode(buf.as_slice())?))
    }
}

/// Replays a recorded session file.
pub struct FileReplayHandle {
    path: PathBuf,
    reader: Option<FrameReader<BufReader<File>>>,
    // Backing storage for the record lent out by `next_record`.
    current: Option<RecordFrame>,
    max_payload_len: usize,
    stop: StopSignal,
}

impl FileReplayHandle {
    /// Open `path` for replay. Fails with `NotFound` or `Corrupt` on bad input.
    pub fn open(path: &Path, max_payload_len: usize) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TraceError::NotFound(format!("{}", path.display())),
            _ => TraceError::from(e),
        })?;
        let reader = FrameReader::new(BufReader::new(file), max_payload_len)?;
        trace_log!(log::Level::Debug, "session", "Opened replay file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            current: None,
            max_payload_len,
            stop: StopSignal::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionHandle for FileReplayHandle {
    fn mode(&self) -> SessionMode {
        SessionMode::FileReplay
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    fn next_record(&mut self) -> Result<Option<RawRecord<'_>>, TraceError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| TraceError::InvalidState("replay handle is closed".into()))?;
        if self.stop.is_triggered() {
            return Ok(None);
        }

        self.current = reader.read_frame()?;
        match &self.current {
            Some(frame) if frame.payload.len() > self.max_payload_len => Err(TraceError::Corrupt(
                format!("payload of {} bytes exceeds limit", frame.payload.len()),
            )),
            Some(frame) => frame.to_raw().map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            self.current = None;
            trace_log!(log::Level::Debug, "session", "Closed replay file {}", self.path.display());
        }
    }
}
