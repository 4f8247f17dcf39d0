// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-exports the consumer engine and its
// collaborators for `main.rs` and integration tests.

mod macros;

pub mod bridge;
pub mod collector;
pub mod config;
pub mod consumer;
pub mod error;
pub mod facility;
pub mod logging;
pub mod record;
pub mod session;

pub use collector::{Collector, Signal};
pub use consumer::{Consumer, ConsumerState, DispatchSink};
pub use error::{SinkError, TraceError};
pub use facility::{Privilege, SessionProperties, TraceController, TraceHub, TraceProvider};
pub use record::{EventType, ProviderId, RawRecord, Record, TraceLevel};
pub use session::{SessionHandle, SessionMode, StopSignal};

// Used by `trace_log!` so callers need not depend on these crates directly.
#[doc(hidden)]
pub mod __private {
    pub use chrono;
    pub use log;
}
