//! Presence capture: the liveness capture session and the collaborators it
//! drives.
//!
//! [`CaptureSession`] owns the capture loop: it pulls frames from a
//! [`VideoSource`] on a fixed cadence, scores them, and once enough frames are
//! accepted runs the liveness check and hands the representative frame to a
//! [`SubmissionSink`]. [`engine::spawn_engine`] runs sessions on a dedicated
//! single-threaded runtime behind a clone-safe handle.

pub mod config;
pub mod engine;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod source;

pub use config::{CaptureConfig, ConfigError};
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use scheduler::{Scheduler, Ticker, TokioScheduler};
pub use session::{
    cancel_pair, CancelHandle, CancelSignal, CaptureSession, SessionError, SessionOutcome,
    SessionReport, SessionState,
};
pub use sink::{
    GeofencedSink, LogStatus, Status, StatusSink, SubmissionDetails, SubmissionOutcome,
    SubmissionSink, SubmitError,
};
pub use source::{AcquireError, CaptureError, GeoProvider, VideoSource};
