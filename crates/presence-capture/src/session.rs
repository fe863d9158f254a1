//! The liveness capture session.
//!
//! One [`CaptureSession`] value owns everything a capture needs: the
//! collaborators, the accepted-frame buffer, and the processing flag. A
//! session moves `Idle → Capturing → Evaluating → Succeeded | Failed`, or
//! leaves `Capturing` early as `TimedOut` or `Cancelled`. Whatever the exit
//! path, [`CaptureSession::cleanup`] runs exactly once, either as `run`
//! returns or when its future is dropped.

use std::sync::Arc;
use std::time::Duration;

use presence_core::{liveness, scorer, Frame, GeoLocation, LivenessResult};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{CaptureConfig, ConfigError};
use crate::scheduler::{Scheduler, Ticker};
use crate::sink::{Status, StatusSink, SubmissionOutcome, SubmissionSink};
use crate::source::{AcquireError, CaptureError, GeoProvider, VideoSource};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a capture session is already active")]
    AlreadyActive,
    #[error("camera unavailable: {0}")]
    Acquire(#[from] AcquireError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Capturing,
    Evaluating,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

/// Terminal state a session reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl From<SessionOutcome> for SessionState {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Succeeded => SessionState::Succeeded,
            SessionOutcome::Failed => SessionState::Failed,
            SessionOutcome::TimedOut => SessionState::TimedOut,
            SessionOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Summary of one finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub outcome: SessionOutcome,
    /// Capture ticks that completed (accepted, rejected, or failed reads).
    pub ticks: usize,
    /// Frames in the buffer when the session ended.
    pub accepted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LivenessResult>,
    /// Buffer index of the frame handed to the submission sink.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionOutcome>,
}

/// Sending half of a cancel signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

/// Receiving half of a cancel signal, polled by the running session.
#[derive(Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Clear a previous cancellation so the next session starts fresh.
    pub fn reset(&self) {
        self.0.send_replace(false);
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested. Cancel-safe.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                // Every handle is gone; nobody can cancel any more
                std::future::pending::<()>().await;
            }
        }
    }
}

enum TickResult {
    Accepted(Frame),
    Rejected,
    CaptureFailed(CaptureError),
}

enum Step {
    Cancelled,
    TimedOut,
    Tick(TickResult),
}

enum CaptureEnd {
    Complete,
    TimedOut,
    Cancelled,
}

pub struct CaptureSession<V: VideoSource, G, S, R, C> {
    config: CaptureConfig,
    source: V,
    geo: G,
    sink: S,
    status: R,
    scheduler: C,
    state: SessionState,
    processing: bool,
    buffer: Vec<Frame>,
    handle: Option<V::Handle>,
    ticks: usize,
}

impl<V, G, S, R, C> CaptureSession<V, G, S, R, C>
where
    V: VideoSource,
    G: GeoProvider,
    S: SubmissionSink,
    R: StatusSink,
    C: Scheduler,
{
    /// Build an idle session. The config is validated here, since its
    /// fields are public and may have been assembled by hand.
    pub fn new(
        config: CaptureConfig,
        source: V,
        geo: G,
        sink: S,
        status: R,
        scheduler: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.required_frames;
        Ok(Self {
            config,
            source,
            geo,
            sink,
            status,
            scheduler,
            state: SessionState::Idle,
            processing: false,
            buffer: Vec::with_capacity(capacity),
            handle: None,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Current state; after a session ends, the terminal state it reached.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Run one complete capture session.
    ///
    /// Returns a report for every terminal state, including timeout and
    /// cancellation. Only session-level failures (camera unavailable, a
    /// session already running) are errors.
    pub async fn run(&mut self, cancel: &mut CancelSignal) -> Result<SessionReport, SessionError> {
        if self.processing {
            return Err(SessionError::AlreadyActive);
        }

        let id = Uuid::new_v4();
        self.processing = true;
        self.buffer.clear();
        self.ticks = 0;
        self.state = SessionState::Capturing;

        let span = tracing::info_span!("session", %id);
        // Cleanup runs when the guard drops, including when this future is
        // dropped mid-capture
        let mut guard = InFlight {
            session: self,
            span: span.clone(),
        };
        let result = guard.session.drive(id, cancel).instrument(span).await;
        drop(guard);
        result
    }

    async fn drive(
        &mut self,
        id: Uuid,
        cancel: &mut CancelSignal,
    ) -> Result<SessionReport, SessionError> {
        tracing::info!(
            required = self.config.required_frames,
            interval_ms = self.config.capture_interval_ms,
            timeout_ms = self.config.session_timeout_ms,
            "capture session started"
        );
        self.status.report(Status::Preparing);

        let location = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(self.cancelled(id, None)),
            location = locate_within(&self.geo, &self.scheduler, self.config.geo_timeout()) => location,
        };
        match &location {
            Some(loc) => tracing::debug!(lat = loc.latitude, lon = loc.longitude, "location obtained"),
            None => tracing::debug!("location not available"),
        }

        let handle = self.source.acquire().await.map_err(|e| {
            tracing::error!(error = %e, "video source unavailable");
            self.status.report(Status::Error {
                message: e.to_string(),
            });
            SessionError::from(e)
        })?;
        let handle = &*self.handle.insert(handle);
        tracing::debug!("video source acquired");

        let warmup = self.config.warmup();
        if !warmup.is_zero() {
            let warmed = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.scheduler.once(warmup) => true,
            };
            if !warmed {
                return Ok(self.cancelled(id, location));
            }
        }

        let required = self.config.required_frames;
        self.status.report(Status::AwaitingFace);

        // Timers live only for the capture phase and are dropped with this block
        let end = {
            let deadline = self.scheduler.once(self.config.session_timeout());
            tokio::pin!(deadline);
            let mut ticker = self.scheduler.repeating(self.config.capture_interval());

            loop {
                // A tick due on the deadline itself still counts
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    result = capture_tick(&mut ticker, &self.source, handle) => Step::Tick(result),
                    _ = &mut deadline => Step::TimedOut,
                };

                let result = match step {
                    Step::Cancelled => break CaptureEnd::Cancelled,
                    Step::TimedOut => break CaptureEnd::TimedOut,
                    Step::Tick(result) => result,
                };

                self.ticks += 1;
                match result {
                    TickResult::Accepted(frame) => {
                        self.buffer.push(frame);
                        let accepted = self.buffer.len();
                        tracing::debug!(accepted, required, "frame accepted");
                        self.status.report(Status::Accepted { accepted, required });
                        if accepted >= required {
                            break CaptureEnd::Complete;
                        }
                    }
                    TickResult::Rejected => {
                        tracing::trace!(tick = self.ticks, "frame rejected");
                        self.status.report(Status::AwaitingFace);
                    }
                    TickResult::CaptureFailed(e) => {
                        tracing::warn!(tick = self.ticks, error = %e, "frame capture failed");
                        self.status.report(Status::AwaitingFace);
                    }
                }
            }
        };

        match end {
            CaptureEnd::Complete => Ok(self.evaluate_and_submit(id, location).await),
            CaptureEnd::TimedOut => {
                tracing::info!(
                    accepted = self.buffer.len(),
                    ticks = self.ticks,
                    "capture session timed out"
                );
                self.status.report(Status::TimedOut);
                let mut report = self.conclude(id, SessionOutcome::TimedOut);
                report.location = location;
                Ok(report)
            }
            CaptureEnd::Cancelled => Ok(self.cancelled(id, location)),
        }
    }

    async fn evaluate_and_submit(
        &mut self,
        id: Uuid,
        location: Option<GeoLocation>,
    ) -> SessionReport {
        self.state = SessionState::Evaluating;
        self.status.report(Status::Evaluating);

        let result = liveness::evaluate(
            &self.buffer,
            self.config.required_frames,
            &self.config.liveness,
        );

        if !result.is_live {
            tracing::info!(
                rejection = ?result.rejection,
                avg_variation = result.avg_variation,
                max_variation = result.max_variation,
                "liveness check failed"
            );
            self.status.report(Status::Failed);
            let mut report = self.conclude(id, SessionOutcome::Failed);
            report.liveness = Some(result);
            report.location = location;
            return report;
        }

        let index = self.buffer.len() / 2;
        let representative = self.buffer[index].clone();
        tracing::info!(
            avg_variation = result.avg_variation,
            max_variation = result.max_variation,
            frame = index,
            "liveness confirmed"
        );

        // The camera is not needed while the submission is in flight
        self.release_source();
        self.status.report(Status::Submitting);

        let submission = match self.sink.submit(&representative, location.as_ref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "submission failed");
                SubmissionOutcome::failure(format!("Failed to process attendance: {e}"))
            }
        };
        tracing::info!(
            success = submission.success,
            message = %submission.message,
            "submission complete"
        );

        self.status.report(Status::Succeeded);
        let mut report = self.conclude(id, SessionOutcome::Succeeded);
        report.liveness = Some(result);
        report.representative_index = Some(index);
        report.location = location;
        report.submission = Some(submission);
        report
    }

    fn cancelled(&mut self, id: Uuid, location: Option<GeoLocation>) -> SessionReport {
        tracing::info!(ticks = self.ticks, "capture session cancelled");
        let mut report = self.conclude(id, SessionOutcome::Cancelled);
        report.location = location;
        report
    }

    fn conclude(&mut self, id: Uuid, outcome: SessionOutcome) -> SessionReport {
        self.state = outcome.into();
        SessionReport {
            id,
            outcome,
            ticks: self.ticks,
            accepted: self.buffer.len(),
            liveness: None,
            representative_index: None,
            location: None,
            submission: None,
        }
    }

    /// Release the camera, drop buffered frames, clear the processing flag
    /// and reset the status surface.
    ///
    /// `run` guarantees this on every exit path, including a dropped `run`
    /// future. Calling it again, or when no session is active, does nothing.
    pub fn cleanup(&mut self) {
        if !self.processing {
            tracing::trace!("cleanup: no active session");
            return;
        }

        self.release_source();
        self.buffer.clear();
        self.processing = false;
        if matches!(self.state, SessionState::Capturing | SessionState::Evaluating) {
            // Interrupted by an error before reaching a terminal state
            self.state = SessionState::Idle;
        }
        self.status.report(Status::Idle);
        tracing::debug!(state = ?self.state, "session cleaned up");
    }

    fn release_source(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.source.release(handle);
            tracing::debug!("video source released");
        }
    }
}

/// Holds a running session; dropping it cleans the session up.
struct InFlight<'a, V, G, S, R, C>
where
    V: VideoSource,
    G: GeoProvider,
    S: SubmissionSink,
    R: StatusSink,
    C: Scheduler,
{
    session: &'a mut CaptureSession<V, G, S, R, C>,
    span: tracing::Span,
}

impl<V, G, S, R, C> Drop for InFlight<'_, V, G, S, R, C>
where
    V: VideoSource,
    G: GeoProvider,
    S: SubmissionSink,
    R: StatusSink,
    C: Scheduler,
{
    fn drop(&mut self) {
        let _entered = self.span.enter();
        self.session.cleanup();
    }
}

async fn capture_tick<V: VideoSource, T: Ticker>(
    ticker: &mut T,
    source: &V,
    handle: &V::Handle,
) -> TickResult {
    ticker.tick().await;
    match source.current_frame(handle).await {
        Ok(frame) if scorer::score(&frame) => TickResult::Accepted(frame),
        Ok(_) => TickResult::Rejected,
        Err(e) => TickResult::CaptureFailed(e),
    }
}

async fn locate_within<G: GeoProvider, C: Scheduler>(
    geo: &G,
    scheduler: &C,
    timeout: Duration,
) -> Option<GeoLocation> {
    tokio::select! {
        biased;
        location = geo.locate() => location,
        _ = scheduler.once(timeout) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "geolocation timed out");
            None
        }
    }
}
