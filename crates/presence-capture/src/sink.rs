//! Collaborators the capture session pushes to: the submission endpoint and
//! the status surface.

use std::fmt;

use presence_core::{Frame, GeoLocation, Geofence};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Extra information the attendance service returns on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// What the remote service said about a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<SubmissionDetails>,
}

impl SubmissionOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }
}

/// Remote recognition/attendance endpoint that receives the representative frame.
#[allow(async_fn_in_trait)]
pub trait SubmissionSink {
    async fn submit(
        &self,
        frame: &Frame,
        location: Option<&GeoLocation>,
    ) -> Result<SubmissionOutcome, SubmitError>;
}

/// Refuses submissions from outside the configured geofence before they
/// reach the inner sink.
pub struct GeofencedSink<S> {
    fence: Geofence,
    inner: S,
}

impl<S> GeofencedSink<S> {
    pub fn new(fence: Geofence, inner: S) -> Self {
        Self { fence, inner }
    }
}

impl<S: SubmissionSink> SubmissionSink for GeofencedSink<S> {
    async fn submit(
        &self,
        frame: &Frame,
        location: Option<&GeoLocation>,
    ) -> Result<SubmissionOutcome, SubmitError> {
        let decision = self.fence.check(location);
        if let Some(message) = decision.refusal_message() {
            tracing::warn!(?decision, "submission refused by geofence");
            return Ok(SubmissionOutcome::failure(message));
        }
        self.inner.submit(frame, location).await
    }
}

/// Discrete progress updates for whatever surface the user is watching.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    /// Acquiring location and camera, warming up.
    Preparing,
    /// The last tick produced no usable face.
    AwaitingFace,
    /// A frame was accepted.
    Accepted { accepted: usize, required: usize },
    /// Running the liveness check.
    Evaluating,
    /// Liveness confirmed; handing the frame to the submission sink.
    Submitting,
    Succeeded,
    Failed,
    TimedOut,
    /// Session-level failure, with a user-facing message.
    Error { message: String },
    /// Session over; affordances back to their pre-session state.
    Idle,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Preparing => write!(f, "Preparing liveness detection..."),
            Status::AwaitingFace => {
                write!(f, "Please position your face clearly in the camera frame")
            }
            Status::Accepted { accepted, required } => {
                write!(f, "Valid face detected ({accepted}/{required})")
            }
            Status::Evaluating => write!(f, "Analyzing liveness..."),
            Status::Submitting => write!(f, "Liveness confirmed! Processing attendance..."),
            Status::Succeeded => write!(f, "Attendance processed"),
            Status::Failed => write!(f, "Liveness detection failed. Please try again."),
            Status::TimedOut => write!(f, "Timeout. Please try again with better lighting."),
            Status::Error { message } => write!(f, "{message}"),
            Status::Idle => write!(f, "Ready"),
        }
    }
}

/// One-way status channel. Implementations must not block.
pub trait StatusSink {
    fn report(&self, status: Status);
}

/// Status sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report(&self, status: Status) {
        tracing::info!(status = ?status, "{status}");
    }
}

/// Forward statuses to another task; a closed receiver drops them silently.
impl StatusSink for mpsc::UnboundedSender<Status> {
    fn report(&self, status: Status) {
        let _ = self.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::GeofenceArea;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
    }

    impl SubmissionSink for CountingSink {
        async fn submit(
            &self,
            _frame: &Frame,
            _location: Option<&GeoLocation>,
        ) -> Result<SubmissionOutcome, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SubmissionOutcome {
                success: true,
                message: "ok".to_string(),
                details: None,
            })
        }
    }

    fn fence() -> Geofence {
        Geofence::new(vec![GeofenceArea {
            name: "office".to_string(),
            latitude: 52.52,
            longitude: 13.405,
            radius_m: 100.0,
        }])
    }

    #[tokio::test]
    async fn test_geofence_refuses_outside() {
        let sink = GeofencedSink::new(fence(), CountingSink::default());
        let frame = Frame::new(vec![0u8; 4]);
        let far = GeoLocation::new(52.60, 13.405);

        let outcome = sink.submit(&frame, Some(&far)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("not within any allowed"));

        let outcome = sink.submit(&frame, None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(sink.inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_geofence_forwards_inside() {
        let sink = GeofencedSink::new(fence(), CountingSink::default());
        let frame = Frame::new(vec![0u8; 4]);
        let here = GeoLocation::new(52.5201, 13.405);

        let outcome = sink.submit(&frame, Some(&here)).await.unwrap();
        assert!(outcome.success);
        assert_eq!(sink.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_json_shape() {
        let json = serde_json::to_value(Status::Accepted {
            accepted: 3,
            required: 8,
        })
        .unwrap();
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["accepted"], 3);
        assert_eq!(
            Status::Accepted {
                accepted: 3,
                required: 8
            }
            .to_string(),
            "Valid face detected (3/8)"
        );
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.report(Status::Idle);
    }
}
