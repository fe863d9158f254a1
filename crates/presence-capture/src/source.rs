//! Collaborators the capture session pulls from: the camera and the location
//! provider.

use presence_core::{Frame, GeoLocation};
use thiserror::Error;

/// Why the video source could not be opened. Fatal to the session; the
/// display text is the message shown to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquireError {
    #[error("Camera permission denied. Please allow camera access and try again.")]
    PermissionDenied,
    #[error("No camera found on this device.")]
    NotFound,
    #[error("Camera is already in use by another application.")]
    Busy,
    #[error("Camera doesn't support the required settings.")]
    Overconstrained,
    #[error("Camera initialization failed: {0}")]
    Other(String),
}

/// A single frame read failed. Recoverable; the tick counts as a rejection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("video source not ready")]
    NotReady,
    #[error("frame read failed: {0}")]
    Read(String),
}

/// A camera (or anything standing in for one) that yields encoded frames.
///
/// `acquire` opens the stream and returns a handle; `current_frame` is called
/// once per capture tick; `release` gives the device back. The session calls
/// `release` exactly once for every handle it acquired.
#[allow(async_fn_in_trait)]
pub trait VideoSource {
    type Handle;

    async fn acquire(&self) -> Result<Self::Handle, AcquireError>;

    async fn current_frame(&self, handle: &Self::Handle) -> Result<Frame, CaptureError>;

    fn release(&self, handle: Self::Handle);
}

/// Optional location fix attached to the final submission.
///
/// `None` is a valid answer and never blocks the pipeline.
#[allow(async_fn_in_trait)]
pub trait GeoProvider {
    async fn locate(&self) -> Option<GeoLocation>;
}

/// A fixed location (or none), e.g. supplied on the command line.
impl GeoProvider for Option<GeoLocation> {
    async fn locate(&self) -> Option<GeoLocation> {
        *self
    }
}
