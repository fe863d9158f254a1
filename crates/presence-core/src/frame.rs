use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to decode frame: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame has zero area")]
    Empty,
}

/// One still image captured from the video source, plus its capture time.
///
/// The encoded bytes are shared, so cloning a frame (e.g. to hand the
/// representative frame to a submission sink) never copies image data.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    timestamp: DateTime<Utc>,
}

impl Frame {
    /// Wrap encoded image bytes, stamped with the current wall-clock time.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self::with_timestamp(data, Utc::now())
    }

    pub fn with_timestamp(data: impl Into<Arc<[u8]>>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }

    /// Encoded image bytes (JPEG, PNG or whatever the source produced).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decode into an 8-bit RGB raster. Alpha, if any, is dropped.
    pub fn decode(&self) -> Result<RgbImage, DecodeError> {
        decode_rgb(&self.data)
    }
}

pub(crate) fn decode_rgb(data: &[u8]) -> Result<RgbImage, DecodeError> {
    let img = image::load_from_memory(data)?.to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(img)
}
