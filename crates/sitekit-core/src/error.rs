use thiserror::Error;

/// Failures from the client-side compression pipeline. None are retried
/// internally; the caller decides whether to retry.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Drawing surface unavailable: {0}")]
    SurfaceUnavailable(String),
}
