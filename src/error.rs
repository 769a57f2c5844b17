use std::collections::TryReserveError;
use thiserror::Error;

/// Everything that can go wrong while setting up the engine or mapping a frame
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// The palette is empty, has more than 256 colors, or its source is malformed.
    ///
    /// Fatal to engine construction. No table is built.
    #[error("invalid palette: {0}")]
    InvalidPalette(String),
    /// Zero width/height, stride narrower than the frame, or too few pixels for the dimensions.
    ///
    /// Only the offending call fails, the engine stays usable.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    /// Output slice needs to be bigger
    #[error("output buffer holds {got} pixels, but the frame needs {needed}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Function called with invalid arguments
    #[error("value out of range: {0}")]
    ValueOutOfRange(&'static str),
    /// The lookup table or a frame buffer could not be allocated
    #[error("out of memory")]
    OutOfMemory,
    /// The dedicated worker pool could not be started
    #[error("thread pool: {0}")]
    ThreadPool(String),
    /// Configuration file could not be parsed or names something unknown
    #[error("configuration: {0}")]
    Config(String),
}

impl From<TryReserveError> for Error {
    #[cold]
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

#[test]
fn messages() {
    let e = Error::BufferTooSmall { needed: 12, got: 3 };
    assert_eq!(e.to_string(), "output buffer holds 3 pixels, but the frame needs 12");
    assert_eq!(Error::InvalidPalette("empty".into()).to_string(), "invalid palette: empty");

    let mut v = Vec::<u8>::new();
    let err: Error = v.try_reserve(usize::MAX).unwrap_err().into();
    assert_eq!(err, Error::OutOfMemory);
}
