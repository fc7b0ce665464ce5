//! Error type shared by the planner, compositor, orchestrator and raster I/O.

use std::path::PathBuf;

/// Broad category of a [`MergeError`].
///
/// Every variant is fatal to the merge; there is no retry and no partial
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An input raster or option violates a requirement (e.g. not 4-band RGBA)
    InvalidInput,
    /// The destination exists and overwriting was not confirmed
    OutputExists,
    /// Reading a source or writing the destination failed
    IoFailure,
}

/// Error type for merge operations
#[derive(Debug)]
pub enum MergeError {
    /// Invalid input raster or option
    InvalidInput(String),
    /// Destination already exists
    OutputExists(PathBuf),
    /// I/O error during file operations
    Io(std::io::Error),
    /// TIFF decoding or encoding error
    Tiff(String),
}

impl MergeError {
    /// Shorthand for an [`MergeError::InvalidInput`] with a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::OutputExists(_) => ErrorKind::OutputExists,
            Self::Io(_) | Self::Tiff(_) => ErrorKind::IoFailure,
        }
    }
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "{msg}"),
            Self::OutputExists(path) => write!(
                f,
                "Output exists and won't be overwritten without the `-f` option: {}",
                path.display()
            ),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Tiff(e) => write!(f, "TIFF error: {e}"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<tiff::TiffError> for MergeError {
    fn from(e: tiff::TiffError) -> Self {
        Self::Tiff(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type MergeResult<T> = Result<T, MergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(MergeError::invalid("bad").kind(), ErrorKind::InvalidInput);
        assert_eq!(
            MergeError::OutputExists(PathBuf::from("out.tif")).kind(),
            ErrorKind::OutputExists
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MergeError::from(io).kind(), ErrorKind::IoFailure);
        assert_eq!(MergeError::Tiff("corrupt".into()).kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_invalid_input_message_is_verbatim() {
        let err = MergeError::invalid("Inputs must be 4-band RGBA rasters");
        assert_eq!(err.to_string(), "Inputs must be 4-band RGBA rasters");
    }

    #[test]
    fn test_output_exists_message() {
        let err = MergeError::OutputExists(PathBuf::from("/tmp/merged.tif"));
        let msg = err.to_string();
        assert!(msg.starts_with("Output exists and won't be overwritten"));
        assert!(msg.contains("/tmp/merged.tif"));
    }
}
