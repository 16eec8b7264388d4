//! Error types shared by the stores, the recording façade and the extractor.

use std::path::PathBuf;

/// Errors raised while reading, writing or slicing a recording.
#[derive(Debug)]
pub enum RecordingError {
    /// Metadata key absent from both the overlay and the persisted source.
    MissingParameter(String),
    /// Metadata key present but its value could not be interpreted.
    MalformedParameter { key: String, value: String },
    /// A bounded read asked for more samples than remain.
    ///
    /// This is an expected end-of-data condition, not corruption.
    StreamExhausted { requested: usize, available: usize },
    /// No channel with the given name.
    UnknownChannel(String),
    /// A buffer and its channel names disagree on the channel count.
    ShapeMismatch { rows: usize, names: usize },
    /// A caller-supplied value is out of its domain.
    InvalidArgument(String),
    /// One of the persisted artifacts could not be parsed.
    MalformedPersistedData { path: PathBuf, reason: String },
    /// Underlying I/O failure.
    Io(std::io::Error),
}

impl RecordingError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RecordingError::MalformedPersistedData {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error only signals that the sample stream ran out.
    pub fn is_stream_exhausted(&self) -> bool {
        matches!(self, RecordingError::StreamExhausted { .. })
    }
}

impl std::fmt::Display for RecordingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingError::MissingParameter(key) => write!(f, "Missing parameter: {key}"),
            RecordingError::MalformedParameter { key, value } => {
                write!(f, "Malformed parameter {key}: {value:?}")
            }
            RecordingError::StreamExhausted {
                requested,
                available,
            } => write!(
                f,
                "Sample stream exhausted: requested {requested} samples, {available} available"
            ),
            RecordingError::UnknownChannel(name) => write!(f, "Unknown channel: {name}"),
            RecordingError::ShapeMismatch { rows, names } => write!(
                f,
                "Shape mismatch: buffer has {rows} channels but {names} channel names were given"
            ),
            RecordingError::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            RecordingError::MalformedPersistedData { path, reason } => {
                write!(f, "Malformed data in {}: {reason}", path.display())
            }
            RecordingError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for RecordingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(e: std::io::Error) -> Self {
        RecordingError::Io(e)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RecordingError::MissingParameter("sampling_frequency".to_string());
        assert_eq!(err.to_string(), "Missing parameter: sampling_frequency");

        let err = RecordingError::ShapeMismatch { rows: 3, names: 2 };
        assert!(err.to_string().contains("3 channels"));

        let err = RecordingError::malformed("/tmp/a.obci.xml", "unexpected eof");
        assert!(err.to_string().contains("/tmp/a.obci.xml"));
    }

    #[test]
    fn test_stream_exhausted_detection() {
        let err = RecordingError::StreamExhausted {
            requested: 100,
            available: 50,
        };
        assert!(err.is_stream_exhausted());
        assert!(!RecordingError::UnknownChannel("x".into()).is_stream_exhausted());
    }
}
