//! Error types shared by both ends of a connection.

use std::io;

use thiserror::Error;

/// Failures while turning a byte stream into frames.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    TooLarge { len: usize, limit: usize },

    #[error("stream closed after {received} of {expected} expected bytes")]
    Truncated { expected: usize, received: usize },

    #[error("frame has no NUL separator between name and payload")]
    MissingSeparator,

    #[error("frame name is not valid UTF-8")]
    InvalidName,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the stream can no longer be trusted after this error.
    ///
    /// A bad body leaves the decoder aligned on the next length prefix, so
    /// reading may continue. A bad length or a dead socket does not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameError::TooLarge { .. } | FrameError::Truncated { .. } | FrameError::Io(_)
        )
    }
}

/// Failures while converting between frames and typed messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to encode {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: bincode::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FrameError::TooLarge { len: 10, limit: 5 }.is_fatal());
        assert!(FrameError::Truncated {
            expected: 5,
            received: 3
        }
        .is_fatal());
        assert!(!FrameError::MissingSeparator.is_fatal());
        assert!(!FrameError::InvalidName.is_fatal());
    }

    #[test]
    fn test_error_message_formatting() {
        let err = FrameError::Truncated {
            expected: 5,
            received: 3,
        };
        assert_eq!(
            err.to_string(),
            "stream closed after 3 of 5 expected bytes"
        );
    }
}
