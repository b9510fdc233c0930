use std::path::PathBuf;

use thiserror::Error;

pub type HlsResult<T> = Result<T, HlsError>;

/// Download engine failures.
#[derive(Debug, Error)]
pub enum HlsError {
    /// Missing `#EXTM3U` header or structurally malformed playlist.
    #[error("invalid playlist: {0}")]
    InvalidPlaylist(String),

    /// Strict-mode parse hit an unrecognized tag.
    #[error("unsupported tag: {0}")]
    UnsupportedTag(String),

    /// The media playlist contains zero segments.
    #[error("No segments found in playlist")]
    EmptyPlaylist,

    /// A key resource could not be fetched.
    #[error("Failed to fetch key: {0}")]
    KeyFetchFailed(strand_net::NetError),

    /// A fetched key was not exactly 16 bytes.
    #[error("invalid key length: expected 16 bytes, got {0}")]
    KeyLengthInvalid(usize),

    /// A segment references a key spec whose key was never populated.
    #[error("key not prefetched for {0}")]
    KeyMissing(String),

    /// A segment fetch failed terminally (retries exhausted or a
    /// non-transient fault).
    #[error("Failed to process segment {}: {source}", .index + 1)]
    SegmentFailed {
        index: usize,
        source: strand_net::NetError,
    },

    /// The crypto layer rejected the ciphertext.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Local file I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A segment file vanished between download and combination.
    #[error("Missing segment file: segment_{}.ts", .index + 1)]
    MissingSegment { index: usize },

    /// Cooperative cancellation was observed.
    #[error("cancelled")]
    Cancelled,

    /// A worker task died abnormally (panic or runtime shutdown).
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Invalid configuration or playlist attribute value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HlsError {
    /// Helper for wrapping file I/O failures with their path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a cooperative-cancellation exit rather than a
    /// genuine failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
