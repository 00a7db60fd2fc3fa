//! Error types shared across Framecast crates.

use std::path::PathBuf;

/// Top-level error type for Framecast operations.
#[derive(Debug, thiserror::Error)]
pub enum FramecastError {
    #[error("Invalid export configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Writer setup failed: {message}")]
    WriterSetup { message: String },

    #[error("Encoder rejected frame {frame_index}: {message}")]
    EncodeRejection { frame_index: u64, message: String },

    #[error("Failed to decode asset {path}: {message}")]
    AssetDecode { path: PathBuf, message: String },

    #[error("Output verification failed for {path}: {message}")]
    OutputVerification { path: PathBuf, message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramecastError.
pub type FramecastResult<T> = Result<T, FramecastError>;

/// Coarse classification surfaced in export completion results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfiguration,
    WriterSetupFailure,
    EncodeRejection,
    AssetDecodeFailure,
    OutputVerificationFailure,
    Cancelled,
    Io,
    Internal,
}

impl FramecastError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: msg.into(),
        }
    }

    pub fn writer_setup(msg: impl Into<String>) -> Self {
        Self::WriterSetup {
            message: msg.into(),
        }
    }

    pub fn encode_rejection(frame_index: u64, msg: impl Into<String>) -> Self {
        Self::EncodeRejection {
            frame_index,
            message: msg.into(),
        }
    }

    pub fn asset_decode(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::AssetDecode {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn output_verification(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::OutputVerification {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// The completion-result kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration { .. } | Self::Unsupported { .. } => {
                ErrorKind::InvalidConfiguration
            }
            Self::WriterSetup { .. } => ErrorKind::WriterSetupFailure,
            Self::EncodeRejection { .. } => ErrorKind::EncodeRejection,
            Self::AssetDecode { .. } | Self::FileNotFound { .. } => ErrorKind::AssetDecodeFailure,
            Self::OutputVerification { .. } => ErrorKind::OutputVerificationFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error aborts a whole export job (as opposed to being
    /// absorbed at the element or audio-layer level).
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::AssetDecodeFailure)
    }
}
