use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the cut-out worker.
///
/// # Why the source is part of the message
///
/// Every error raised while handling a command ends up as the `error` string of a
/// wire response, and the host only ever sees `Display`. The variants therefore
/// render their source inline instead of leaving it to a chain walker.
#[derive(Error, Debug)]
pub enum CutoutError {
    #[error("Decode error: {operation} failed: {source}")]
    Decode {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Segmentation error: {operation} failed: {source}")]
    Segmentation {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Internal error: {operation} failed: {source}")]
    Internal {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, CutoutError>;

impl CutoutError {
    pub fn decode(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Decode {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn segmentation(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Segmentation {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn internal(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Short name of the error class, used in log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::Segmentation { .. } => "segmentation",
            Self::Protocol { .. } => "protocol",
            Self::Internal { .. } => "internal",
            Self::Model { .. } => "model",
        }
    }
}

/// Convert I/O errors to internal errors.
///
/// The only I/O the library does is writing responses, so the operation is fixed.
impl From<std::io::Error> for CutoutError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("response write", err)
    }
}

impl From<base64::DecodeError> for CutoutError {
    fn from(err: base64::DecodeError) -> Self {
        Self::decode("base64 decoding", err)
    }
}

impl From<serde_json::Error> for CutoutError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("invalid request: {err}"))
    }
}

/// Convert ONNX Runtime errors to segmentation errors.
impl From<ort::Error> for CutoutError {
    fn from(err: ort::Error) -> Self {
        Self::segmentation("ort operation", err)
    }
}

/// Convert ndarray shape errors to segmentation errors.
///
/// Shape errors only occur while moving tensors in and out of the session, so they
/// belong to the engine call rather than to a separate tensor category.
impl From<ndarray::ShapeError> for CutoutError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::segmentation("tensor shape conversion", err)
    }
}
