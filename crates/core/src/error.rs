use crate::region::RegionId;

/// Result alias that carries the custom [`ChromaticError`] type.
pub type Result<T> = std::result::Result<T, ChromaticError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ChromaticError {
    /// Free-form failure reported by a collaborator that has no richer
    /// taxonomy of its own.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A captured frame (or sample image) could not be decoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// The configuration file is not valid JSON for [`crate::AppConfig`].
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A region, profile or binding failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The region maps to a rectangle without any pixels.
    #[error("region {0} covers no pixels")]
    EmptyRegion(RegionId),
    /// The capture device refused an operation.
    #[error("capture device: {0}")]
    Capture(String),
    /// The light stream refused an operation.
    #[error("light stream: {0}")]
    Light(String),
    /// The control loop has exited and no longer accepts commands.
    #[error("control loop is no longer running")]
    LoopClosed,
}

impl ChromaticError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<&str> for ChromaticError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ChromaticError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
