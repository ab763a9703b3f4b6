//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing an element
#[derive(Error, Debug)]
pub enum Error {
    /// A style property was rejected by the target grammar
    #[error("Invalid style property: {0}")]
    PropertyError(String),

    /// A subtree could not be synchronized (structural divergence)
    #[error("Style synchronization failed: {0}")]
    SyncError(String),

    /// The clone could not be serialized into embeddable markup
    #[error("Markup packaging failed: {0}")]
    PackageError(String),

    /// A pixel buffer of the requested dimensions could not be allocated
    #[error("Failed to allocate {0}x{1} pixel buffer")]
    BufferError(u32, u32),

    /// The rasterizer backend failed to decode the wrapped markup
    #[error("Rasterization failed: {0}")]
    RasterizeError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
