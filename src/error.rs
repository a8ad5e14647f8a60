// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Error taxonomy for the detection and alarm pipeline

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, VigilError>;

/// Library error type
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Rejected input or configuration; state is left unchanged
    #[error("Validation error: {0}")]
    Validation(String),

    /// Detection model could not be loaded
    #[error("Detection model unavailable: {0}")]
    ModelUnavailable(String),

    /// Malformed or incomparable feature descriptor
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Image decode/encode failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Frame capture error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Audio or relay hardware error
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Lookup miss
    #[error("Not found: {0}")]
    NotFound(String),
}

impl VigilError {
    /// Shorthand for validation failures
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors the caller caused with bad input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
