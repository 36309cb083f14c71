//! Error types for Tilery.

use thiserror::Error;

/// Result type alias using TileryError.
pub type Result<T> = std::result::Result<T, TileryError>;

/// Errors that can occur in Tilery key-store operations.
#[derive(Debug, Error)]
pub enum TileryError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Write-contract violations
    #[error("out-of-order key {key}: segment {segment} is behind segment {last_segment}")]
    OutOfOrderKey {
        key: u64,
        segment: u64,
        last_segment: u64,
    },

    #[error("segment {segment} exceeds the addressable maximum {max}; increase segment_bits")]
    SegmentOverflow { segment: u64, max: u64 },

    // Lifecycle errors
    #[error("key store is closed")]
    StoreClosed,

    // Configuration errors
    #[error("invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
