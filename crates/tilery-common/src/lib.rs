//! Tilery common types, errors, and utilities.
//!
//! This crate provides shared definitions used across the Tilery key-store
//! components.

pub mod config;
pub mod error;
pub mod memory;

pub use config::{KeyStoreConfig, StorageKind, DEFAULT_SEGMENT_BITS};
pub use error::{Result, TileryError};
