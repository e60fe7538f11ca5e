//! Zoo Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and utilities for the zoo dispatcher workspace:
//!
//! - **Error Handling**: the `ZooError` type and `Result` alias
//! - **Digests**: MD5/SHA-1/SHA-256 computation over artifact bytes
//! - **Logging**: centralized tracing initialization
//!
//! # Example
//!
//! ```no_run
//! use zoo_common::digest::ArtifactDigests;
//!
//! let digests = ArtifactDigests::of(b"sample bytes");
//! println!("md5 = {}", digests.md5);
//! ```

pub mod digest;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, ZooError};
