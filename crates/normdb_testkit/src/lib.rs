//! # NormDB Testkit
//!
//! Test utilities for NormDB.
//!
//! This crate provides:
//! - Pre-wired store fixtures with a standard entity graph
//! - Property-based test generators using proptest
//! - Integration helpers, including a delayed adapter for exercising
//!   read de-duplication
//!
//! ## Usage
//!
//! ```rust,ignore
//! use normdb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     let test = TestStore::new();
//!     test.seed_users();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
