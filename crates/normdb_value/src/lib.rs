//! # NormDB Value
//!
//! Dynamic value type for NormDB records.
//!
//! This crate provides:
//! - [`Value`], an ordered property-bag value with a total order across
//!   all variants (used for index keys and filter comparisons)
//! - Dotted-path access for nested fields
//! - Structural merge/diff used by the collection merge policy
//! - [`fingerprint`], a stable hash of a query value used as a cache key

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fingerprint;
mod merge;
mod value;

pub use fingerprint::fingerprint;
pub use merge::{diff, merge_into, Diff};
pub use value::Value;
