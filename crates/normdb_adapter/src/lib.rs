//! # NormDB Adapter
//!
//! Backend adapter boundary for NormDB.
//!
//! This crate provides:
//! - The [`Adapter`] trait, an async capability set a backend exposes
//! - The raw-response envelope returned when callers ask for it
//! - [`MemoryAdapter`], a HashMap-backed adapter for tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod memory;
mod response;

pub use adapter::{Adapter, AdapterOpts, EntityDef};
pub use error::{AdapterError, AdapterResult};
pub use memory::MemoryAdapter;
pub use response::AdapterResponse;
