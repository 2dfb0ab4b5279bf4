//! Core types for stowage
//!
//! This crate provides the singleton registry and the error codes shared by
//! the storage crates.

pub mod error;
pub mod registry;

pub use error::ErrorCode;
pub use registry::{LockStrategy, RegistryError, RegistryKey, SingletonRegistry};
