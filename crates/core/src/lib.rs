//! Core types and shared functionality for gramsevak.
//!
//! This crate provides:
//! - Request and response snapshot types shared by the client and host
//! - The named-store capability with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod request;

pub use cache::{CacheDb, CacheStorage, MemoryStorage, StoredEntry};
pub use config::AppConfig;
pub use error::Error;
pub use request::{RequestClass, RequestDescriptor, RequestMode, ResponseSnapshot};
