//! memtree - Tiered text memory for agents
//!
//! This crate provides a sandboxed, line-addressable file tree that agents
//! edit through six commands, a tiered cache that keeps hot and identity
//! files in memory under byte budgets, and a background reorganizer that
//! keeps the tree compact.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod path;
pub mod reorganizer;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use engine::{Command, CommandOutput, MemoryEngine};
pub use error::{MemoryError, Result};
pub use path::{PathResolver, VirtualPath};
pub use reorganizer::{CycleReport, Reorganizer, ReorganizerHandle};
