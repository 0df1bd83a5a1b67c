//! A server-embedded JSON document engine: a document object model with custom allocator
//! accounting and key-name interning, a dual-dialect path query/mutation language, a
//! persistence codec with defragmentation, and statistics. The engine is loaded by a host
//! process that owns networking, command dispatch, replication, and key-space lifecycle;
//! see [`host`] for the seam between this crate and that process.

pub mod alloc;
pub mod command;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod host;
pub mod keytable;
pub mod ops;
pub mod parser;
pub mod path;
pub mod persist;
pub mod serializer;
pub mod stats;
pub mod value;

pub use document::Document;
pub use engine::Engine;
pub use error::{Error, Result};
pub use value::Value;
