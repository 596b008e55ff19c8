//! Error types for the engine crate.

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    /// Guest image invalid or sandbox creation failed. Fatal, no retry.
    #[error("engine instantiation failed: {0}")]
    Instantiation(String),

    /// The engine was closed and can no longer serve calls.
    #[error("engine is closed")]
    Closed,

    /// The guest allocator refused a request.
    #[error("guest allocation of {size} bytes failed: {reason}")]
    Allocation {
        /// Requested size in bytes
        size: u32,
        /// What the guest reported
        reason: String,
    },

    /// Read range falls outside the guest's mapped linear memory.
    #[error("memory read out of bounds: offset={offset} len={len}")]
    MemoryRead {
        /// Start offset of the attempted read
        offset: u32,
        /// Length of the attempted read
        len: u64,
    },

    /// Write range falls outside the guest's mapped linear memory,
    /// or offset arithmetic overflowed while laying out a request.
    #[error("memory write out of bounds: offset={offset} len={len}")]
    MemoryWrite {
        /// Start offset of the attempted write
        offset: u32,
        /// Length of the attempted write
        len: u64,
    },

    /// A guest entry point call failed (trap, fuel exhaustion, ...).
    #[error("entry point '{name}' failed: {reason}")]
    EntryPoint {
        /// Exported name of the entry point
        name: &'static str,
        /// What the runtime reported
        reason: String,
    },

    /// The guest claimed success but returned an undecodable payload.
    /// This is a contract violation, not an evaluator-reported problem.
    #[error("envelope decode failed: {0}")]
    EnvelopeDecode(String),
}

impl EngineError {
    pub(crate) fn entry(name: &'static str, err: wasmtime::Error) -> Self {
        EngineError::EntryPoint {
            name,
            reason: err.to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
