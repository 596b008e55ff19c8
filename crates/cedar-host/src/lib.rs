//! # cedar-host
//!
//! Cedar policy evaluation through a sandboxed WebAssembly engine.
//!
//! The policy evaluator itself is an externally supplied, pre-compiled WASM
//! module. This crate is the host side of that arrangement: it instantiates
//! the module with wasmtime, bridges strongly-typed requests into the
//! guest's flat linear memory, and decodes the results back out. The guest
//! manages its own heap; the host only ever asks for byte ranges through
//! the guest's exported `allocate`/`deallocate` pair and copies UTF-8 in
//! and out at explicit offsets.
//!
//! ## Security Model
//!
//! - **Memory isolation**: the evaluator runs in its own linear memory
//!   space; the host touches it only via explicit offset/length operations
//! - **Capability-based**: no WASI permissions unless explicitly granted
//! - **Bounded resources**: store limits cap guest memory growth, and an
//!   optional fuel limit caps runaway evaluation
//! - **No leaked buffers**: every guest allocation is released on every
//!   exit path, including decode failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cedar_host::{CedarEngine, EngineConfig, EvalRequest};
//!
//! // Slow: compiles and instantiates the evaluator. Do this once at
//! // startup, never per request.
//! let engine = CedarEngine::from_file(&EngineConfig::default(), "cedar.wasm")?;
//!
//! engine.set_entities("[]")?;
//! engine.set_policies(r#"permit(
//!     principal == User::"alice",
//!     action    == Action::"update",
//!     resource  == Photo::"VacationPhoto94.jpg"
//! );"#)?;
//!
//! let decision = engine.eval(&EvalRequest::new(
//!     "User::\"alice\"",
//!     "Action::\"update\"",
//!     "Photo::\"VacationPhoto94.jpg\"",
//!     "{}",
//! ))?;
//! assert!(decision.is_permit());
//!
//! engine.close()?;
//! ```
//!
//! Evaluator-reported problems (unparsable policies, schema mismatches,
//! missing attributes) are not errors of this crate: they come back as
//! structured data in diagnostics lists, validation findings, or a failed
//! FFI envelope. [`EngineError`] is reserved for the bridge itself failing.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod validate;

// Re-export main types
pub use api::{Decision, Diagnostics, EvalRequest, EvalResponse};
pub use config::{EngineConfig, WasiCapabilities};
pub use engine::CedarEngine;
pub use error::{EngineError, Result};
pub use ffi::FfiResponse;
pub use validate::{SourceLocation, ValidationError, ValidationResult};
