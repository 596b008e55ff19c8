//! Configuration for the engine sandbox.

use serde::{Deserialize, Serialize};

/// WASI capability grants for the guest module.
///
/// Following the deny-by-default security model, all capabilities start
/// disabled and must be explicitly enabled. A policy evaluator needs none
/// of them; stdio is occasionally useful to see guest-side diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WasiCapabilities {
    /// Allow access to stdin
    pub stdin: bool,

    /// Allow access to stdout
    pub stdout: bool,

    /// Allow access to stderr
    pub stderr: bool,

    /// Environment variables to expose
    pub env_vars: Vec<(String, String)>,

    /// Command-line arguments to pass
    pub args: Vec<String>,
}

impl WasiCapabilities {
    /// Create capabilities with nothing allowed (maximum isolation)
    pub fn none() -> Self {
        Self::default()
    }

    /// Create capabilities with stdio allowed
    pub fn with_stdio() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        }
    }

    /// Builder: enable stdin
    pub fn stdin(mut self, allow: bool) -> Self {
        self.stdin = allow;
        self
    }

    /// Builder: enable stdout
    pub fn stdout(mut self, allow: bool) -> Self {
        self.stdout = allow;
        self
    }

    /// Builder: enable stderr
    pub fn stderr(mut self, allow: bool) -> Self {
        self.stderr = allow;
        self
    }

    /// Builder: add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Builder: add command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Configuration for the engine runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WASI capability configuration
    pub capabilities: WasiCapabilities,

    /// Maximum guest linear memory in bytes (default = 256MB)
    ///
    /// The guest's own allocator answers oversized requests; this cap is
    /// the backstop that keeps a misbehaving guest from growing without
    /// bound and taking the host down with it.
    pub max_memory: usize,

    /// Enable fuel-based execution limiting
    pub fuel_limit: Option<u64>,

    /// Cranelift optimization level (0-2)
    pub optimization_level: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capabilities: WasiCapabilities::none(),
            max_memory: 256 * 1024 * 1024, // 256 MB
            fuel_limit: None,
            optimization_level: 2,
        }
    }
}

impl EngineConfig {
    /// Create a minimal config for maximum isolation
    pub fn minimal() -> Self {
        Self {
            capabilities: WasiCapabilities::none(),
            max_memory: 64 * 1024 * 1024, // 64 MB
            fuel_limit: Some(1_000_000_000), // 1B fuel units
            ..Default::default()
        }
    }

    /// Create config for development/debugging
    pub fn development() -> Self {
        Self {
            capabilities: WasiCapabilities::with_stdio(),
            optimization_level: 0, // Faster compilation
            ..Default::default()
        }
    }

    /// Builder: set capabilities
    pub fn capabilities(mut self, caps: WasiCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    /// Builder: set max memory
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Builder: set fuel limit
    pub fn fuel_limit(mut self, fuel: u64) -> Self {
        self.fuel_limit = Some(fuel);
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(2);
        self
    }
}
