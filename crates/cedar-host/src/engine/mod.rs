//! Engine lifecycle and the host/guest memory bridge.
//!
//! Everything that touches the guest goes through [`CedarEngine`]: it owns
//! the wasmtime store, the exported linear memory, and the entry-point
//! table, all behind one per-instance lock. Every call follows the same
//! shape: reserve guest memory through the guest's own allocator, write
//! the request fields, invoke an entry point with explicit offset/length
//! arguments, read the result back, and release every reservation on every
//! exit path.

mod exports;
mod marshal;
mod memory;


use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use wasmtime::{Linker, Module, OptLevel, Store, StoreLimits, StoreLimitsBuilder};

use crate::api::{Decision, EvalRequest, EvalResponse};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ffi::FfiResponse;
use crate::validate::ValidationResult;
use self::exports::EntryPoints;
use self::marshal::{FieldLayout, Segment};
use self::memory::{Allocation, PackedPtr};

/// Host state for the store: WASI preview1 context plus resource limits.
pub(crate) struct HostState {
    preview1: wasmtime_wasi::preview1::WasiP1Ctx,
    limits: StoreLimits,
}

impl HostState {
    fn preview1(&mut self) -> &mut wasmtime_wasi::preview1::WasiP1Ctx {
        &mut self.preview1
    }

    fn build(config: &EngineConfig) -> Self {
        let caps = &config.capabilities;
        let mut builder = wasmtime_wasi::WasiCtxBuilder::new();
        if caps.stdin {
            builder.inherit_stdin();
        }
        if caps.stdout {
            builder.inherit_stdout();
        }
        if caps.stderr {
            builder.inherit_stderr();
        }
        for (key, value) in &caps.env_vars {
            builder.env(key, value);
        }
        builder.args(&caps.args);
        let preview1 = builder.build_p1();

        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory)
            .build();

        Self { preview1, limits }
    }
}

/// An instance of the Cedar WASM engine.
///
/// Creating an engine compiles and instantiates the guest module. This is
/// blocking and may take a while to complete; do not call it from a hot
/// path. Create one engine at startup and reuse it for the lifetime of the
/// process, then [`close`](CedarEngine::close) it.
///
/// The engine is `Send + Sync`. The guest's linear memory is a single
/// shared mutable resource, so all calls against one instance serialize on
/// an internal lock; independent instances run fully in parallel.
pub struct CedarEngine {
    core: Mutex<Option<EngineCore>>,
}

impl CedarEngine {
    /// Instantiate the engine from a guest module image on disk.
    pub fn from_file(config: &EngineConfig, path: impl AsRef<Path>) -> Result<Self> {
        let engine = build_engine(config)?;
        let module = Module::from_file(&engine, path.as_ref())
            .map_err(|e| EngineError::Instantiation(format!("module load failed: {e}")))?;
        Self::instantiate(config, &engine, &module)
    }

    /// Instantiate the engine from an in-memory guest module image.
    pub fn from_bytes(config: &EngineConfig, image: impl AsRef<[u8]>) -> Result<Self> {
        let engine = build_engine(config)?;
        let module = Module::new(&engine, image)
            .map_err(|e| EngineError::Instantiation(format!("module creation failed: {e}")))?;
        Self::instantiate(config, &engine, &module)
    }

    fn instantiate(
        config: &EngineConfig,
        engine: &wasmtime::Engine,
        module: &Module,
    ) -> Result<Self> {
        let started = Instant::now();

        let mut store = Store::new(engine, HostState::build(config));
        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| EngineError::Instantiation(format!("fuel setup failed: {e}")))?;
        }

        let mut linker: Linker<HostState> = Linker::new(engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state| state.preview1())
            .map_err(|e| EngineError::Instantiation(format!("WASI link failed: {e}")))?;

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| EngineError::Instantiation(format!("instantiation failed: {e}")))?;

        let entry = EntryPoints::resolve(&mut store, &instance)?;
        let mem = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| EngineError::Instantiation("no memory export found".to_string()))?;

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine instantiated"
        );

        Ok(Self {
            core: Mutex::new(Some(EngineCore {
                store,
                mem,
                entry,
            })),
        })
    }

    /// Set the entities in the engine from a JSON array string.
    pub fn set_entities(&self, entities: &str) -> Result<()> {
        self.with_core(|core| core.call_setter(Setter::Entities, entities))
    }

    /// Set the policies in the engine from policy-language source text.
    pub fn set_policies(&self, policies: &str) -> Result<()> {
        self.with_core(|core| core.call_setter(Setter::Policies, policies))
    }

    /// Evaluate the request against the loaded policies and entities,
    /// returning the bare decision.
    pub fn eval(&self, req: &EvalRequest) -> Result<Decision> {
        let bytes = self.with_core(|core| core.call_eval(EvalMode::Token, req))?;
        Decision::from_token(&bytes)
    }

    /// Evaluate the request and return the structured response, including
    /// contributing policies and evaluation errors.
    pub fn eval_with_response(&self, req: &EvalRequest) -> Result<EvalResponse> {
        let bytes = self.with_core(|core| core.call_eval(EvalMode::Json, req))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::EnvelopeDecode(format!("evaluation response: {e}")))
    }

    /// Convenience wrapper around [`eval`](CedarEngine::eval): true when
    /// the decision permits the request.
    pub fn is_authorized(&self, req: &EvalRequest) -> Result<bool> {
        Ok(self.eval(req)?.is_permit())
    }

    /// Partially evaluate the request. If the evaluator can reach a
    /// decision it returns a full response; otherwise the residual
    /// policies still to be evaluated. The payload is returned as raw
    /// JSON since the residual shape is not stable upstream.
    pub fn is_authorized_partial(&self, req: &EvalRequest) -> Result<String> {
        let bytes = self.with_core(|core| core.call_eval(EvalMode::Partial, req))?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::EnvelopeDecode(format!("partial response: {e}")))
    }

    /// Validate a policy set against a schema.
    pub fn validate(&self, policies: &str, schema: &str) -> Result<ValidationResult> {
        let bytes = self.with_core(|core| core.call_validate(policies, schema))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::EnvelopeDecode(format!("validation result: {e}")))
    }

    /// Call the evaluator's raw JSON frontend with one request blob and
    /// decode the returned envelope.
    pub fn ffi(&self, input: &str) -> Result<FfiResponse> {
        let bytes = self.with_core(|core| core.call_ffi(input))?;
        FfiResponse::decode(&bytes)
    }

    /// Close the engine and tear down the sandbox runtime.
    ///
    /// Any call after `close` fails with [`EngineError::Closed`]. There is
    /// no implicit recreation.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        match guard.take() {
            Some(core) => {
                drop(core);
                tracing::debug!("engine closed");
                Ok(())
            }
            None => Err(EngineError::Closed),
        }
    }

    /// True once [`close`](CedarEngine::close) has run.
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn with_core<T>(&self, f: impl FnOnce(&mut EngineCore) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let core = guard.as_mut().ok_or(EngineError::Closed)?;
        f(core)
    }

    fn lock(&self) -> MutexGuard<'_, Option<EngineCore>> {
        // A poisoned lock means host code panicked mid-call; the engine
        // object itself is still coherent, so keep serving.
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CedarEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CedarEngine").finish_non_exhaustive()
    }
}

/// Which setter entry point to invoke.
#[derive(Clone, Copy)]
enum Setter {
    Entities,
    Policies,
}

/// Which evaluation entry point to invoke.
#[derive(Clone, Copy)]
enum EvalMode {
    Token,
    Json,
    Partial,
}

/// The engine internals that live behind the per-instance lock: store,
/// exported memory, and the resolved entry-point table.
struct EngineCore {
    store: Store<HostState>,
    mem: wasmtime::Memory,
    entry: EntryPoints,
}

impl EngineCore {
    /// Ask the guest's allocator for `size` bytes.
    ///
    /// Zero-size requests are answered host-side; the guest never sees
    /// them. A trap or a null pointer from the guest is an allocation
    /// failure, not a host crash, whatever the requested size.
    fn reserve(&mut self, size: u32) -> Result<Allocation> {
        if size == 0 {
            return Ok(Allocation::EMPTY);
        }
        let offset = self
            .entry
            .allocate
            .call(&mut self.store, size)
            .map_err(|e| EngineError::Allocation {
                size,
                reason: e.to_string(),
            })?;
        if offset == 0 {
            return Err(EngineError::Allocation {
                size,
                reason: "guest allocator returned a null pointer".to_string(),
            });
        }
        tracing::trace!(size, offset, "guest allocation");
        Ok(Allocation { offset, len: size })
    }

    /// Hand an allocation back to the guest with its original offset and
    /// length. Empty allocations were never reserved guest-side and are
    /// not released there either.
    fn release(&mut self, alloc: Allocation) -> Result<()> {
        if alloc.len == 0 {
            return Ok(());
        }
        self.entry
            .deallocate
            .call(&mut self.store, (alloc.offset, alloc.len))
            .map_err(|e| EngineError::entry(exports::DEALLOCATE, e))
    }

    /// Reserve `size` bytes, run `f`, and release the reservation no
    /// matter how `f` exits. The guarantee the whole bridge leans on:
    /// exactly one release per reserve, on the error path too.
    fn with_reserved<T>(
        &mut self,
        size: u32,
        f: impl FnOnce(&mut Self, Allocation) -> Result<T>,
    ) -> Result<T> {
        let alloc = self.reserve(size)?;
        let outcome = f(self, alloc);
        let released = self.release(alloc);
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Write a UTF-8 string into guest memory at `offset`.
    fn write_string(&mut self, offset: u32, s: &str) -> Result<()> {
        let data = self.mem.data_mut(&mut self.store);
        let start = offset as usize;
        let end = start
            .checked_add(s.len())
            .filter(|&end| end <= data.len())
            .ok_or(EngineError::MemoryWrite {
                offset,
                len: s.len() as u64,
            })?;
        data[start..end].copy_from_slice(s.as_bytes());
        Ok(())
    }

    /// Read `len` raw bytes from guest memory at `offset`.
    fn read_bytes(&mut self, offset: u32, len: u32) -> Result<Vec<u8>> {
        let data = self.mem.data(&self.store);
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&end| end <= data.len())
            .ok_or(EngineError::MemoryRead {
                offset,
                len: len as u64,
            })?;
        Ok(data[start..end].to_vec())
    }

    /// Write each field at its running offset inside `base`, returning the
    /// absolute `(offset, len)` pairs the entry points take.
    fn write_fields(
        &mut self,
        base: Allocation,
        fields: &[&str],
        layout: &FieldLayout,
    ) -> Result<Vec<Segment>> {
        let mut segments = Vec::with_capacity(fields.len());
        for (field, rel) in fields.iter().zip(&layout.offsets) {
            let offset = base
                .offset
                .checked_add(*rel)
                .ok_or(EngineError::MemoryWrite {
                    offset: base.offset,
                    len: *rel as u64,
                })?;
            if !field.is_empty() {
                self.write_string(offset, field)?;
            }
            segments.push(Segment {
                offset,
                len: field.len() as u32,
            });
        }
        Ok(segments)
    }

    /// Read a result buffer out of guest memory and release it exactly
    /// once, even when the read fails. Works the same whether the buffer
    /// arrived as a packed value or as a positional `(ptr, len)` pair;
    /// packed returns are decoded into the explicit pair before this
    /// point and the raw integer travels no further.
    fn read_result(&mut self, result: Allocation) -> Result<Vec<u8>> {
        let bytes = self.read_bytes(result.offset, result.len);
        let released = self.release(result);
        let bytes = bytes?;
        released?;
        Ok(bytes)
    }

    fn call_setter(&mut self, which: Setter, payload: &str) -> Result<()> {
        let (func, name) = match which {
            Setter::Entities => (self.entry.set_entities.clone(), exports::SET_ENTITIES),
            Setter::Policies => (self.entry.set_policies.clone(), exports::SET_POLICIES),
        };
        let layout = FieldLayout::of(&[payload])?;
        self.with_reserved(layout.total, |core, base| {
            if !payload.is_empty() {
                core.write_string(base.offset, payload)?;
            }
            func.call(&mut core.store, (base.offset, base.len))
                .map_err(|e| EngineError::entry(name, e))
        })
    }

    fn call_eval(&mut self, mode: EvalMode, req: &EvalRequest) -> Result<Vec<u8>> {
        let (func, name) = match mode {
            EvalMode::Token => (
                self.entry.is_authorized_string.clone(),
                exports::IS_AUTHORIZED_STRING,
            ),
            EvalMode::Json => (self.entry.is_authorized_json.clone(), exports::IS_AUTHORIZED_JSON),
            EvalMode::Partial => (
                self.entry.is_authorized_partial.clone(),
                exports::IS_AUTHORIZED_PARTIAL,
            ),
        };
        let fields = req.fields();
        let layout = FieldLayout::of(&fields)?;
        self.with_reserved(layout.total, |core, base| {
            let segs = core.write_fields(base, &fields, &layout)?;
            let raw = func
                .call(
                    &mut core.store,
                    (
                        segs[0].offset,
                        segs[0].len,
                        segs[1].offset,
                        segs[1].len,
                        segs[2].offset,
                        segs[2].len,
                        segs[3].offset,
                        segs[3].len,
                    ),
                )
                .map_err(|e| EngineError::entry(name, e))?;
            core.read_result(PackedPtr::decode(raw).into())
        })
    }

    fn call_validate(&mut self, policies: &str, schema: &str) -> Result<Vec<u8>> {
        let fields = [policies, schema];
        let layout = FieldLayout::of(&fields)?;
        self.with_reserved(layout.total, |core, base| {
            let segs = core.write_fields(base, &fields, &layout)?;
            let raw = core
                .entry
                .validate
                .call(
                    &mut core.store,
                    (segs[0].offset, segs[0].len, segs[1].offset, segs[1].len),
                )
                .map_err(|e| EngineError::entry(exports::VALIDATE, e))?;
            core.read_result(PackedPtr::decode(raw).into())
        })
    }

    fn call_ffi(&mut self, input: &str) -> Result<Vec<u8>> {
        let layout = FieldLayout::of(&[input])?;
        self.with_reserved(layout.total, |core, base| {
            if !input.is_empty() {
                core.write_string(base.offset, input)?;
            }
            let raw = core
                .entry
                .ffi
                .call(&mut core.store, (base.offset, base.len))
                .map_err(|e| EngineError::entry(exports::FFI, e))?;
            core.read_result(PackedPtr::decode(raw).into())
        })
    }
}

fn build_engine(config: &EngineConfig) -> Result<wasmtime::Engine> {
    let mut engine_config = wasmtime::Config::new();
    engine_config.cranelift_opt_level(match config.optimization_level {
        0 => OptLevel::None,
        _ => OptLevel::Speed,
    });
    if config.fuel_limit.is_some() {
        engine_config.consume_fuel(true);
    }
    wasmtime::Engine::new(&engine_config)
        .map_err(|e| EngineError::Instantiation(format!("engine creation failed: {e}")))
}
