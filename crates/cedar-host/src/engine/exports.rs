//! The guest's fixed entry-point table.
//!
//! Every export takes and returns 32/64-bit integers only; structured data
//! crosses the boundary as opaque bytes at an offset. The table is resolved
//! once at instantiation and cached as typed handles, so a missing or
//! mistyped export surfaces at startup instead of on a request path.

use wasmtime::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use super::HostState;
use crate::error::{EngineError, Result};

pub(crate) const ALLOCATE: &str = "allocate";
pub(crate) const DEALLOCATE: &str = "deallocate";
pub(crate) const SET_ENTITIES: &str = "set_entities";
pub(crate) const SET_POLICIES: &str = "set_policies";
pub(crate) const IS_AUTHORIZED_STRING: &str = "is_authorized_string";
pub(crate) const IS_AUTHORIZED_JSON: &str = "is_authorized_json";
pub(crate) const IS_AUTHORIZED_PARTIAL: &str = "is_authorized_partial";
pub(crate) const VALIDATE: &str = "validate";
pub(crate) const FFI: &str = "ffi";

/// Four `(ptr, len)` pairs: principal, action, resource, context.
pub(crate) type EvalParams = (u32, u32, u32, u32, u32, u32, u32, u32);

/// Typed handles to the guest's exports, resolved once per instance.
pub(crate) struct EntryPoints {
    pub allocate: TypedFunc<u32, u32>,
    pub deallocate: TypedFunc<(u32, u32), ()>,
    pub set_entities: TypedFunc<(u32, u32), ()>,
    pub set_policies: TypedFunc<(u32, u32), ()>,
    pub is_authorized_string: TypedFunc<EvalParams, u64>,
    pub is_authorized_json: TypedFunc<EvalParams, u64>,
    pub is_authorized_partial: TypedFunc<EvalParams, u64>,
    pub validate: TypedFunc<(u32, u32, u32, u32), u64>,
    pub ffi: TypedFunc<(u32, u32), u64>,
}

impl EntryPoints {
    /// Resolve the full table from an instantiated module.
    pub fn resolve(store: &mut Store<HostState>, instance: &Instance) -> Result<Self> {
        Ok(Self {
            allocate: typed(store, instance, ALLOCATE)?,
            deallocate: typed(store, instance, DEALLOCATE)?,
            set_entities: typed(store, instance, SET_ENTITIES)?,
            set_policies: typed(store, instance, SET_POLICIES)?,
            is_authorized_string: typed(store, instance, IS_AUTHORIZED_STRING)?,
            is_authorized_json: typed(store, instance, IS_AUTHORIZED_JSON)?,
            is_authorized_partial: typed(store, instance, IS_AUTHORIZED_PARTIAL)?,
            validate: typed(store, instance, VALIDATE)?,
            ffi: typed(store, instance, FFI)?,
        })
    }
}

fn typed<P, R>(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &'static str,
) -> Result<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|e| EngineError::Instantiation(format!("entry point '{name}' missing or mistyped: {e}")))
}
