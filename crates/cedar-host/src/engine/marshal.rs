//! Request layout: contiguous multi-field placement inside one allocation.

use crate::error::{EngineError, Result};

/// An absolute `(offset, len)` pair for one written field, in the exact
/// shape the guest entry points take their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    /// Absolute offset in guest linear memory
    pub offset: u32,
    /// Field length in bytes
    pub len: u32,
}

/// Computed layout for an ordered list of fields: total size plus each
/// field's offset relative to the allocation base.
///
/// Offsets are running sums of the preceding field lengths, so guest-side
/// field boundaries match host-side writes exactly. A zero-length field
/// keeps the running offset of its position and may coincide with the next
/// field's start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldLayout {
    /// Total allocation size in bytes
    pub total: u32,
    /// Per-field offsets relative to the allocation base
    pub offsets: Vec<u32>,
}

impl FieldLayout {
    /// Lay out `fields` contiguously. Fails if the request cannot be
    /// addressed in the guest's 32-bit memory.
    pub fn of(fields: &[&str]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut total: u32 = 0;
        for field in fields {
            offsets.push(total);
            let len = u32::try_from(field.len()).map_err(|_| EngineError::MemoryWrite {
                offset: total,
                len: field.len() as u64,
            })?;
            total = total.checked_add(len).ok_or(EngineError::MemoryWrite {
                offset: total,
                len: len as u64,
            })?;
        }
        Ok(Self { total, offsets })
    }
}
