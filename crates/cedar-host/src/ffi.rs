//! Raw FFI envelope returned by the guest's JSON frontend.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

use crate::api::EvalResponse;
use crate::error::{EngineError, Result};

/// Outer success/error wrapper returned by the raw FFI entry point.
///
/// A failed envelope (`success == false`) is a well-formed evaluator
/// response reporting a guest-side problem such as malformed caller input.
/// It is returned as data, never as an [`EngineError`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FfiResponse {
    /// True if the request was evaluated. If false, [`errors`] says why.
    ///
    /// [`errors`]: FfiResponse::errors
    #[serde(default, deserialize_with = "flexible_bool")]
    pub success: bool,

    /// The nested evaluation response, present only on success.
    /// Decoded from the envelope's embedded `result` string.
    #[serde(skip)]
    pub result: Option<EvalResponse>,

    /// True if the failure was an internal evaluator error rather than an
    /// ordinary evaluation error.
    #[serde(default, rename = "isInternal")]
    pub is_internal: bool,

    /// Errors that occurred while handling the request.
    #[serde(default)]
    pub errors: Vec<String>,

    // The guest embeds the evaluation response as an encoded JSON string,
    // so a second decode pass is needed to reach `result`.
    #[serde(default, rename = "result")]
    raw_result: Option<String>,
}

impl FfiResponse {
    /// Decode the raw envelope bytes, including the second-level decode of
    /// the embedded result on success.
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let mut envelope: FfiResponse = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::EnvelopeDecode(format!("ffi envelope: {e}")))?;
        if !envelope.success {
            return Ok(envelope);
        }
        let raw = envelope.raw_result.as_deref().ok_or_else(|| {
            EngineError::EnvelopeDecode("ffi envelope reported success without a result".into())
        })?;
        let result: EvalResponse = serde_json::from_str(raw)
            .map_err(|e| EngineError::EnvelopeDecode(format!("ffi result: {e}")))?;
        envelope.result = Some(result);
        Ok(envelope)
    }
}

// The guest serializes the success flag as a JSON string ("true"/"false");
// accept a bare bool as well.
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleBool;

    impl Visitor<'_> for FlexibleBool {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean or the strings \"true\"/\"false\"")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<bool, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<bool, E> {
            match v {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlexibleBool)
}
