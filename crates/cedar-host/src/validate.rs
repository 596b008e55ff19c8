//! Policy validation result types.
//!
//! Validation checks a policy set against a schema inside the guest. The
//! guest reports exactly one of three shapes: a policy parse error, a
//! schema parse error, or a (possibly empty) list of validation errors.
//! All three are evaluator-reported data, not host failures.

use serde::Deserialize;

/// Outcome of validating a policy set against a schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationResult {
    /// Set when the schema text could not be parsed. Mutually exclusive
    /// with a populated [`validation_errors`] list.
    ///
    /// [`validation_errors`]: ValidationResult::validation_errors
    #[serde(default)]
    pub schema_error: Option<String>,

    /// Set when the policy text could not be parsed.
    #[serde(default)]
    pub policy_error: Option<String>,

    /// Validation errors found when both inputs parsed.
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// True when both inputs parsed and no validation errors were found.
    pub fn is_valid(&self) -> bool {
        self.schema_error.is_none()
            && self.policy_error.is_none()
            && self.validation_errors.is_empty()
    }
}

/// A single validation finding.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationError {
    /// What kind of validation rule was violated.
    pub error_kind: String,
    /// Where in the policy set the violation occurred.
    pub location: SourceLocation,
}

/// Source location of a validation finding.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceLocation {
    /// Identifier of the offending policy.
    pub policy_id: String,
    /// Byte offset where the offending range starts, if known.
    #[serde(default)]
    pub range_start: Option<usize>,
    /// Byte offset where the offending range ends, if known.
    #[serde(default)]
    pub range_end: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_shape() {
        let json = r#"{"schema_error":"JSON Schema file could not be parsed","policy_error":null,"validation_errors":[]}"#;
        let res: ValidationResult = serde_json::from_str(json).unwrap();
        assert!(res.schema_error.is_some());
        assert!(res.policy_error.is_none());
        assert!(res.validation_errors.is_empty());
        assert!(!res.is_valid());
    }

    #[test]
    fn validation_errors_shape() {
        let json = r#"{"schema_error":null,"policy_error":null,"validation_errors":[
            {"error_kind":"unrecognized entity type","location":{"policy_id":"policy0","range_start":12,"range_end":40}}
        ]}"#;
        let res: ValidationResult = serde_json::from_str(json).unwrap();
        assert!(!res.is_valid());
        assert_eq!(res.validation_errors.len(), 1);
        assert_eq!(res.validation_errors[0].location.policy_id, "policy0");
        assert_eq!(res.validation_errors[0].location.range_start, Some(12));
    }

    #[test]
    fn clean_result_is_valid() {
        let json = r#"{"schema_error":null,"policy_error":null,"validation_errors":[]}"#;
        let res: ValidationResult = serde_json::from_str(json).unwrap();
        assert!(res.is_valid());
    }
}
