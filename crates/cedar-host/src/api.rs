//! Request and response types for policy evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// An authorization request to evaluate against the loaded policies and
/// entities.
///
/// All four fields are UTF-8 strings in Cedar's textual syntax; `context`
/// is a JSON object (pass `"{}"` when there is nothing to add):
///
/// ```rust,ignore
/// let decision = engine.eval(&EvalRequest::new(
///     "User::\"alice\"",
///     "Action::\"update\"",
///     "Photo::\"VacationPhoto94.jpg\"",
///     "{}",
/// ))?;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Who is making the request, e.g. `User::"alice"`.
    pub principal: String,
    /// What action is being requested, e.g. `Action::"update"`.
    pub action: String,
    /// What resource is being requested, e.g. `Photo::"VacationPhoto94.jpg"`.
    pub resource: String,
    /// JSON object with additional information for policy evaluation.
    pub context: String,
}

impl EvalRequest {
    /// Create a request from its four fields.
    pub fn new(
        principal: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            action: action.into(),
            resource: resource.into(),
            context: context.into(),
        }
    }

    /// Borrow the fields in the order the guest expects them.
    pub(crate) fn fields(&self) -> [&str; 4] {
        [&self.principal, &self.action, &self.resource, &self.context]
    }
}

/// The decision issued by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The request is authorized.
    Allow,
    /// The request is not authorized.
    Deny,
}

impl Decision {
    /// True if the decision permits the request.
    pub fn is_permit(self) -> bool {
        self == Decision::Allow
    }

    /// Parse the short decision token the guest returns.
    pub(crate) fn from_token(bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"Allow" => Ok(Decision::Allow),
            b"Deny" => Ok(Decision::Deny),
            other => Err(EngineError::EnvelopeDecode(format!(
                "unexpected decision token: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("Allow"),
            Decision::Deny => f.write_str("Deny"),
        }
    }
}

/// Structured evaluation response: a decision plus diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResponse {
    /// The result of the policy evaluation.
    pub decision: Decision,
    /// Diagnostic information attached to the decision.
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Diagnostic information returned alongside a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Identifiers of the policies that contributed to the decision.
    #[serde(default)]
    pub reason: Vec<String>,
    /// Errors that occurred during evaluation. These are evaluator
    /// diagnostics, not host-side failures.
    #[serde(default)]
    pub errors: Vec<String>,
}
