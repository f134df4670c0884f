//! Decides what a failed owner call means for the item that issued it.

use crate::rpc::client::RpcError;

/// What the fetch loop should do with a failed call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallDisposition {
    /// The node reported the configured "token does not exist" signature.
    /// Not an error: the id is recorded as absent and no retry is spent.
    PermanentAbsence,
    /// A recognized recoverable failure (timeout, paused gate, other node
    /// errors). Retried within the budget.
    Transient,
    /// An error the classifier has no rule for. Treated like a transient
    /// failure up to the retry budget.
    Unclassified,
}

/// How the contract signals that a queried id does not exist.
///
/// Absence-signaling conventions vary by contract implementation, so the
/// signature is configuration rather than a hardcoded literal. The default
/// fragment matches OpenZeppelin's `ERC721: invalid token ID` revert
/// reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceSignature {
    fragment: String,
    code: Option<i64>,
}

impl Default for AbsenceSignature {
    fn default() -> Self {
        Self {
            fragment: "invalid token ID".to_string(),
            code: None,
        }
    }
}

impl AbsenceSignature {
    pub fn new(fragment: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            fragment: fragment.into(),
            code,
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    fn matches(&self, code: i64, message: &str) -> bool {
        if !self.fragment.is_empty() && message.contains(&self.fragment) {
            return true;
        }
        self.code == Some(code)
    }
}

/// Inspects failed remote calls and maps them onto dispositions.
#[derive(Debug, Clone, Default)]
pub struct CallClassifier {
    absence: AbsenceSignature,
}

impl CallClassifier {
    pub fn new(absence: AbsenceSignature) -> Self {
        Self { absence }
    }

    pub fn classify(&self, error: &anyhow::Error) -> CallDisposition {
        match error.downcast_ref::<RpcError>() {
            Some(RpcError::Node { code, message }) => {
                if self.absence.matches(*code, message) {
                    CallDisposition::PermanentAbsence
                } else {
                    CallDisposition::Transient
                }
            }
            Some(RpcError::Timeout { .. }) | Some(RpcError::Paused) => CallDisposition::Transient,
            None => CallDisposition::Unclassified,
        }
    }
}
