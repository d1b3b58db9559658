//! Error taxonomy shared by every phase of a graph build.

use thiserror::Error;

/// Stable discriminant of a [`GraphError`], for callers that branch on the
/// failure class instead of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    FormulaValidation,
    MissingReference,
    Collaborator,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cost function {index} is invalid: {reason}")]
    FormulaValidation { index: usize, reason: String },

    #[error("Unknown vertex id {0}")]
    UnknownVertex(i64),

    #[error("Unknown edge id {0}")]
    UnknownEdge(i64),

    #[error("Id {0} is already in use")]
    DuplicateId(i64),

    #[error("Cost slot {slot} requested but only {populated} slot(s) are populated")]
    CostSlotOutOfRange { slot: usize, populated: usize },

    #[error("Cost slot has {got} values for {expected} edges")]
    CostSlotLength { expected: usize, got: usize },

    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Configuration(_) => ErrorKind::Configuration,
            GraphError::FormulaValidation { .. } => ErrorKind::FormulaValidation,
            GraphError::UnknownVertex(_)
            | GraphError::UnknownEdge(_)
            | GraphError::DuplicateId(_)
            | GraphError::CostSlotOutOfRange { .. }
            | GraphError::CostSlotLength { .. } => ErrorKind::MissingReference,
            GraphError::Collaborator { .. } => ErrorKind::Collaborator,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        GraphError::Configuration(message.into())
    }

    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        GraphError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(GraphError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(GraphError::UnknownVertex(3).kind(), ErrorKind::MissingReference);
        assert_eq!(
            GraphError::CostSlotOutOfRange {
                slot: 2,
                populated: 1
            }
            .kind(),
            ErrorKind::MissingReference
        );
        assert_eq!(
            GraphError::collaborator("raster", "no data").kind(),
            ErrorKind::Collaborator
        );
    }

    #[test]
    fn test_messages() {
        let err = GraphError::FormulaValidation {
            index: 1,
            reason: "Unknown field 'ELEV'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cost function 1 is invalid: Unknown field 'ELEV'"
        );
    }
}
