use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("computation error: {0}")]
    Computation(String),
}

impl SolverError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
