//! Chronology error types.

use crate::link::LinkError;
use crate::pool::PoolError;
use crate::transition::ParameterError;
use thiserror::Error;

fn join(errors: &[ParameterError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ChronologyError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Every rejected parameter of one call; nothing was sent
    #[error("Invalid parameters: {}", join(.0))]
    InvalidParameters(Vec<ParameterError>),
}

impl From<ParameterError> for ChronologyError {
    fn from(error: ParameterError) -> Self {
        ChronologyError::InvalidParameters(vec![error])
    }
}

impl ChronologyError {
    /// Rejected parameters, empty for link and pool failures.
    pub fn parameters(&self) -> &[ParameterError] {
        match self {
            ChronologyError::InvalidParameters(errors) => errors,
            _ => &[],
        }
    }
}
