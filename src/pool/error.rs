//! State pool errors.

use crate::core::Core;
use crate::link::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// Fewer free states than requested; nothing was allocated
    #[error("{core} does not have enough free states: requested {requested}, available {available}")]
    Exhausted {
        core: Core,
        requested: usize,
        available: usize,
    },

    #[error(transparent)]
    Link(#[from] LinkError),
}
